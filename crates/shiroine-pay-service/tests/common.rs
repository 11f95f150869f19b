//! Common test utilities for shiroine-pay integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use wiremock::MockServer;

use shiroine_pay_core::{OrderItem, Payer, Transaction};
use shiroine_pay_service::config::{IskapayConfig, PakasirConfig, TripayConfig};
use shiroine_pay_service::crypto::hmac_sha256_hex;
use shiroine_pay_service::{create_router, AppState, GatewayKind, ServiceConfig};
use shiroine_pay_store::{Ledger, MemoryStore};

/// Tripay private key used to sign callbacks in tests.
pub const TRIPAY_PRIVATE_KEY: &str = "test-private-key";
/// Tripay merchant code used in tests.
pub const TRIPAY_MERCHANT_CODE: &str = "T0001";
/// Bearer token every provider mock expects.
pub const API_KEY: &str = "test-api-key";
/// Pakasir project slug used in tests.
pub const PAKASIR_SLUG: &str = "shiroine";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the router.
    pub store: Arc<MemoryStore>,
    /// Stand-in for the payment provider API.
    pub provider: MockServer,
    /// Shared application state, for driving the reconciler directly.
    pub state: AppState,
}

impl TestHarness {
    /// Harness for `kind` with default settings.
    pub async fn new(kind: GatewayKind) -> Self {
        Self::with_config(kind, |_| {}).await
    }

    /// Harness for `kind`, letting the test adjust the configuration.
    pub async fn with_config(kind: GatewayKind, adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let provider = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());

        let mut config = test_config(kind, &provider.uri());
        adjust(&mut config);

        let state = AppState::new(store.clone(), config).expect("Failed to build app state");
        let router: Router = create_router(state.clone());
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            provider,
            state,
        }
    }

    /// Insert an UNPAID transaction for a user.
    pub async fn seed_user_payment(&self, reference: &str, phone: &str, method: &str, item: &str) {
        self.seed(reference, Payer::Individual(phone.into()), method, item)
            .await;
    }

    /// Insert an UNPAID transaction for a group.
    pub async fn seed_group_payment(&self, reference: &str, group_id: &str, item: &str) {
        self.seed(reference, Payer::Group(group_id.into()), "QRIS", item)
            .await;
    }

    async fn seed(&self, reference: &str, payer: Payer, method: &str, item: &str) {
        self.store
            .insert(&Transaction::unpaid(
                reference,
                format!("PREMIUM-{reference}"),
                payer,
                "Budi",
                method,
                15000,
                vec![OrderItem::new(item, 15000)],
            ))
            .await
            .expect("Failed to seed transaction");
    }
}

/// Configuration pointing every provider at `provider_url`.
pub fn test_config(kind: GatewayKind, provider_url: &str) -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        database: None,
        payment_gateway: kind,
        domain: "shiroine.test".into(),
        cors_origins: vec!["*".into()],
        max_body_bytes: 1024 * 1024,
        request_timeout_seconds: 30,
        provider_timeout_seconds: 5,
        rate_limit_burst: 100,
        rate_limit_refill_seconds: 9,
        tripay: TripayConfig {
            api_key: Some(API_KEY.into()),
            private_key: Some(TRIPAY_PRIVATE_KEY.into()),
            merchant_code: Some(TRIPAY_MERCHANT_CODE.into()),
            mode: "sandbox".into(),
            api_url: Some(provider_url.into()),
        },
        iskapay: IskapayConfig {
            api_key: Some(API_KEY.into()),
            api_url: Some(provider_url.into()),
        },
        pakasir: PakasirConfig {
            api_key: Some(API_KEY.into()),
            slug: Some(PAKASIR_SLUG.into()),
            api_url: Some(provider_url.into()),
        },
    }
}

/// Tripay `X-Callback-Signature` for `body`.
pub fn tripay_signature(body: &[u8]) -> String {
    hmac_sha256_hex(TRIPAY_PRIVATE_KEY, body)
}

/// A Tripay-style success envelope.
pub fn tripay_envelope(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "success": true, "message": "Success", "data": data })
}
