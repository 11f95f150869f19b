//! Payment gateway adapters.
//!
//! Every provider is reached through [`PaymentGateway`]. Each adapter owns its
//! authentication, wire shapes and status vocabulary; the shared
//! [`Reconciler`] never needs to know which provider reported a status.
//!
//! | Provider | Channels | Auth | Status discovery |
//! |----------|----------|------|------------------|
//! | Tripay   | fetched, active only | Bearer + HMAC signatures | callback + polling |
//! | Iskapay  | QRIS only | Bearer | polling (callback best-effort) |
//! | Pakasir  | static catalog | API key in body | callback, QRIS polling |

pub mod error;
pub mod iskapay;
pub mod pakasir;
pub mod tripay;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shiroine_pay_core::{OrderItem, Payer, Transaction, TransactionStatus};
use shiroine_pay_store::Store;

use crate::config::ServiceConfig;
use crate::reconciler::{Outcome, Reconciler};

pub use error::{GatewayError, Result};
pub use iskapay::IskapayGateway;
pub use pakasir::PakasirGateway;
pub use tripay::TripayGateway;

/// Which provider the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Tripay (multi-channel, signed callbacks).
    Tripay,
    /// Iskapay (QRIS only).
    Iskapay,
    /// Pakasir (QRIS, virtual accounts, `PayPal`).
    Pakasir,
}

impl GatewayKind {
    /// Provider name as used in configuration and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tripay => "tripay",
            Self::Iskapay => "iskapay",
            Self::Pakasir => "pakasir",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tripay" => Ok(Self::Tripay),
            "iskapay" => Ok(Self::Iskapay),
            "pakasir" => Ok(Self::Pakasir),
            other => Err(GatewayError::Configuration(format!(
                "unknown payment gateway: {other}"
            ))),
        }
    }
}

/// A payment channel offered to the buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentChannel {
    /// Channel code passed back as `method`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Channel type (`qris`, `virtual_account`, ...).
    #[serde(rename = "type", default)]
    pub channel_type: String,
    /// Display group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Whether the channel can be used.
    #[serde(default)]
    pub active: bool,
    /// Icon file or URL.
    #[serde(default, alias = "icon_url", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Provider-specific extras (fees, limits).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentChannel {
    /// A channel defined locally rather than fetched.
    #[must_use]
    pub fn fixed(code: &str, name: &str, channel_type: &str, group: &str, icon: &str) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            channel_type: channel_type.into(),
            group: Some(group.into()),
            active: true,
            icon: Some(icon.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// A purchase request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    /// Channel code chosen by the buyer.
    #[serde(default)]
    pub method: String,
    /// Amount in rupiah.
    #[serde(default)]
    pub amount: i64,
    /// Buyer display name.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Individual payer phone number.
    #[serde(default)]
    pub customer_phone: Option<String>,
    /// Group payer id.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Line items; the first one names the plan.
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
    /// Where the provider sends the buyer afterwards.
    #[serde(default)]
    pub return_url: Option<String>,
}

impl CreateTransactionRequest {
    /// Check the preconditions shared by every provider and resolve the payer.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for a non-positive amount, missing
    /// order items, or anything other than exactly one payer identity.
    pub fn validate(&self) -> Result<Payer> {
        if self.amount <= 0 {
            return Err(GatewayError::Validation(
                "amount must be greater than zero".into(),
            ));
        }
        if self.order_items.is_empty() {
            return Err(GatewayError::Validation(
                "at least one order item is required".into(),
            ));
        }
        Payer::from_columns(self.customer_phone.clone(), self.group_id.clone())
            .map_err(|e| GatewayError::Validation(e.to_string()))
    }

    /// The buyer name, defaulting to `Customer-<identity>`.
    #[must_use]
    pub fn customer_name_for(&self, payer: &Payer) -> String {
        self.customer_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| format!("Customer-{}", payer.id()), ToString::to_string)
    }
}

/// The result of creating a transaction with a provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTransaction {
    /// Reconciliation key for status checks.
    pub reference: String,
    /// Internal reference.
    pub merchant_ref: String,
    /// Channel used.
    pub payment_method: String,
    /// Amount charged.
    pub amount: i64,
    /// Always UNPAID at creation.
    pub status: TransactionStatus,
    /// Hosted checkout page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Virtual account number or pay code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_number: Option<String>,
    /// QRIS payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_string: Option<String>,
    /// Payment deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    /// Provider fee, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<i64>,
    /// The provider's own response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<serde_json::Value>,
}

/// Where a status report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    /// Fetched from the provider API.
    Provider,
    /// Read from the local ledger.
    Ledger,
}

/// A normalized transaction status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// The reference that was queried.
    pub reference: String,
    /// Normalized status.
    pub status: TransactionStatus,
    /// The provider's literal status string.
    pub provider_status: String,
    /// Capture time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Amount, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Channel, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Provider or ledger.
    pub source: StatusSource,
    /// The provider's own response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<serde_json::Value>,
}

/// A parsed and authenticated callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    /// Reference echoed by the provider.
    pub reference: String,
    /// Normalized status.
    pub status: TransactionStatus,
    /// The provider's literal status or event name.
    pub provider_status: String,
    /// Capture time, when supplied and parseable.
    pub paid_at: Option<DateTime<Utc>>,
}

/// The contract every payment provider implements.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name.
    fn name(&self) -> &'static str;

    /// Channels the buyer may choose from, in display order.
    async fn list_channels(&self) -> Result<Vec<PaymentChannel>>;

    /// Create a provider transaction and record it UNPAID in the ledger.
    ///
    /// A ledger write failure is logged and does not fail the purchase.
    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreatedTransaction>;

    /// Current status of a transaction, normalized.
    async fn get_status(&self, reference: &str) -> Result<StatusReport>;

    /// Authenticate and parse a raw callback body.
    fn parse_callback(&self, body: &[u8], headers: &HeaderMap) -> Result<CallbackEvent>;

    /// Parse a callback and reconcile it.
    ///
    /// Ledger failures propagate so the provider retries the delivery.
    async fn handle_callback(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        reconciler: &Reconciler,
    ) -> Result<Outcome> {
        let event = self.parse_callback(body, headers)?;

        tracing::info!(
            gateway = self.name(),
            reference = %event.reference,
            status = %event.status,
            provider_status = %event.provider_status,
            "Callback received"
        );

        Ok(reconciler
            .reconcile(&event.reference, event.status, event.paid_at)
            .await?)
    }

    /// Poll the provider and reconcile the answer.
    ///
    /// Ledger failures are logged; the caller still gets the provider status.
    async fn check_status(&self, reference: &str, reconciler: &Reconciler) -> Result<StatusReport> {
        let report = self.get_status(reference).await?;
        if report.source == StatusSource::Provider {
            reconciler
                .reconcile_polled(reference, report.status, report.paid_at)
                .await;
        }
        Ok(report)
    }
}

/// Build the configured gateway.
///
/// # Errors
///
/// Returns `GatewayError::Http` if the HTTP client cannot be built.
pub fn build_gateway(
    config: &ServiceConfig,
    store: Arc<dyn Store>,
) -> Result<Arc<dyn PaymentGateway>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider_timeout_seconds))
        .build()?;

    let gateway: Arc<dyn PaymentGateway> = match config.payment_gateway {
        GatewayKind::Tripay => Arc::new(TripayGateway::new(
            config.tripay.clone(),
            config.domain.clone(),
            http,
            store,
        )),
        GatewayKind::Iskapay => Arc::new(IskapayGateway::new(config.iskapay.clone(), http, store)),
        GatewayKind::Pakasir => Arc::new(PakasirGateway::new(
            config.pakasir.clone(),
            config.domain.clone(),
            http,
            store,
        )),
    };

    tracing::info!(gateway = gateway.name(), "Payment gateway initialized");
    Ok(gateway)
}

/// Insert the UNPAID ledger row, logging instead of failing.
pub(crate) async fn record_unpaid(store: &dyn Store, transaction: &Transaction) {
    match store.insert(transaction).await {
        Ok(()) => tracing::info!(
            reference = %transaction.reference,
            merchant_ref = %transaction.merchant_ref,
            amount = transaction.amount,
            "Transaction recorded"
        ),
        Err(e) => tracing::error!(
            reference = %transaction.reference,
            merchant_ref = %transaction.merchant_ref,
            error = %e,
            "Failed to record transaction; purchase continues without a ledger row"
        ),
    }
}

/// Decode a provider response body.
///
/// Non-2xx responses that still carry JSON are returned so the adapter can
/// surface the provider's own message.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    match serde_json::from_slice(&body) {
        Ok(value) => Ok(value),
        Err(e) if status.is_success() => Err(GatewayError::Upstream {
            provider,
            message: format!("unreadable response: {e}"),
        }),
        Err(_) => Err(GatewayError::Upstream {
            provider,
            message: format!("HTTP {status}"),
        }),
    }
}

/// Parse an RFC 3339 timestamp, ignoring garbage.
pub(crate) fn parse_rfc3339(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Convert a unix timestamp in seconds.
pub(crate) fn from_unix(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds
        .filter(|s| *s > 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
}
