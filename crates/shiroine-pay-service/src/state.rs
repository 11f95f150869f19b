//! Application state.

use std::sync::Arc;
use std::time::Duration;

use shiroine_pay_store::Store;

use crate::config::ServiceConfig;
use crate::gateway::{build_gateway, PaymentGateway, Result};
use crate::rate_limit::RateLimiter;
use crate::reconciler::Reconciler;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ledger, entitlements and directory.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// The active payment provider.
    pub gateway: Arc<dyn PaymentGateway>,

    /// Applies provider statuses to the ledger.
    pub reconciler: Arc<Reconciler>,

    /// Per-client request limiter for `/api` routes.
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Create the state with the gateway selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client cannot be built.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self> {
        let gateway = build_gateway(&config, store.clone())?;
        Ok(Self::with_gateway(store, config, gateway))
    }

    /// Create the state around an already-built gateway.
    #[must_use]
    pub fn with_gateway(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(store.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_burst,
            Duration::from_secs(config.rate_limit_refill_seconds),
        ));

        Self {
            store,
            config,
            gateway,
            reconciler,
            rate_limiter,
        }
    }
}
