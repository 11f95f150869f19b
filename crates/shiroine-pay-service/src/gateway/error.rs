//! Gateway error type.

use shiroine_pay_store::StoreError;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors raised by payment gateway adapters.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Provider credentials are missing.
    #[error("payment gateway not configured: {0}")]
    Configuration(String),

    /// The request is missing or has invalid fields.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The provider rejected the call or reported failure.
    #[error("{provider} error: {message}")]
    Upstream {
        /// Provider name.
        provider: &'static str,
        /// Provider message.
        message: String,
    },

    /// HTTP transport failed (including timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A provider payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A callback signature did not verify.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The transaction is unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// Ledger access failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
