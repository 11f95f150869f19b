//! Error types for the core domain.

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by pure domain logic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A plan identifier that is not in the catalog.
    #[error("unknown plan id: {0}")]
    UnknownPlan(String),

    /// No catalog plan could be inferred from an order item name.
    #[error("could not determine plan from item name: {name}")]
    UnresolvablePlan {
        /// The order item name that failed to match.
        name: String,
    },

    /// Payer columns did not hold exactly one identity.
    #[error("invalid payer: {0}")]
    InvalidPayer(String),

    /// A stored status string outside the taxonomy.
    #[error("invalid transaction status: {0}")]
    InvalidStatus(String),

    /// A transaction without order items.
    #[error("transaction has no order items")]
    NoOrderItems,
}
