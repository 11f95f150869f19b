//! Transaction status taxonomy.
//!
//! Every provider reports status with its own vocabulary. Adapters translate
//! their literals through a mapping table into [`TransactionStatus`], and only
//! the normalized value ever reaches the ledger or the reconciler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Normalized status of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Created, waiting for the payer. Initial state.
    Unpaid,
    /// Payment captured by the provider.
    Paid,
    /// Payment attempt failed.
    Failed,
    /// Payment window elapsed.
    Expired,
    /// Cancelled by the payer or the provider.
    Cancelled,
}

impl TransactionStatus {
    /// The literal stored in the `payment_history.status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether a stored status may be overwritten by `next`.
    ///
    /// PAID is final, and nothing moves back to UNPAID: unmapped provider
    /// literals normalize to UNPAID and must never revoke a settled attempt.
    /// FAILED, EXPIRED and CANCELLED can still become PAID when a provider
    /// captures late.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self != next && self != Self::Paid && next != Self::Unpaid
    }

    /// Translate a provider literal through a mapping table.
    ///
    /// Matching is ASCII case-insensitive and ignores surrounding whitespace.
    /// Literals missing from the table map to [`TransactionStatus::Unpaid`].
    #[must_use]
    pub fn from_provider(raw: &str, table: &[(&str, Self)]) -> Self {
        let raw = raw.trim();
        table
            .iter()
            .find(|(literal, _)| literal.eq_ignore_ascii_case(raw))
            .map_or(Self::Unpaid, |(_, status)| *status)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNPAID" => Ok(Self::Unpaid),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(CoreError::InvalidStatus(s.to_string())),
        }
    }
}
