//! Premium entitlements and the expiry stacking rule.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::Plan;

/// A premium grant for one `(jid, lid)` identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Primary identity (phone number or group id).
    pub jid: String,

    /// Linking identity (directory lid, or the jid when unresolved).
    pub lid: String,

    /// Quota used since the last reset.
    pub special_limit: i32,

    /// Quota ceiling of the active plan.
    pub max_special_limit: i32,

    /// Absolute expiry. `None` when the stored value is missing or unreadable.
    pub expired: Option<DateTime<Utc>>,

    /// Last time the quota was reset.
    pub last_special_reset: Option<DateTime<Utc>>,

    /// Last write.
    pub updated_at: DateTime<Utc>,
}

impl Entitlement {
    /// Whether the entitlement is still running at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expired.is_some_and(|expiry| expiry > now)
    }

    /// Compute the row after a successful purchase of `plan`.
    ///
    /// Quota usage is reset to zero, the ceiling follows the new plan and
    /// the expiry stacks on any still-active previous grant.
    #[must_use]
    pub fn activate(
        existing: Option<&Self>,
        jid: impl Into<String>,
        lid: impl Into<String>,
        plan: Plan,
        now: DateTime<Utc>,
    ) -> Self {
        let expiry = stacked_expiry(existing.and_then(|e| e.expired), now, plan.days());

        Self {
            jid: jid.into(),
            lid: lid.into(),
            special_limit: 0,
            max_special_limit: plan.special_limit(),
            expired: Some(expiry),
            last_special_reset: Some(now),
            updated_at: now,
        }
    }
}

/// New expiry after adding `days` to an entitlement.
///
/// An expiry still in the future is extended; a lapsed or absent one
/// restarts from `now`.
#[must_use]
pub fn stacked_expiry(
    existing: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    days: i64,
) -> DateTime<Utc> {
    let base = match existing {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    base + Duration::days(days)
}
