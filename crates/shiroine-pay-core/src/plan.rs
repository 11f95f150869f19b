//! Static plan catalog and plan-name inference.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A premium plan from the static catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    /// Individual, 5 days advertised (7 days granted).
    #[serde(rename = "user-5d")]
    User5d,
    /// Individual, 15 days.
    #[serde(rename = "user-15d")]
    User15d,
    /// Individual, one month.
    #[serde(rename = "user-1m")]
    User1m,
    /// Group, 15 days.
    #[serde(rename = "group-15d")]
    Group15d,
    /// Group, one month.
    #[serde(rename = "group-1m")]
    Group1m,
}

impl Plan {
    /// Every catalog entry.
    pub const ALL: [Self; 5] = [
        Self::User5d,
        Self::User15d,
        Self::User1m,
        Self::Group15d,
        Self::Group1m,
    ];

    /// The plan identifier, e.g. `user-15d`.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::User5d => "user-5d",
            Self::User15d => "user-15d",
            Self::User1m => "user-1m",
            Self::Group15d => "group-15d",
            Self::Group1m => "group-1m",
        }
    }

    /// Days of entitlement granted.
    #[must_use]
    pub const fn days(self) -> i64 {
        match self {
            Self::User5d => 7,
            Self::User15d | Self::Group15d => 15,
            Self::User1m | Self::Group1m => 30,
        }
    }

    /// Quota ceiling while the plan is active.
    #[must_use]
    pub const fn special_limit(self) -> i32 {
        match self {
            Self::User5d => 5,
            Self::User15d => 10,
            Self::User1m => 15,
            Self::Group15d => 30,
            Self::Group1m => 50,
        }
    }

    /// Whether the plan is sold to groups.
    #[must_use]
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group15d | Self::Group1m)
    }

    /// Infer the plan from an order item's display name.
    ///
    /// The name must carry an audience marker (`user premium`, `grup premium`,
    /// ...), with the individual marker taking precedence, and a duration written as `<number> <unit>` where the unit is
    /// days (`day`, `hari`) or months (`month`, `bulan`).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnresolvablePlan` if either part is missing or the
    /// combination is not sold.
    pub fn infer_from_item_name(name: &str) -> Result<Self, CoreError> {
        let lower = name.to_lowercase();
        let unresolvable = || CoreError::UnresolvablePlan {
            name: name.to_string(),
        };

        let individual = ["user premium", "premium user"]
            .iter()
            .any(|m| lower.contains(m));
        let group = ["group premium", "grup premium", "premium group", "premium grup"]
            .iter()
            .any(|m| lower.contains(m));

        let days = duration_days(&lower).ok_or_else(unresolvable)?;

        // An individual marker wins when a name carries both.
        match (individual, group, days) {
            (true, _, 5) => Ok(Self::User5d),
            (true, _, 15) => Ok(Self::User15d),
            (true, _, 30) => Ok(Self::User1m),
            (false, true, 15) => Ok(Self::Group15d),
            (false, true, 30) => Ok(Self::Group1m),
            _ => Err(unresolvable()),
        }
    }
}

/// Find the first `<number> <unit>` pair and convert it to days.
fn duration_days(lower: &str) -> Option<i64> {
    let chars: Vec<char> = lower.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() || (i > 0 && chars[i - 1].is_alphanumeric()) {
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let number: String = chars[start..i].iter().collect();

        let mut j = i;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        let unit_start = j;
        while j < chars.len() && chars[j].is_alphabetic() {
            j += 1;
        }
        let unit: String = chars[unit_start..j].iter().collect();

        let Ok(n) = number.parse::<i64>() else {
            continue;
        };
        if unit.starts_with("day") || unit.starts_with("hari") {
            return Some(n);
        }
        if unit.starts_with("month") || unit.starts_with("bulan") {
            return n.checked_mul(30);
        }
    }

    None
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Plan {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| CoreError::UnknownPlan(s.to_string()))
    }
}
