//! Transaction types for shiroine payments.
//!
//! A [`Transaction`] is one row of `payment_history`: one purchase attempt,
//! created UNPAID when the provider accepts it and reconciled afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::TransactionStatus;

/// A line item of a purchase.
///
/// The `name` is free text shown to the payer; the plan is inferred from it
/// server-side once the payment settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Optional stock keeping unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    /// Display name, e.g. `"User Premium - 15 Days"`.
    pub name: String,

    /// Unit price in the smallest currency unit.
    #[serde(default)]
    pub price: i64,

    /// Quantity purchased.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

impl OrderItem {
    /// Create a single-quantity item.
    #[must_use]
    pub fn new(name: impl Into<String>, price: i64) -> Self {
        Self {
            sku: None,
            name: name.into(),
            price,
            quantity: 1,
        }
    }
}

/// Who pays: an individual phone number or a group id, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Payer {
    /// An individual identified by phone number.
    Individual(String),
    /// A group identified by its group id.
    Group(String),
}

impl Payer {
    /// Build a payer from the two nullable ledger columns.
    ///
    /// Empty strings count as absent.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPayer` unless exactly one column is populated.
    pub fn from_columns(
        phone_number: Option<String>,
        group_id: Option<String>,
    ) -> Result<Self, CoreError> {
        let phone_number = phone_number.filter(|p| !p.trim().is_empty());
        let group_id = group_id.filter(|g| !g.trim().is_empty());

        match (phone_number, group_id) {
            (Some(phone), None) => Ok(Self::Individual(phone)),
            (None, Some(group)) => Ok(Self::Group(group)),
            (Some(_), Some(_)) => Err(CoreError::InvalidPayer(
                "both phone number and group id are set".into(),
            )),
            (None, None) => Err(CoreError::InvalidPayer(
                "either phone number or group id is required".into(),
            )),
        }
    }

    /// The raw identifier (phone number or group id).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Individual(id) | Self::Group(id) => id,
        }
    }

    /// Value for the `phone_number` column.
    #[must_use]
    pub fn phone_number(&self) -> Option<&str> {
        match self {
            Self::Individual(phone) => Some(phone),
            Self::Group(_) => None,
        }
    }

    /// Value for the `group_id` column.
    #[must_use]
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Group(group) => Some(group),
            Self::Individual(_) => None,
        }
    }

    /// Whether this payer is a group.
    #[must_use]
    pub const fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

/// One purchase attempt as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Provider-facing reference (reconciliation key).
    pub reference: String,

    /// Internally generated reference, unique per attempt.
    pub merchant_ref: String,

    /// The paying identity.
    pub payer: Payer,

    /// Customer display name.
    pub customer_name: String,

    /// Payment channel code as chosen by the caller.
    pub method: String,

    /// Amount in the smallest currency unit.
    pub amount: i64,

    /// Current normalized status.
    pub status: TransactionStatus,

    /// Ordered line items; the first one names the plan.
    pub order_items: Vec<OrderItem>,

    /// Provider payment number (virtual account number or QR payload).
    pub payment_number: Option<String>,

    /// Provider-side payment deadline.
    pub expired_at: Option<DateTime<Utc>>,

    /// When the payment was captured.
    pub paid_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row was last touched.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new UNPAID transaction.
    #[must_use]
    pub fn unpaid(
        reference: impl Into<String>,
        merchant_ref: impl Into<String>,
        payer: Payer,
        customer_name: impl Into<String>,
        method: impl Into<String>,
        amount: i64,
        order_items: Vec<OrderItem>,
    ) -> Self {
        let now = Utc::now();
        Self {
            reference: reference.into(),
            merchant_ref: merchant_ref.into(),
            payer,
            customer_name: customer_name.into(),
            method: method.into(),
            amount,
            status: TransactionStatus::Unpaid,
            order_items,
            payment_number: None,
            expired_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the provider payment number and deadline.
    #[must_use]
    pub fn with_payment_details(
        mut self,
        payment_number: Option<String>,
        expired_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.payment_number = payment_number;
        self.expired_at = expired_at;
        self
    }

    /// Whether `key` names this transaction by either reference.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.reference == key || self.merchant_ref == key
    }
}
