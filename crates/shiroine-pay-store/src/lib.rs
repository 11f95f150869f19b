//! Storage layer for shiroine payments.
//!
//! This crate persists the transaction ledger and premium entitlements, and
//! reads the bot's identity directory.
//!
//! # Architecture
//!
//! Storage is split into three contracts, all implemented by both backends:
//!
//! - [`Ledger`]: `payment_history`, one row per purchase attempt
//! - [`Entitlements`]: `premium`, one row per `(jid, lid)` identity
//! - [`Directory`]: read-only `users`, `groups` and `names` lookups
//!
//! [`Store`] bundles the three so the service can hold a single handle.
//!
//! # Example
//!
//! ```no_run
//! use shiroine_pay_store::{Ledger, PgStore};
//!
//! # async fn run() -> shiroine_pay_store::Result<()> {
//! let store = PgStore::connect("postgres://localhost/shiroine").await?;
//! store.bootstrap().await?;
//!
//! let status = store.current_status("T0001").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shiroine_pay_core::{Entitlement, OrderItem, Payer, Transaction, TransactionStatus};

/// One page of a payer's purchase history, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Transactions on this page.
    pub history: Vec<Transaction>,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub per_page: u32,
    /// Total rows for the payer.
    pub total_count: u64,
    /// Total number of pages.
    pub total_pages: u64,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether an earlier page exists.
    pub has_previous: bool,
}

impl HistoryPage {
    /// Assemble a page and derive the paging flags.
    #[must_use]
    pub fn new(history: Vec<Transaction>, page: u32, per_page: u32, total_count: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total_count.div_ceil(u64::from(per_page))
        };
        Self {
            history,
            page,
            per_page,
            total_count,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_previous: page > 1,
        }
    }
}

/// The persisted record of purchase attempts.
///
/// Every lookup accepts either the provider reference or the merchant
/// reference, and takes the first matching row.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Insert a new transaction row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateReference` if the reference exists.
    async fn insert(&self, transaction: &Transaction) -> Result<()>;

    /// Current stored status, or `None` if no row matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn current_status(&self, reference: &str) -> Result<Option<TransactionStatus>>;

    /// Set the status unconditionally.
    ///
    /// `paid_at` is only written when present. Returns whether a row matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn update_status(
        &self,
        reference: &str,
        status: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Move the status from `from` to `to` only if it still equals `from`.
    ///
    /// Returns `true` when this call performed the write. Concurrent callers
    /// racing on the same transition see exactly one `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn transition_status(
        &self,
        reference: &str,
        from: TransactionStatus,
        to: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Payer and order items of a transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` if the payer columns are invalid.
    async fn find_payer_and_items(&self, reference: &str)
        -> Result<Option<(Payer, Vec<OrderItem>)>>;

    /// The full transaction row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find(&self, reference: &str) -> Result<Option<Transaction>>;

    /// A page of the payer's transactions, newest first.
    ///
    /// `page` is 1-based; values below 1 are treated as 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn history(&self, payer: &Payer, page: u32, per_page: u32) -> Result<HistoryPage>;
}

/// Premium entitlement rows.
#[async_trait]
pub trait Entitlements: Send + Sync {
    /// Load the entitlement for `(jid, lid)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_entitlement(&self, jid: &str, lid: &str) -> Result<Option<Entitlement>>;

    /// Insert or replace the entitlement for its `(jid, lid)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_entitlement(&self, entitlement: &Entitlement) -> Result<()>;
}

/// Read-only identity directory maintained by the bot.
#[async_trait]
pub trait Directory: Send + Sync {
    /// The lid linked to a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn lid_for_phone(&self, phone_number: &str) -> Result<Option<String>>;

    /// Display name of a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn group_name(&self, group_id: &str) -> Result<Option<String>>;

    /// Push name recorded for a lid.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn push_name(&self, lid: &str) -> Result<Option<String>>;
}

/// Everything the service needs from storage.
pub trait Store: Ledger + Entitlements + Directory {}

impl<T: Ledger + Entitlements + Directory> Store for T {}
