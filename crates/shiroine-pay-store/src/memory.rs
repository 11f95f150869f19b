//! In-memory storage implementation.
//!
//! Backs tests and local runs without a database. Behaves like [`crate::PgStore`]
//! including first-match reference lookups and the conditional status write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shiroine_pay_core::{Entitlement, OrderItem, Payer, Transaction, TransactionStatus};

use crate::error::{Result, StoreError};
use crate::{Directory, Entitlements, HistoryPage, Ledger};

#[derive(Default)]
struct Tables {
    transactions: Vec<Transaction>,
    premium: HashMap<(String, String), Entitlement>,
    users: HashMap<String, String>,
    groups: HashMap<String, String>,
    names: HashMap<String, String>,
}

impl Tables {
    fn position(&self, reference: &str) -> Option<usize> {
        self.transactions
            .iter()
            .position(|tx| tx.reference == reference)
            .or_else(|| {
                self.transactions
                    .iter()
                    .position(|tx| tx.merchant_ref == reference)
            })
    }
}

/// Storage held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a phone number to a lid in the user directory.
    pub fn add_user(&self, phone_number: impl Into<String>, lid: impl Into<String>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.users.insert(phone_number.into(), lid.into());
        }
    }

    /// Register a group in the group directory.
    pub fn add_group(&self, group_id: impl Into<String>, name: impl Into<String>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.groups.insert(group_id.into(), name.into());
        }
    }

    /// Record a push name for a lid.
    pub fn set_push_name(&self, lid: impl Into<String>, name: impl Into<String>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.names.insert(lid.into(), name.into());
        }
    }

    /// Make every subsequent write fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of ledger rows.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.tables.read().map(|t| t.transactions.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("writes disabled".into()));
        }
        self.tables
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn insert(&self, transaction: &Transaction) -> Result<()> {
        let mut tables = self.write()?;
        if tables
            .transactions
            .iter()
            .any(|tx| tx.reference == transaction.reference)
        {
            return Err(StoreError::DuplicateReference {
                reference: transaction.reference.clone(),
            });
        }
        tables.transactions.push(transaction.clone());
        Ok(())
    }

    async fn current_status(&self, reference: &str) -> Result<Option<TransactionStatus>> {
        let tables = self.read()?;
        Ok(tables
            .position(reference)
            .map(|i| tables.transactions[i].status))
    }

    async fn update_status(
        &self,
        reference: &str,
        status: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(i) = tables.position(reference) else {
            return Ok(false);
        };
        let tx = &mut tables.transactions[i];
        tx.status = status;
        if paid_at.is_some() {
            tx.paid_at = paid_at;
        }
        tx.updated_at = Utc::now();
        Ok(true)
    }

    async fn transition_status(
        &self,
        reference: &str,
        from: TransactionStatus,
        to: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(i) = tables.position(reference) else {
            return Ok(false);
        };
        let tx = &mut tables.transactions[i];
        if tx.status != from {
            return Ok(false);
        }
        tx.status = to;
        if paid_at.is_some() {
            tx.paid_at = paid_at;
        }
        tx.updated_at = Utc::now();
        Ok(true)
    }

    async fn find_payer_and_items(
        &self,
        reference: &str,
    ) -> Result<Option<(Payer, Vec<OrderItem>)>> {
        let tables = self.read()?;
        Ok(tables.position(reference).map(|i| {
            let tx = &tables.transactions[i];
            (tx.payer.clone(), tx.order_items.clone())
        }))
    }

    async fn find(&self, reference: &str) -> Result<Option<Transaction>> {
        let tables = self.read()?;
        Ok(tables
            .position(reference)
            .map(|i| tables.transactions[i].clone()))
    }

    async fn history(&self, payer: &Payer, page: u32, per_page: u32) -> Result<HistoryPage> {
        let page = page.max(1);
        let tables = self.read()?;

        let mut rows: Vec<&Transaction> = tables
            .transactions
            .iter()
            .filter(|tx| &tx.payer == payer)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as u64;
        let skip = (page as usize - 1).saturating_mul(per_page as usize);
        let history = rows
            .into_iter()
            .skip(skip)
            .take(per_page as usize)
            .cloned()
            .collect();

        Ok(HistoryPage::new(history, page, per_page, total))
    }
}

#[async_trait]
impl Entitlements for MemoryStore {
    async fn get_entitlement(&self, jid: &str, lid: &str) -> Result<Option<Entitlement>> {
        let tables = self.read()?;
        Ok(tables
            .premium
            .get(&(jid.to_string(), lid.to_string()))
            .cloned())
    }

    async fn upsert_entitlement(&self, entitlement: &Entitlement) -> Result<()> {
        let mut tables = self.write()?;
        tables.premium.insert(
            (entitlement.jid.clone(), entitlement.lid.clone()),
            entitlement.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn lid_for_phone(&self, phone_number: &str) -> Result<Option<String>> {
        Ok(self.read()?.users.get(phone_number).cloned())
    }

    async fn group_name(&self, group_id: &str) -> Result<Option<String>> {
        Ok(self.read()?.groups.get(group_id).cloned())
    }

    async fn push_name(&self, lid: &str) -> Result<Option<String>> {
        Ok(self.read()?.names.get(lid).cloned())
    }
}
