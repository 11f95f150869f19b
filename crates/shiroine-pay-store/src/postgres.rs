//! PostgreSQL storage implementation.
//!
//! Queries are built at runtime with bound parameters so the crate compiles
//! without a live database. Entitlement timestamps are stored as RFC 3339
//! text, the format the bot reads from the `premium` table.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use shiroine_pay_core::{Entitlement, OrderItem, Payer, Transaction, TransactionStatus};

use crate::error::{Result, StoreError};
use crate::schema::BOOTSTRAP;
use crate::{Directory, Entitlements, HistoryPage, Ledger};

const TRANSACTION_COLUMNS: &str = "reference, merchant_ref, phone_number, group_id, \
     customer_name, method, amount, status, order_items, payment_number, expired_at, \
     paid_at, created_at, updated_at";

/// Matches one row by either reference, preferring the provider reference.
const MATCH_ONE: &str = "SELECT id FROM payment_history \
     WHERE reference = $1 OR merchant_ref = $1 \
     ORDER BY (reference = $1) DESC, id ASC LIMIT 1";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Connect with pre-built options (e.g. assembled from `DB_*` settings).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect_with(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create a pool that connects on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` cannot be parsed.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect_lazy(url)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create any missing tables and indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub async fn bootstrap(&self) -> Result<()> {
        for statement in BOOTSTRAP {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("database schema ready");
        Ok(())
    }

    fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
        let payer = Payer::from_columns(row.try_get("phone_number")?, row.try_get("group_id")?)?;
        let status: String = row.try_get("status")?;
        let Json(order_items): Json<Vec<OrderItem>> = row.try_get("order_items")?;

        Ok(Transaction {
            reference: row.try_get("reference")?,
            merchant_ref: row.try_get("merchant_ref")?,
            payer,
            customer_name: row.try_get("customer_name")?,
            method: row.try_get("method")?,
            amount: row.try_get("amount")?,
            status: status.parse()?,
            order_items,
            payment_number: row.try_get("payment_number")?,
            expired_at: row.try_get("expired_at")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: Option<String>, jid: &str, column: &str) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(jid = %jid, column, value = %raw, error = %e, "unreadable premium timestamp");
            None
        }
    }
}

#[async_trait]
impl Ledger for PgStore {
    async fn insert(&self, transaction: &Transaction) -> Result<()> {
        let query = format!(
            "INSERT INTO payment_history ({TRANSACTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );

        let result = sqlx::query(&query)
            .bind(&transaction.reference)
            .bind(&transaction.merchant_ref)
            .bind(transaction.payer.phone_number())
            .bind(transaction.payer.group_id())
            .bind(&transaction.customer_name)
            .bind(&transaction.method)
            .bind(transaction.amount)
            .bind(transaction.status.as_str())
            .bind(Json(&transaction.order_items))
            .bind(&transaction.payment_number)
            .bind(transaction.expired_at)
            .bind(transaction.paid_at)
            .bind(transaction.created_at)
            .bind(transaction.updated_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateReference {
                    reference: transaction.reference.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn current_status(&self, reference: &str) -> Result<Option<TransactionStatus>> {
        let query = format!("SELECT status FROM payment_history WHERE id = ({MATCH_ONE})");
        let row = sqlx::query(&query)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<TransactionStatus> {
            let status: String = r.try_get("status")?;
            Ok(status.parse()?)
        })
        .transpose()
    }

    async fn update_status(
        &self,
        reference: &str,
        status: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let query = format!(
            "UPDATE payment_history \
             SET status = $2, paid_at = COALESCE($3, paid_at), updated_at = NOW() \
             WHERE id = ({MATCH_ONE})"
        );
        let result = sqlx::query(&query)
            .bind(reference)
            .bind(status.as_str())
            .bind(paid_at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn transition_status(
        &self,
        reference: &str,
        from: TransactionStatus,
        to: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let query = format!(
            "UPDATE payment_history \
             SET status = $2, paid_at = COALESCE($3, paid_at), updated_at = NOW() \
             WHERE id = ({MATCH_ONE}) AND status = $4"
        );
        let result = sqlx::query(&query)
            .bind(reference)
            .bind(to.as_str())
            .bind(paid_at)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_payer_and_items(
        &self,
        reference: &str,
    ) -> Result<Option<(Payer, Vec<OrderItem>)>> {
        let query = format!(
            "SELECT phone_number, group_id, order_items FROM payment_history \
             WHERE id = ({MATCH_ONE})"
        );
        let row = sqlx::query(&query)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<(Payer, Vec<OrderItem>)> {
            let payer = Payer::from_columns(r.try_get("phone_number")?, r.try_get("group_id")?)?;
            let Json(items): Json<Vec<OrderItem>> = r.try_get("order_items")?;
            Ok((payer, items))
        })
        .transpose()
    }

    async fn find(&self, reference: &str) -> Result<Option<Transaction>> {
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_history WHERE id = ({MATCH_ONE})"
        );
        let row = sqlx::query(&query)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn history(&self, payer: &Payer, page: u32, per_page: u32) -> Result<HistoryPage> {
        let page = page.max(1);
        let column = if payer.is_group() {
            "group_id"
        } else {
            "phone_number"
        };
        let offset = i64::from(page - 1) * i64::from(per_page);

        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_history \
             WHERE {column} = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&query)
            .bind(payer.id())
            .bind(i64::from(per_page))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut history = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_transaction(row) {
                Ok(tx) => history.push(tx),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable payment_history row"),
            }
        }

        let count_query =
            format!("SELECT COUNT(*) AS total FROM payment_history WHERE {column} = $1");
        let total: i64 = sqlx::query(&count_query)
            .bind(payer.id())
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        Ok(HistoryPage::new(
            history,
            page,
            per_page,
            u64::try_from(total).unwrap_or(0),
        ))
    }
}

#[async_trait]
impl Entitlements for PgStore {
    async fn get_entitlement(&self, jid: &str, lid: &str) -> Result<Option<Entitlement>> {
        let row = sqlx::query(
            "SELECT jid, lid, special_limit, max_special_limit, expired, last_special_reset, \
             updated_at FROM premium WHERE jid = $1 AND lid = $2",
        )
        .bind(jid)
        .bind(lid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<Entitlement> {
            Ok(Entitlement {
                jid: r.try_get("jid")?,
                lid: r.try_get("lid")?,
                special_limit: r.try_get("special_limit")?,
                max_special_limit: r.try_get("max_special_limit")?,
                expired: parse_timestamp(r.try_get("expired")?, jid, "expired"),
                last_special_reset: parse_timestamp(
                    r.try_get("last_special_reset")?,
                    jid,
                    "last_special_reset",
                ),
                updated_at: r.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn upsert_entitlement(&self, entitlement: &Entitlement) -> Result<()> {
        sqlx::query(
            "INSERT INTO premium \
             (jid, lid, special_limit, max_special_limit, expired, last_special_reset, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (jid, lid) DO UPDATE SET \
             special_limit = EXCLUDED.special_limit, \
             max_special_limit = EXCLUDED.max_special_limit, \
             expired = EXCLUDED.expired, \
             last_special_reset = EXCLUDED.last_special_reset, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&entitlement.jid)
        .bind(&entitlement.lid)
        .bind(entitlement.special_limit)
        .bind(entitlement.max_special_limit)
        .bind(entitlement.expired.map(format_timestamp))
        .bind(entitlement.last_special_reset.map(format_timestamp))
        .bind(entitlement.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn lid_for_phone(&self, phone_number: &str) -> Result<Option<String>> {
        let lid: Option<Option<String>> =
            sqlx::query_scalar("SELECT lid FROM users WHERE phone_number = $1")
                .bind(phone_number)
                .fetch_optional(&self.pool)
                .await?;
        Ok(lid.flatten().filter(|l| !l.is_empty()))
    }

    async fn group_name(&self, group_id: &str) -> Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar("SELECT group_name FROM groups WHERE id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    async fn push_name(&self, lid: &str) -> Result<Option<String>> {
        let name: Option<Option<String>> =
            sqlx::query_scalar("SELECT push_name FROM names WHERE lid = $1")
                .bind(lid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name.flatten().filter(|n| !n.is_empty()))
    }
}
