//! Bootstrap DDL.
//!
//! `payment_history` and `premium` are owned here. The directory tables
//! (`users`, `groups`, `names`) belong to the bot and are only read; the
//! bootstrap creates them when missing so a fresh database is usable.

/// Statements run by [`crate::PgStore::bootstrap`], in order.
pub const BOOTSTRAP: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS payment_history (
        id BIGSERIAL PRIMARY KEY,
        reference TEXT NOT NULL UNIQUE,
        merchant_ref TEXT NOT NULL,
        phone_number TEXT,
        group_id TEXT,
        customer_name TEXT NOT NULL,
        method TEXT NOT NULL,
        amount BIGINT NOT NULL,
        status TEXT NOT NULL DEFAULT 'UNPAID',
        order_items JSONB NOT NULL DEFAULT '[]',
        payment_number TEXT,
        expired_at TIMESTAMPTZ,
        paid_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_payment_history_merchant_ref ON payment_history (merchant_ref)",
    "CREATE INDEX IF NOT EXISTS idx_payment_history_phone ON payment_history (phone_number, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_payment_history_group ON payment_history (group_id, created_at DESC)",
    r"CREATE TABLE IF NOT EXISTS premium (
        jid TEXT NOT NULL,
        lid TEXT NOT NULL,
        special_limit INTEGER NOT NULL DEFAULT 0,
        max_special_limit INTEGER NOT NULL DEFAULT 0,
        expired TEXT,
        last_special_reset TEXT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (jid, lid)
    )",
    "CREATE TABLE IF NOT EXISTS users (phone_number TEXT PRIMARY KEY, lid TEXT)",
    "CREATE TABLE IF NOT EXISTS groups (id TEXT PRIMARY KEY, group_name TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS names (lid TEXT PRIMARY KEY, push_name TEXT)",
];
