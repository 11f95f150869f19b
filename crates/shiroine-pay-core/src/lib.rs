//! Core types and utilities for shiroine premium payments.
//!
//! This crate provides the foundational types shared by the store and the service:
//!
//! - **Transactions**: `Transaction`, `OrderItem`, `Payer`, `TransactionStatus`
//! - **Plans**: `Plan`, the static catalog and plan-name inference
//! - **Entitlements**: `Entitlement` and the expiry stacking rule
//! - **Identifiers**: merchant reference and order id generation
//!
//! # Amounts
//!
//! Amounts are stored as `i64` in the smallest currency unit (rupiah has no
//! minor unit, so `15000` means Rp 15.000).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entitlement;
pub mod error;
pub mod ids;
pub mod plan;
pub mod status;
pub mod transaction;

pub use entitlement::{stacked_expiry, Entitlement};
pub use error::{CoreError, Result};
pub use ids::{invoice_order_id, premium_merchant_ref};
pub use plan::Plan;
pub use status::TransactionStatus;
pub use transaction::{OrderItem, Payer, Transaction};
