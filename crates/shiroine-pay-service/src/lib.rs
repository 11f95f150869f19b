//! Shiroine premium payment HTTP service.
//!
//! This crate sells premium time for the bot through one of three payment
//! providers and grants it once the payment settles:
//!
//! - Payment gateway adapters (Tripay, Iskapay, Pakasir)
//! - Status reconciliation shared by callbacks and polling
//! - Premium activation with expiry stacking
//! - Payment history and identity verification endpoints
//!
//! # Settlement
//!
//! Providers report status by callback, by polling, or both. Whichever path
//! moves a transaction to PAID first wins a conditional ledger write; only
//! that caller activates premium.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for the router signature

pub mod activation;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod rate_limit;
pub mod reconciler;
pub mod routes;
pub mod state;

pub use activation::{ActivationError, Activator};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use gateway::{GatewayError, GatewayKind, PaymentGateway};
pub use reconciler::{Outcome, Reconciler};
pub use routes::create_router;
pub use state::AppState;
