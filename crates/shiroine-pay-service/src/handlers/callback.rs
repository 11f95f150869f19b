//! Provider callback handler.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::reconciler::Outcome;
use crate::state::AppState;

/// Callback acknowledgement.
#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    /// Whether the callback was processed.
    pub success: bool,
    /// What reconciliation did.
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Handle a provider callback.
///
/// The raw body is passed through untouched because Tripay signs the exact bytes.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackResponse>, ApiError> {
    let outcome = state
        .gateway
        .handle_callback(&body, &headers, &state.reconciler)
        .await
        .map_err(|e| {
            tracing::warn!(gateway = state.gateway.name(), error = %e, "Callback rejected");
            e
        })?;

    Ok(Json(CallbackResponse {
        success: true,
        outcome,
    }))
}
