//! Channel listing, purchase and status handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ApiError;
use crate::gateway::{CreateTransactionRequest, CreatedTransaction, PaymentChannel, StatusReport};
use crate::handlers::ApiResponse;
use crate::state::AppState;

/// List the payment channels of the active provider.
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<PaymentChannel>>>, ApiError> {
    let channels = state.gateway.list_channels().await?;
    Ok(Json(ApiResponse::ok(channels)))
}

/// Create a provider transaction for a premium purchase.
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<Json<ApiResponse<CreatedTransaction>>, ApiError> {
    let created = state.gateway.create_transaction(&request).await?;
    Ok(Json(ApiResponse::with_message(
        created,
        "Transaction created",
    )))
}

/// Poll the provider for a transaction and reconcile the answer.
pub async fn transaction_status(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<StatusReport>>, ApiError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ApiError::BadRequest("reference is required".into()));
    }

    let report = state
        .gateway
        .check_status(reference, &state.reconciler)
        .await?;
    Ok(Json(ApiResponse::ok(report)))
}
