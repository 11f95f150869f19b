//! Payment history handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use shiroine_pay_core::Payer;
use shiroine_pay_store::HistoryPage;

use crate::error::ApiError;
use crate::handlers::ApiResponse;
use crate::state::AppState;

/// Rows per history page.
pub const PER_PAGE: u32 = 10;

/// Whether an identifier names a user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    /// Phone number.
    User,
    /// Group id.
    Group,
}

impl IdentifierType {
    /// The payer for `identifier`.
    #[must_use]
    pub fn payer(self, identifier: &str) -> Payer {
        match self {
            Self::User => Payer::Individual(identifier.to_string()),
            Self::Group => Payer::Group(identifier.to_string()),
        }
    }
}

/// History query.
#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    /// Phone number or group id.
    #[serde(default)]
    pub identifier: String,
    /// `user` or `group`.
    #[serde(rename = "type")]
    pub kind: IdentifierType,
    /// 1-based page number.
    #[serde(default = "first_page")]
    pub page: u32,
}

const fn first_page() -> u32 {
    1
}

/// Page through a payer's transactions, newest first.
pub async fn payment_history(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HistoryRequest>,
) -> Result<Json<ApiResponse<HistoryPage>>, ApiError> {
    let identifier = request.identifier.trim();
    if identifier.is_empty() {
        return Err(ApiError::BadRequest("identifier is required".into()));
    }

    let page = state
        .store
        .history(&request.kind.payer(identifier), request.page.max(1), PER_PAGE)
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}
