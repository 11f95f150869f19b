//! Identity verification shown before checkout.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::handlers::history::IdentifierType;
use crate::handlers::ApiResponse;
use crate::state::AppState;

const DEFAULT_PUSH_NAME: &str = "User";

/// Verification query.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Phone number or group id.
    #[serde(default)]
    pub identifier: String,
    /// `user` or `group`.
    #[serde(rename = "type")]
    pub kind: IdentifierType,
}

/// The identity as the bot knows it.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VerifiedIdentity {
    /// A known group.
    Group {
        /// Group id.
        id: String,
        /// Group subject.
        name: String,
    },
    /// A known user.
    User {
        /// Phone number.
        #[serde(rename = "phoneNumber")]
        phone_number: String,
        /// Directory lid.
        lid: String,
        /// Push name, `User` when unknown.
        name: String,
    },
}

/// Confirm that a user or group is known to the bot.
pub async fn verify_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<ApiResponse<VerifiedIdentity>>, ApiError> {
    let identifier = request.identifier.trim();
    if identifier.is_empty() {
        return Err(ApiError::BadRequest("identifier is required".into()));
    }

    match request.kind {
        IdentifierType::Group => {
            let name = state
                .store
                .group_name(identifier)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("group {identifier}")))?;
            let message = format!("Apakah grup kamu bernama \"{name}\"?");
            Ok(Json(ApiResponse::with_message(
                VerifiedIdentity::Group {
                    id: identifier.to_string(),
                    name,
                },
                message,
            )))
        }
        IdentifierType::User => {
            let lid = state
                .store
                .lid_for_phone(identifier)
                .await?
                .filter(|lid| !lid.is_empty())
                .ok_or_else(|| ApiError::NotFound(format!("user {identifier}")))?;
            let name = match state.store.push_name(&lid).await {
                Ok(Some(name)) if !name.is_empty() => name,
                Ok(_) => DEFAULT_PUSH_NAME.to_string(),
                Err(e) => {
                    tracing::warn!(lid = %lid, error = %e, "Push name lookup failed");
                    DEFAULT_PUSH_NAME.to_string()
                }
            };
            let message = format!("Apakah kamu bernama \"{name}\"?");
            Ok(Json(ApiResponse::with_message(
                VerifiedIdentity::User {
                    phone_number: identifier.to_string(),
                    lid,
                    name,
                },
                message,
            )))
        }
    }
}
