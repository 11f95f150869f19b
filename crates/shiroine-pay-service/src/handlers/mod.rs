//! API handlers.

pub mod callback;
pub mod health;
pub mod history;
pub mod payments;
pub mod verify;

use serde::Serialize;

/// Success envelope shared by the `/api` routes.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`; failures go through `ApiError`.
    pub success: bool,
    /// Human-readable summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` without a message.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    /// Wrap `data` with a message.
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}
