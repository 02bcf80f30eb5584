// API response types - error mapping with no internal information disclosure

use crate::core::errors::GuardError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// JSON error response carrying the status mapped from the domain error.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // violations carry their policy message; internal errors stay terse
        let message = match &err {
            GuardError::PolicyViolation(_)
            | GuardError::MissingVariable(_)
            | GuardError::Yaml(_)
            | GuardError::Template(_) => err.to_string(),
            _ => "internal error".to_string(),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
