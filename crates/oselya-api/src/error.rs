use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use oselya_types::api::{ChatErrorResponse, FieldErrors, FormErrorResponse, NON_FIELD_ERRORS};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("authentication required")]
    Unauthorized,

    #[error("invalid input")]
    Validation(FieldErrors),

    #[error("too many attempts: {0}")]
    Throttled(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// A validation failure on a single field.
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => chat_error(StatusCode::NOT_FOUND, "not_found"),
            ApiError::Forbidden => chat_error(StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Unauthorized => chat_error(StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(FormErrorResponse { ok: false, errors }),
            )
                .into_response(),
            ApiError::Throttled(message) => {
                let mut errors = FieldErrors::new();
                errors.insert(NON_FIELD_ERRORS.to_string(), vec![message]);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(FormErrorResponse { ok: false, errors }),
                )
                    .into_response()
            }
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                chat_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// `{ok: false, error: code}` with the given status.
pub fn chat_error(status: StatusCode, code: &str) -> Response {
    (
        status,
        Json(ChatErrorResponse {
            ok: false,
            error: code.to_string(),
        }),
    )
        .into_response()
}
