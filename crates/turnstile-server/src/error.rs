//! HTTP-facing error type.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use turnstile_core::DomainError;
use turnstile_store::StoreError;

use crate::cache::ReadError;
use crate::service::ServiceError;

/// Business code for an unknown user.
pub const CODE_USER_NOT_FOUND: u32 = 10001;
/// Business code for a duplicate registration.
pub const CODE_USER_ALREADY_EXISTS: u32 = 10002;

#[derive(Debug)]
pub enum AppError {
    /// Input invalido
    BadRequest(String),

    /// Usuario no registrado
    UserNotFound(String),

    /// Telefono ya registrado
    UserAlreadyExists(String),

    /// Rechazado por el admission controller
    RateLimited,

    /// Error interno; el detalle solo se registra en logs
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: u32,
    error: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UserNotFound(_) => StatusCode::NOT_FOUND,
            AppError::UserAlreadyExists(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, error, message) = match self {
            AppError::BadRequest(msg) => (400, "bad_request", msg),
            AppError::UserNotFound(phone) => (
                CODE_USER_NOT_FOUND,
                "user_not_found",
                format!("User {} is not registered", phone),
            ),
            AppError::UserAlreadyExists(phone) => (
                CODE_USER_ALREADY_EXISTS,
                "user_already_exists",
                format!("User {} is already registered", phone),
            ),
            AppError::RateLimited => (
                429,
                "rate_limited",
                "Server is busy, retry later".to_string(),
            ),
            AppError::Internal(detail) => {
                error!(detail = %detail, "Internal error");
                (
                    500,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            },
        };

        let body = Json(ErrorResponse {
            code,
            error,
            message,
        });

        (status, body).into_response()
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(phone) => AppError::UserNotFound(phone),
            StoreError::AlreadyExists(phone) => AppError::UserAlreadyExists(phone),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ReadError> for AppError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::NotFound(key) => AppError::UserNotFound(display_identity(&key)),
            ReadError::Internal(detail) => AppError::Internal(detail),
            ReadError::Coalesced(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Domain(e) => e.into(),
            ServiceError::Store(e) => e.into(),
            ServiceError::Read(e) => e.into(),
        }
    }
}

/// `user:phone:138...` -> `138...`
fn display_identity(key: &str) -> String {
    key.strip_prefix(turnstile_core::LookupKey::PREFIX)
        .unwrap_or(key)
        .to_string()
}
