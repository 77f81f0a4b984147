// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Not permitted for role: {0}")]
    Forbidden(String),

    #[error("Account not found. Please create an account first.")]
    AccountNotFound,

    #[error("Role mismatch for this account")]
    RoleMismatch,

    #[error("{0} does not match")]
    IdentifierMismatch(&'static str),

    #[error("Invalid admin key")]
    InvalidAdminKey,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A pending request already exists")]
    DuplicateRequest,

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the caller can recover by retrying with different credentials.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            AppError::AccountNotFound
                | AppError::RoleMismatch
                | AppError::IdentifierMismatch(_)
                | AppError::InvalidAdminKey
        )
    }

    /// Stable machine-readable code used in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidToken => "invalid_token",
            AppError::Forbidden(_) => "forbidden",
            AppError::AccountNotFound => "account_not_found",
            AppError::RoleMismatch => "role_mismatch",
            AppError::IdentifierMismatch(_) => "identifier_mismatch",
            AppError::InvalidAdminKey => "invalid_admin_key",
            AppError::Validation(_) => "validation_error",
            AppError::DuplicateRequest => "duplicate_request",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::BackendUnavailable(_) => "backend_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            AppError::Unauthorized | AppError::InvalidToken => (StatusCode::UNAUTHORIZED, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, Some(msg.clone())),
            AppError::AccountNotFound
            | AppError::RoleMismatch
            | AppError::IdentifierMismatch(_)
            | AppError::InvalidAdminKey => {
                tracing::info!(error = %self, "Sign-in rejected");
                (StatusCode::UNAUTHORIZED, Some(self.to_string()))
            }
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, Some(msg.clone())),
            AppError::DuplicateRequest => (StatusCode::CONFLICT, Some(self.to_string())),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Some(msg.clone())),
            AppError::BackendUnavailable(msg) => {
                tracing::error!(error = %msg, "Backend unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
