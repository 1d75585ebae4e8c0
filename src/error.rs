// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::import::ImportError;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Sign-in required")]
    NotVerified,

    #[error("iRacing authorization required")]
    AuthRequired,

    #[error("iRacing data access not granted")]
    ScopeRequired,

    #[error("Granted scope is missing {0}")]
    MissingScope(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Could not determine iRacing identity")]
    IdentityUnresolved,

    #[error("iRacing fetch failed: {0}")]
    FetchFailed(String),

    #[error("Import failed: {0}")]
    ImportFailed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable error code returned in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotVerified => "not_verified",
            AppError::AuthRequired => "auth_required",
            AppError::ScopeRequired => "scope_required",
            AppError::MissingScope(_) => "missing_scope",
            AppError::TokenExchange(_) => "token_exchange_failed",
            AppError::IdentityUnresolved => "identity_unresolved",
            AppError::FetchFailed(_) => "fetch_failed",
            AppError::ImportFailed(_) => "import_failed",
            AppError::Database(_) => "db_failed",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotVerified | AppError::AuthRequired => StatusCode::UNAUTHORIZED,
            AppError::ScopeRequired | AppError::MissingScope(_) => StatusCode::FORBIDDEN,
            AppError::TokenExchange(_) | AppError::FetchFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::IdentityUnresolved
            | AppError::ImportFailed(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::NotVerified => AppError::NotVerified,
            ImportError::AuthRequired => AppError::AuthRequired,
            ImportError::ScopeRequired => AppError::ScopeRequired,
            ImportError::FetchFailed(e) => AppError::FetchFailed(e.to_string()),
            ImportError::ImportFailed(msg) => AppError::ImportFailed(msg),
        }
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
        let status = self.status();
        let details = match &self {
            AppError::ScopeRequired => Some(
                "iRacing did not grant data access for this account. \
                 This usually means the iRacing subscription is inactive. \
                 Re-verify once it is active."
                    .to_string(),
            ),
            AppError::MissingScope(scope) => Some(format!("Required scope: {}", scope)),
            AppError::BadRequest(msg) | AppError::NotFound(msg) => Some(msg.clone()),
            AppError::TokenExchange(msg) | AppError::FetchFailed(msg) => {
                tracing::warn!(error = %msg, code = self.code(), "Upstream iRacing failure");
                None
            }
            AppError::ImportFailed(msg) | AppError::Database(msg) => {
                tracing::error!(error = %msg, code = self.code(), "Local write failed");
                None
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
