use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crypto_core::{HashError, TokenError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Not found")]
    NotFound,

    #[error("Identity already exists")]
    AlreadyExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Too many requests, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: i64 },

    #[error("Address locked for another {} minutes", remaining_minutes(.remaining_secs))]
    Locked { remaining_secs: i64 },

    #[error("Verification code expired")]
    Expired,

    #[error("Verification code does not match")]
    Mismatch,

    #[error("Failed to deliver verification code: {0}")]
    DeliveryFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Concurrent update conflict")]
    Contention,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Whole minutes, rounded up so a few seconds left still reads as 1 minute
fn remaining_minutes(secs: &i64) -> i64 {
    (secs + 59) / 60
}

impl IdentityError {
    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::NotFound => "NOT_FOUND",
            IdentityError::AlreadyExists => "ALREADY_EXISTS",
            IdentityError::InvalidCredentials => "INVALID_CREDENTIALS",
            IdentityError::Unauthenticated(_) => "UNAUTHENTICATED",
            IdentityError::Forbidden => "FORBIDDEN",
            IdentityError::RateLimited { .. } => "RATE_LIMITED",
            IdentityError::Locked { .. } => "LOCKED",
            IdentityError::Expired => "EXPIRED",
            IdentityError::Mismatch => "MISMATCH",
            IdentityError::DeliveryFailed(_) => "DELIVERY_FAILED",
            IdentityError::Validation(_) => "VALIDATION",
            IdentityError::Contention
            | IdentityError::Database(_)
            | IdentityError::Redis(_)
            | IdentityError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            IdentityError::NotFound => StatusCode::NOT_FOUND,
            IdentityError::AlreadyExists => StatusCode::CONFLICT,
            IdentityError::InvalidCredentials | IdentityError::Unauthenticated(_) => {
                StatusCode::UNAUTHORIZED
            }
            IdentityError::Forbidden => StatusCode::FORBIDDEN,
            IdentityError::RateLimited { .. } | IdentityError::Locked { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            IdentityError::Expired => StatusCode::GONE,
            IdentityError::Mismatch | IdentityError::Validation(_) => StatusCode::BAD_REQUEST,
            IdentityError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            IdentityError::Contention => StatusCode::SERVICE_UNAVAILABLE,
            IdentityError::Database(_) | IdentityError::Redis(_) | IdentityError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn retry_after_secs(&self) -> Option<i64> {
        match self {
            IdentityError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            IdentityError::Locked { remaining_secs } => Some(*remaining_secs),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Unauthenticated detail stays in the logs
            IdentityError::Unauthenticated(_) => "Unauthenticated".to_string(),
            IdentityError::Contention => "Please retry".to_string(),
            IdentityError::Database(_) | IdentityError::Redis(_) | IdentityError::Internal(_) => {
                // Don't leak internal details
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
            retry_after_secs: self.retry_after_secs(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// Conversions from external error types
impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for IdentityError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        IdentityError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("Serialization error: {}", err);
        IdentityError::Internal(err.to_string())
    }
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(msg) | TokenError::Config(msg) => {
                tracing::error!("Token error: {}", msg);
                IdentityError::Internal(msg)
            }
            other => IdentityError::Unauthenticated(other.to_string()),
        }
    }
}

impl From<HashError> for IdentityError {
    fn from(err: HashError) -> Self {
        tracing::error!("Hashing error: {}", err);
        IdentityError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        IdentityError::Validation(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IdentityError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("Blocking task failed: {}", err);
        IdentityError::Internal(err.to_string())
    }
}
