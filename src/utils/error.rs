//! Error taxonomy for the Gateway.
//!
//! `GatewayError` is the single error type threaded through validation,
//! routing, budget/rate-limit enforcement, provider dispatch, and the HTTP
//! layer. Its `ResponseError` impl produces the `{error:{message,type,details?}}`
//! wire envelope.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the Gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Key disabled: {0}")]
    KeyDisabled(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited { message: String, retry_after_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),

    #[error("Upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        retryable: bool,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// Canonical wire `type` string for this error, per spec §7.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) | GatewayError::Config(_) => "invalid_request_error",
            GatewayError::Authentication(_) | GatewayError::KeyDisabled(_) => {
                "authentication_error"
            }
            GatewayError::BudgetExceeded(_) => "budget_exceeded",
            GatewayError::RateLimited { .. } => "rate_limit_error",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::AllProvidersFailed(_) => "all_providers_failed",
            GatewayError::Upstream { .. }
            | GatewayError::Database(_)
            | GatewayError::HttpClient(_)
            | GatewayError::Serialization(_)
            | GatewayError::Internal(_) => "server_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) | GatewayError::Config(_) => StatusCode::BAD_REQUEST,
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::KeyDisabled(_) => StatusCode::FORBIDDEN,
            GatewayError::BudgetExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::AllProvidersFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Database(_)
            | GatewayError::HttpClient(_)
            | GatewayError::Serialization(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let GatewayError::RateLimited {
            retry_after_secs, ..
        } = self
        {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
        }
        builder.json(ErrorEnvelope {
            error: ErrorBody {
                message: self.to_string(),
                kind: self.error_type(),
                details: None,
            },
        })
    }
}
