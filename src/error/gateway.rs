use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error as ThisError;

use super::IsRetryable;
use tensorgate_schema::ApiErrorBody;

/// The gateway's single error taxonomy. Every fallible path in the request
/// lifecycle (auth, admission, scheduling, backend dispatch) collapses into
/// one of these variants, which `IntoResponse` maps onto the wire error
/// shape in `tensorgate_schema::error` (§7).
#[derive(Debug, ThisError)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed: {message}")]
    Authentication { message: String, code: &'static str },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("no capacity available")]
    NoCapacity,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ractor error: {0}")]
    Ractor(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The bare taxonomy kind (§7), without the wire `_error` suffix.
    fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Authentication { .. } => "authentication",
            GatewayError::Permission(_) => "permission",
            GatewayError::RateLimited => "rate_limit",
            GatewayError::NoCapacity => "no_capacity",
            GatewayError::Backend(_) => "backend",
            GatewayError::Database(_) | GatewayError::Ractor(_) | GatewayError::Internal(_) => {
                "server"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Permission(_) => StatusCode::FORBIDDEN,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoCapacity => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Backend(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Database(_) | GatewayError::Ractor(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// A specific, stable code. `Authentication` carries its own (e.g.
    /// `"revoked"`, `"expired"`); every other variant's code is just its
    /// `kind`, since none of them need finer granularity yet.
    fn code(&self) -> &'static str {
        match self {
            GatewayError::Authentication { code, .. } => code,
            other => other.kind(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let kind = self.kind();
        let code = self.code();
        let message = match &self {
            GatewayError::Database(_) | GatewayError::Ractor(_) | GatewayError::Internal(_) => {
                "An internal server error occurred.".to_string()
            }
            _ => self.to_string(),
        };
        let body = ApiErrorBody::new(format!("{kind}_error"), message, code);
        (status, Json(body)).into_response()
    }
}

impl IsRetryable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::NoCapacity | GatewayError::Database(_) | GatewayError::Ractor(_)
        )
    }
}
