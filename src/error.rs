/// Unified error types for the worksheet market
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the market
#[derive(Error, Debug)]
pub enum MarketError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No valid session
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Role or ownership mismatch
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input shape or bounds violations
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced listing, event, purchase or account missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic uniqueness conflict (e.g. email already registered)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Listing is already in the cart")]
    DuplicateLine,

    #[error("Cannot purchase your own listing")]
    SelfPurchase,

    #[error("Listing already purchased")]
    AlreadyOwned,

    #[error("Already checked in today")]
    AlreadyCheckedIn,

    #[error("Feedback already submitted for this purchase")]
    AlreadyReviewed,

    #[error("Participation has already been decided")]
    AlreadyDecided,

    /// Once-only action repeated (roulette spin, event participation, edit notification)
    #[error("Already done: {0}")]
    AlreadyDone(String),

    #[error("Event is full")]
    EventFull,

    #[error("Event is not open: {0}")]
    EventClosed(String),

    /// Same ledger action is still in flight on this client
    #[error("Operation already pending: {0}")]
    OperationPending(String),

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: i64, available: i64 },

    /// Storage or AI collaborator failures, transport failures
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<validator::ValidationErrors> for MarketError {
    fn from(errors: validator::ValidationErrors) -> Self {
        MarketError::Validation(errors.to_string())
    }
}

impl MarketError {
    /// Stable wire code for this error
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Unauthenticated(_) => "Unauthenticated",
            MarketError::Forbidden(_) => "Forbidden",
            MarketError::Validation(_) => "ValidationFailed",
            MarketError::NotFound(_) => "NotFound",
            MarketError::Conflict(_) => "Conflict",
            MarketError::DuplicateLine => "DuplicateLine",
            MarketError::SelfPurchase => "SelfPurchase",
            MarketError::AlreadyOwned => "AlreadyOwned",
            MarketError::AlreadyCheckedIn => "AlreadyCheckedIn",
            MarketError::AlreadyReviewed => "AlreadyReviewed",
            MarketError::AlreadyDecided => "AlreadyDecided",
            MarketError::AlreadyDone(_) => "AlreadyDone",
            MarketError::EventFull => "EventFull",
            MarketError::EventClosed(_) => "EventClosed",
            MarketError::OperationPending(_) => "OperationPending",
            MarketError::InsufficientBalance { .. } => "InsufficientBalance",
            MarketError::UpstreamFailure(_) => "UpstreamFailure",
            MarketError::RateLimitExceeded { .. } => "RateLimitExceeded",
            MarketError::Database(_) | MarketError::Internal(_) | MarketError::Io(_) => "Unknown",
        }
    }

    /// Structured fields that the message alone cannot carry
    pub fn details(&self) -> Option<ErrorDetails> {
        match self {
            MarketError::InsufficientBalance { required, available } => Some(ErrorDetails {
                required: Some(*required),
                available: Some(*available),
                ..Default::default()
            }),
            MarketError::RateLimitExceeded { retry_after } => Some(ErrorDetails {
                retry_after_secs: Some(retry_after.as_secs()),
                ..Default::default()
            }),
            _ => None,
        }
    }

    /// Rebuild an error from a decoded response body (client side)
    pub fn from_response(body: ErrorResponse) -> Self {
        let details = body.details.unwrap_or_default();
        match body.error.as_str() {
            "InsufficientBalance" => MarketError::InsufficientBalance {
                required: details.required.unwrap_or(0),
                available: details.available.unwrap_or(0),
            },
            "RateLimitExceeded" => MarketError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(details.retry_after_secs.unwrap_or(1)),
            },
            code => MarketError::from_code(code, body.message),
        }
    }

    /// Rebuild an error from a wire code and message (client side)
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "Unauthenticated" => MarketError::Unauthenticated(message),
            "Forbidden" => MarketError::Forbidden(message),
            "ValidationFailed" => MarketError::Validation(message),
            "NotFound" => MarketError::NotFound(message),
            "Conflict" => MarketError::Conflict(message),
            "DuplicateLine" => MarketError::DuplicateLine,
            "SelfPurchase" => MarketError::SelfPurchase,
            "AlreadyOwned" => MarketError::AlreadyOwned,
            "AlreadyCheckedIn" => MarketError::AlreadyCheckedIn,
            "AlreadyReviewed" => MarketError::AlreadyReviewed,
            "AlreadyDecided" => MarketError::AlreadyDecided,
            "AlreadyDone" => MarketError::AlreadyDone(message),
            "EventFull" => MarketError::EventFull,
            "EventClosed" => MarketError::EventClosed(message),
            "InsufficientBalance" => MarketError::InsufficientBalance {
                required: 0,
                available: 0,
            },
            "UpstreamFailure" => MarketError::UpstreamFailure(message),
            "RateLimitExceeded" => MarketError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            },
            _ => MarketError::Internal(message),
        }
    }

    /// True for errors caused by idempotency guards
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MarketError::Conflict(_)
                | MarketError::DuplicateLine
                | MarketError::SelfPurchase
                | MarketError::AlreadyOwned
                | MarketError::AlreadyCheckedIn
                | MarketError::AlreadyReviewed
                | MarketError::AlreadyDecided
                | MarketError::AlreadyDone(_)
                | MarketError::EventFull
                | MarketError::OperationPending(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            MarketError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            MarketError::EventClosed(_) => StatusCode::CONFLICT,
            MarketError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            MarketError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            MarketError::Database(_) | MarketError::Internal(_) | MarketError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ if self.is_conflict() => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Optional machine-readable fields of an error body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Convert MarketError to HTTP response
impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            MarketError::Database(_) | MarketError::Internal(_) | MarketError::Io(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal server error".to_string() // Don't leak details
            }
            MarketError::UpstreamFailure(_) => {
                tracing::warn!("Upstream failure: {}", self);
                "An external service failed, please try again later".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
            details: self.details(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for market operations
pub type MarketResult<T> = Result<T, MarketError>;

/// True if a database error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
