//! Transport and exchange error types.

use order_core::{CancelError, OrderSubmissionError, QueryError, SubmissionErrorKind};
use thiserror::Error;

/// Errors raised by the HTTP transport.
#[derive(Debug, Error)]
pub enum RestError {
    /// Non-success status with the raw response body.
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request build error: {0}")]
    RequestBuild(String),
}

impl RestError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RestError::Timeout | RestError::Connection(_) | RestError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RestError::Timeout
        } else if err.is_connect() {
            RestError::Connection(err.to_string())
        } else if err.is_decode() {
            RestError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            RestError::HttpError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            RestError::Connection(err.to_string())
        }
    }
}

/// Errors from the futures API, with exchange codes classified.
#[derive(Debug, Error)]
pub enum FuturesRestError {
    #[error("REST client error: {0}")]
    Rest(RestError),

    #[error("Missing environment variable: {0}")]
    MissingCredentials(String),

    /// A signed endpoint was called on a client built without credentials.
    #[error("API credentials required for {0}")]
    Unauthenticated(&'static str),

    #[error("Signing error: {0}")]
    Signing(String),

    /// -1003: too many requests.
    #[error("Rate limited by exchange: {message}")]
    RateLimited { message: String },

    /// -2011 / -2013: unknown order.
    #[error("Order not found ({code})")]
    OrderNotFound { code: i32 },

    /// -2018 / -2019: balance or margin is insufficient.
    #[error("Insufficient margin: {message}")]
    InsufficientBalance { message: String },

    /// -2021: the stop price would trigger immediately.
    #[error("Order would immediately trigger: {message}")]
    WouldImmediatelyTrigger { message: String },

    /// Any other exchange error.
    #[error("Futures API error {code}: {message}")]
    ApiError { code: i32, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<RestError> for FuturesRestError {
    /// Error bodies carrying `{"code": .., "msg": ..}` are classified by code.
    fn from(err: RestError) -> Self {
        match err {
            RestError::HttpError { status, message } => Self::from_api_response(&message)
                .unwrap_or(Self::Rest(RestError::HttpError { status, message })),
            other => Self::Rest(other),
        }
    }
}

impl FuturesRestError {
    /// Parse an exchange error body: `{"code": -2021, "msg": "..."}`.
    pub fn from_api_response(body: &str) -> Option<Self> {
        #[derive(serde::Deserialize)]
        struct ApiError {
            code: i32,
            msg: String,
        }

        serde_json::from_str::<ApiError>(body)
            .ok()
            .map(|err| Self::classify_api_error(err.code, err.msg))
    }

    pub fn classify_api_error(code: i32, message: String) -> Self {
        match code {
            -1003 => Self::RateLimited { message },
            -2011 | -2013 => Self::OrderNotFound { code },
            -2018 | -2019 => Self::InsufficientBalance { message },
            -2021 => Self::WouldImmediatelyTrigger { message },
            _ => Self::ApiError { code, message },
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::RateLimited { .. } => Some(-1003),
            Self::OrderNotFound { code } | Self::ApiError { code, .. } => Some(*code),
            Self::WouldImmediatelyTrigger { .. } => Some(-2021),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rest(rest_err) => rest_err.is_retryable(),
            Self::RateLimited { .. } => true,
            // Internal error, disconnected, backend timeout, overloaded
            Self::ApiError { code, .. } => matches!(code, -1000 | -1001 | -1007 | -1008),
            _ => false,
        }
    }

    fn submission_kind(&self) -> SubmissionErrorKind {
        match self {
            Self::RateLimited { .. } | Self::Rest(RestError::RateLimited { .. }) => {
                SubmissionErrorKind::RateLimited
            }
            Self::InsufficientBalance { .. } => SubmissionErrorKind::InsufficientBalance,
            Self::WouldImmediatelyTrigger { .. } => SubmissionErrorKind::ImmediateTrigger,
            // Filter and parameter failures: -1013, -11xx, -4xxx
            Self::ApiError { code, .. }
                if *code == -1013 || (-1199..=-1100).contains(code) || (-4999..=-4000).contains(code) =>
            {
                SubmissionErrorKind::InvalidRequest
            }
            err if err.is_retryable() => SubmissionErrorKind::Network,
            _ => SubmissionErrorKind::Rejected,
        }
    }
}

impl From<FuturesRestError> for OrderSubmissionError {
    fn from(err: FuturesRestError) -> Self {
        let mut out = OrderSubmissionError::new(err.submission_kind(), err.to_string());
        if let Some(code) = err.code() {
            out = out.with_code(code);
        }
        out
    }
}

impl FuturesRestError {
    /// Cancel outcome for `order_id`; unknown orders count as already closed.
    pub fn into_cancel_error(self, order_id: &str) -> CancelError {
        match self {
            Self::OrderNotFound { .. } => CancelError::AlreadyClosed(order_id.to_string()),
            other => {
                let retryable = other.is_retryable();
                CancelError::failed(other.to_string(), retryable)
            }
        }
    }
}

impl From<FuturesRestError> for QueryError {
    fn from(err: FuturesRestError) -> Self {
        let retryable = err.is_retryable();
        QueryError::new(err.to_string(), retryable)
    }
}
