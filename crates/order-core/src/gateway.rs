//! The exchange call surface and the errors that cross it.

use crate::order::{OrderHandle, OrderRequest, OrderUpdate};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a submission failed, as far as the caller needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionErrorKind {
    /// Transport failure or timeout; the order may be retried.
    Network,
    /// Exchange rate limit hit; retry after backing off.
    RateLimited,
    /// Exchange rejected the order for a reason not listed below.
    Rejected,
    InsufficientBalance,
    /// A stop order whose trigger is already crossed by the market.
    ImmediateTrigger,
    /// Request failed exchange-side parameter or filter checks.
    InvalidRequest,
}

impl SubmissionErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited)
    }
}

/// Failed order placement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct OrderSubmissionError {
    pub kind: SubmissionErrorKind,
    pub reason: String,
    /// Exchange error code, when the exchange supplied one.
    pub code: Option<i32>,
}

impl OrderSubmissionError {
    pub fn new(kind: SubmissionErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            code: None,
        }
    }

    pub fn network(reason: impl Into<String>) -> Self {
        Self::new(SubmissionErrorKind::Network, reason)
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::new(SubmissionErrorKind::Rejected, reason)
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_immediate_trigger(&self) -> bool {
        self.kind == SubmissionErrorKind::ImmediateTrigger
    }
}

/// Failed cancel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    /// The order is unknown or already closed. A cancel racing a fill lands
    /// here.
    #[error("order {0} not found or already closed")]
    AlreadyClosed(String),

    #[error("cancel failed: {reason}")]
    Failed { reason: String, retryable: bool },
}

impl CancelError {
    pub fn failed(reason: impl Into<String>, retryable: bool) -> Self {
        Self::Failed {
            reason: reason.into(),
            retryable,
        }
    }

    /// The order is gone either way.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyClosed(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { retryable: true, .. })
    }
}

/// Failed status or price query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query failed: {reason}")]
pub struct QueryError {
    pub reason: String,
    pub retryable: bool,
}

impl QueryError {
    pub fn new(reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            reason: reason.into(),
            retryable,
        }
    }
}

/// Exchange operations the engine depends on.
///
/// Implementations must surface rate limiting as a retryable error rather
/// than panicking or blocking.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit one order.
    async fn place(&self, request: &OrderRequest) -> Result<OrderHandle, OrderSubmissionError>;

    async fn cancel(&self, exchange_order_id: &str, symbol: &str) -> Result<(), CancelError>;

    /// Current status of an order, with its executed quantity when known.
    async fn status(&self, exchange_order_id: &str, symbol: &str)
        -> Result<OrderUpdate, QueryError>;

    /// Last traded price, used as the market reference.
    async fn ticker_price(&self, symbol: &str) -> Result<Decimal, QueryError>;
}
