//! Order engine error types.

use std::fmt;
use std::time::Duration;

use order_core::{CancelError, FilterError, OrderSubmissionError, OrderType, QueryError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Input rejected before any order reaches the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid symbol '{0}': expected an uppercase USDT-M pair such as BTCUSDT")]
    InvalidSymbol(String),

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("quantity {quantity} below minimum {min_qty}")]
    QuantityBelowMinimum { quantity: Decimal, min_qty: Decimal },

    #[error("quantity {quantity} is not a multiple of step size {step_size}")]
    QuantityNotStepAligned { quantity: Decimal, step_size: Decimal },

    #[error("{field} {value} exceeds the sanity limit {limit}")]
    AboveSanityLimit {
        field: &'static str,
        value: Decimal,
        limit: Decimal,
    },

    #[error("{0} order requires a price")]
    MissingPrice(OrderType),

    #[error("{0} order requires a stop price")]
    MissingStopPrice(OrderType),

    #[error("{field} must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: Decimal },

    #[error("{field} {price} is not a multiple of tick size {tick_size}")]
    PriceNotTickAligned {
        field: &'static str,
        price: Decimal,
        tick_size: Decimal,
    },

    #[error("order notional {notional} below minimum {min_notional}")]
    NotionalBelowMinimum {
        notional: Decimal,
        min_notional: Decimal,
    },

    /// Prices that are individually valid but inconsistent with each other
    /// or with the market.
    #[error("{0}")]
    PriceRelationship(String),

    /// Strategy parameter out of range (slice count, grid bounds, ...).
    #[error("{0}")]
    InvalidParameter(String),
}

/// Which half of an OCO pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcoLeg {
    TakeProfit,
    StopLoss,
}

impl OcoLeg {
    pub fn other(&self) -> Self {
        match self {
            Self::TakeProfit => Self::StopLoss,
            Self::StopLoss => Self::TakeProfit,
        }
    }
}

impl fmt::Display for OcoLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "take-profit"),
            Self::StopLoss => write!(f, "stop-loss"),
        }
    }
}

/// Errors that end a strategy run.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("symbol filters: {0}")]
    Filters(#[from] FilterError),

    #[error("order submission failed: {0}")]
    Submission(OrderSubmissionError),

    /// Stop price already crossed by the market.
    #[error("stop order would trigger immediately ({reason}); move the stop price further from the market")]
    ImmediateTrigger { reason: String },

    #[error(transparent)]
    Cancel(#[from] CancelError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("OCO monitoring timed out after {polls} polls ({elapsed:?}) with no fill")]
    Timeout { polls: u32, elapsed: Duration },

    /// One OCO leg could not be placed. `rolled_back` is false when the
    /// other leg may still be open.
    #[error("{leg} leg placement failed: {source}")]
    LegPlacement {
        leg: OcoLeg,
        source: OrderSubmissionError,
        rolled_back: bool,
    },

    #[error("both OCO legs ended without a fill")]
    NoExecution,

    #[error("both OCO legs filled (take-profit {take_profit}, stop-loss {stop_loss}); position may be doubled")]
    BothLegsFilled {
        take_profit: String,
        stop_loss: String,
    },

    #[error("interrupted; orders already placed remain open on the exchange")]
    Interrupted,
}

impl From<OrderSubmissionError> for StrategyError {
    fn from(err: OrderSubmissionError) -> Self {
        if err.is_immediate_trigger() {
            Self::ImmediateTrigger { reason: err.reason }
        } else {
            Self::Submission(err)
        }
    }
}

impl StrategyError {
    /// Process exit code for this failure.
    ///
    /// 2: rejected before submission. 3: OCO timeout. 130: interrupted.
    /// 1: everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Filters(FilterError::UnknownSymbol(_)) => 2,
            Self::Timeout { .. } => 3,
            Self::Interrupted => 130,
            _ => 1,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.exit_code() == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_core::SubmissionErrorKind;

    #[test]
    fn test_immediate_trigger_is_distinct() {
        let err: StrategyError =
            OrderSubmissionError::new(SubmissionErrorKind::ImmediateTrigger, "-2021").into();
        assert!(matches!(err, StrategyError::ImmediateTrigger { .. }));
        assert!(err.to_string().contains("further from the market"));

        let err: StrategyError = OrderSubmissionError::network("timeout").into();
        assert!(matches!(err, StrategyError::Submission(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            StrategyError::from(ValidationError::InvalidSymbol("x".into())).exit_code(),
            2
        );
        assert_eq!(
            StrategyError::from(FilterError::UnknownSymbol("XUSDT".into())).exit_code(),
            2
        );
        assert_eq!(
            StrategyError::from(FilterError::Unavailable("down".into())).exit_code(),
            1
        );
        assert_eq!(
            StrategyError::Timeout {
                polls: 3,
                elapsed: Duration::from_secs(15)
            }
            .exit_code(),
            3
        );
        assert_eq!(StrategyError::Interrupted.exit_code(), 130);
        assert_eq!(StrategyError::NoExecution.exit_code(), 1);
    }
}
