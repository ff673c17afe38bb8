//! Stop-limit orders: a limit order that only rests on the book once the
//! market trades through its stop price.

use order_core::{OrderHandle, OrderRequest, OrderSide, OrderType, SymbolFilter};
use rust_decimal::Decimal;

use crate::context::Collaborators;
use crate::error::{StrategyError, ValidationError};
use crate::placer::SingleOrderPlacer;
use crate::validation::validate_stop_limit_prices;

/// A trigger price and a limit price submitted as one conditional order.
///
/// Terminal on the single gateway response. A rejection because the
/// trigger is already crossed surfaces as [`StrategyError::ImmediateTrigger`].
#[derive(Debug, Clone)]
pub struct StopLimitStrategy {
    placer: SingleOrderPlacer,
}

impl StopLimitStrategy {
    pub fn new(ctx: Collaborators) -> Self {
        Self {
            placer: SingleOrderPlacer::new(ctx),
        }
    }

    pub fn request(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> OrderRequest {
        OrderRequest::stop_limit(symbol, side, quantity, stop_price, limit_price)
    }

    pub async fn validate(&self, request: &OrderRequest) -> Result<SymbolFilter, StrategyError> {
        check_prices(request)?;
        self.placer.validate(request, None).await
    }

    pub async fn execute(&self, request: &OrderRequest) -> Result<OrderHandle, StrategyError> {
        check_prices(request)?;
        self.placer.place(request, None).await
    }
}

fn check_prices(request: &OrderRequest) -> Result<(), ValidationError> {
    match (request.order_type, request.stop_price, request.price) {
        (OrderType::Stop, Some(stop), Some(limit)) => {
            validate_stop_limit_prices(request.side, stop, limit)
        }
        (OrderType::Stop, None, _) => Err(ValidationError::MissingStopPrice(OrderType::Stop)),
        (OrderType::Stop, _, None) => Err(ValidationError::MissingPrice(OrderType::Stop)),
        (other, _, _) => Err(ValidationError::InvalidParameter(format!(
            "stop-limit strategy cannot submit a {} order",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{collaborators, ScriptedGateway};
    use order_core::{OrderSubmissionError, SubmissionErrorKind};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_limit_submitted_once() {
        let gateway = Arc::new(ScriptedGateway::new().with_ids(["7"]));
        let (ctx, journal) = collaborators(gateway.clone());
        let strategy = StopLimitStrategy::new(ctx);

        let request =
            StopLimitStrategy::request("BTCUSDT", OrderSide::Sell, dec!(0.01), dec!(44000), dec!(43900));
        let handle = strategy.execute(&request).await.unwrap();

        assert_eq!(handle.exchange_order_id, "7");
        let placed = gateway.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].0.order_type, OrderType::Stop);
        assert_eq!(placed[0].0.stop_price, Some(dec!(44000)));
        assert_eq!(placed[0].0.price, Some(dec!(43900)));
        assert_eq!(journal.actions(), ["STOP_LIMIT_ORDER_SUCCESS"]);
    }

    #[tokio::test]
    async fn test_inconsistent_prices_rejected_locally() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (ctx, _journal) = collaborators(gateway.clone());
        let strategy = StopLimitStrategy::new(ctx);

        let request =
            StopLimitStrategy::request("BTCUSDT", OrderSide::Buy, dec!(0.01), dec!(46000), dec!(45900));
        let err = strategy.execute(&request).await.unwrap_err();
        assert!(matches!(
            err,
            StrategyError::Validation(ValidationError::PriceRelationship(_))
        ));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_trigger_surfaced() {
        let gateway = Arc::new(ScriptedGateway::new().fail_place(
            0,
            OrderSubmissionError::new(
                SubmissionErrorKind::ImmediateTrigger,
                "Order would immediately trigger.",
            )
            .with_code(-2021),
        ));
        let (ctx, journal) = collaborators(gateway);
        let strategy = StopLimitStrategy::new(ctx);

        let request =
            StopLimitStrategy::request("BTCUSDT", OrderSide::Buy, dec!(0.01), dec!(44000), dec!(44100));
        let err = strategy.execute(&request).await.unwrap_err();

        assert!(matches!(err, StrategyError::ImmediateTrigger { .. }));
        assert_eq!(err.exit_code(), 1);
        let entries = journal.entries();
        assert_eq!(entries[0].action, "STOP_LIMIT_ORDER_FAILED");
        assert!(entries[0].message.contains("further from the market"));
    }
}
