//! Single market or limit order submission.

use order_core::{OrderHandle, OrderRequest, OrderSubmissionError, OrderType, SymbolFilter};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::context::Collaborators;
use crate::error::StrategyError;
use crate::journal::{JournalEntry, StrategyKind};
use crate::validation::validate_order;

/// Validates and submits exactly one order. There is no implicit retry:
/// a retryable submission error is returned to the caller as such.
#[derive(Debug, Clone)]
pub struct SingleOrderPlacer {
    ctx: Collaborators,
}

impl SingleOrderPlacer {
    pub fn new(ctx: Collaborators) -> Self {
        Self { ctx }
    }

    /// Fetch the symbol's filters and check `request` against them.
    pub async fn validate(
        &self,
        request: &OrderRequest,
        reference: Option<Decimal>,
    ) -> Result<SymbolFilter, StrategyError> {
        let filter = self.ctx.filters.get(&request.symbol).await?;
        validate_order(request, &filter, reference)?;
        Ok(filter)
    }

    /// One gateway call, no validation, no journal entry.
    pub async fn submit(&self, request: &OrderRequest) -> Result<OrderHandle, OrderSubmissionError> {
        let result = self.ctx.gateway.place(request).await;
        match &result {
            Ok(handle) => info!(
                symbol = %request.symbol,
                side = %request.side,
                order_type = %request.order_type,
                quantity = %request.quantity,
                order_id = %handle.exchange_order_id,
                status = %handle.status(),
                "order placed"
            ),
            Err(e) => warn!(
                symbol = %request.symbol,
                side = %request.side,
                order_type = %request.order_type,
                error = %e,
                retryable = e.is_retryable(),
                "order placement failed"
            ),
        }
        result
    }

    /// Validate, submit and journal one order.
    pub async fn place(
        &self,
        request: &OrderRequest,
        reference: Option<Decimal>,
    ) -> Result<OrderHandle, StrategyError> {
        let strategy = strategy_for(request.order_type);
        let (ok_action, failed_action) = actions_for(request.order_type);

        if let Err(e) = self.validate(request, reference).await {
            self.ctx.record(JournalEntry::error(
                strategy,
                failed_action,
                &request.symbol,
                e.to_string(),
            ));
            return Err(e);
        }

        match self.submit(request).await {
            Ok(handle) => {
                self.ctx.record(
                    JournalEntry::info(
                        strategy,
                        ok_action,
                        &request.symbol,
                        format!(
                            "{} {} {} {} accepted with status {}",
                            request.order_type,
                            request.side,
                            request.quantity,
                            request.symbol,
                            handle.status()
                        ),
                    )
                    .with_order_id(&handle.exchange_order_id),
                );
                Ok(handle)
            }
            Err(e) => {
                let err = StrategyError::from(e);
                self.ctx.record(JournalEntry::error(
                    strategy,
                    failed_action,
                    &request.symbol,
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }
}

fn strategy_for(order_type: OrderType) -> StrategyKind {
    match order_type {
        OrderType::Market => StrategyKind::Market,
        OrderType::Limit => StrategyKind::Limit,
        OrderType::Stop | OrderType::StopMarket => StrategyKind::StopLimit,
    }
}

fn actions_for(order_type: OrderType) -> (&'static str, &'static str) {
    match order_type {
        OrderType::Market => ("MARKET_ORDER_SUCCESS", "MARKET_ORDER_FAILED"),
        OrderType::Limit => ("LIMIT_ORDER_SUCCESS", "LIMIT_ORDER_FAILED"),
        OrderType::Stop => ("STOP_LIMIT_ORDER_SUCCESS", "STOP_LIMIT_ORDER_FAILED"),
        OrderType::StopMarket => ("STOP_MARKET_ORDER_SUCCESS", "STOP_MARKET_ORDER_FAILED"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{collaborators, ScriptedGateway};
    use order_core::{OrderSide, OrderStatus, SubmissionErrorKind};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_limit_order_placed_and_journaled() {
        let gateway = Arc::new(ScriptedGateway::new().with_ids(["42"]));
        let (ctx, journal) = collaborators(gateway.clone());
        let placer = SingleOrderPlacer::new(ctx);

        let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, dec!(0.01), dec!(45000));
        let handle = placer.place(&request, None).await.unwrap();

        assert_eq!(handle.exchange_order_id, "42");
        assert_eq!(handle.status(), OrderStatus::New);
        assert_eq!(gateway.placed().len(), 1);
        assert_eq!(journal.actions(), ["LIMIT_ORDER_SUCCESS"]);
        assert_eq!(journal.entries()[0].order_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_validation_failure_never_reaches_gateway() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (ctx, journal) = collaborators(gateway.clone());
        let placer = SingleOrderPlacer::new(ctx);

        // 0.001 * 45000 = 45 < 100
        let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, dec!(0.001), dec!(45000));
        let err = placer.place(&request, None).await.unwrap_err();

        assert!(err.is_validation());
        assert!(gateway.calls().is_empty());
        assert_eq!(journal.actions(), ["LIMIT_ORDER_FAILED"]);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (ctx, _journal) = collaborators(gateway.clone());
        let placer = SingleOrderPlacer::new(ctx);

        let request = OrderRequest::market("ETHUSDT", OrderSide::Sell, dec!(1));
        let err = placer.place(&request, None).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_submission_error_not_retried() {
        let gateway = Arc::new(
            ScriptedGateway::new().fail_place(0, OrderSubmissionError::network("timed out")),
        );
        let (ctx, journal) = collaborators(gateway.clone());
        let placer = SingleOrderPlacer::new(ctx);

        let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(0.01));
        let err = placer.place(&request, Some(dec!(45000))).await.unwrap_err();

        match err {
            StrategyError::Submission(e) => {
                assert_eq!(e.kind, SubmissionErrorKind::Network);
                assert!(e.is_retryable());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gateway.placed().len(), 1);
        assert_eq!(journal.actions(), ["MARKET_ORDER_FAILED"]);
    }

    #[tokio::test]
    async fn test_market_order_reports_fill() {
        let gateway = Arc::new(ScriptedGateway::new().with_ticker(dec!(45000)));
        let (ctx, journal) = collaborators(gateway);
        let placer = SingleOrderPlacer::new(ctx);

        let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(0.01));
        let handle = placer.place(&request, None).await.unwrap();
        assert!(handle.is_filled());
        assert_eq!(handle.filled_qty, dec!(0.01));
        assert!(journal.contains("MARKET_ORDER_SUCCESS"));
    }
}
