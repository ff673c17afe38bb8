//! `OrderGateway` and `SymbolFilters` backed by the futures REST client.

use crate::client::FuturesRestClient;
use crate::error::FuturesRestError;
use crate::responses::{ExchangeInfoResponse, FuturesOrderResponse};
use async_trait::async_trait;
use common::RetryPolicy;
use order_core::{
    generate_client_order_id, now_ms, CancelError, FilterError, OrderGateway, OrderHandle,
    OrderRequest, OrderStatus, OrderSubmissionError, OrderType, OrderUpdate, QueryError,
    SymbolFilter, SymbolFilters,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::OnceCell;

pub struct FuturesGateway {
    client: FuturesRestClient,
    /// exchangeInfo filters, fetched once per process.
    filters: OnceCell<HashMap<String, SymbolFilter>>,
    /// Applied to read-only metadata requests only; orders are never resent.
    retry: RetryPolicy,
}

impl FuturesGateway {
    pub fn new(client: FuturesRestClient) -> Self {
        Self {
            client,
            filters: OnceCell::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn load_filters(&self) -> Result<&HashMap<String, SymbolFilter>, FuturesRestError> {
        self.filters
            .get_or_try_init(|| async {
                let info = self.fetch_exchange_info().await?;
                let filters: HashMap<String, SymbolFilter> = info
                    .symbols
                    .iter()
                    .filter_map(|s| s.to_symbol_filter().map(|f| (s.symbol.clone(), f)))
                    .collect();
                tracing::info!(symbols = filters.len(), "Loaded symbol filters");
                Ok::<_, FuturesRestError>(filters)
            })
            .await
    }

    async fn fetch_exchange_info(&self) -> Result<ExchangeInfoResponse, FuturesRestError> {
        let mut attempt = 0;
        loop {
            match self.client.exchange_info().await {
                Ok(info) => return Ok(info),
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "exchangeInfo request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn client_id_prefix(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "mkt",
        OrderType::Limit => "lmt",
        OrderType::Stop => "stp",
        OrderType::StopMarket => "sm",
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, QueryError> {
    OrderStatus::from_binance_str(raw)
        .ok_or_else(|| QueryError::new(format!("unrecognised order status '{}'", raw), false))
}

fn into_update(response: &FuturesOrderResponse) -> Result<OrderUpdate, QueryError> {
    let status = parse_status(&response.status)?;
    Ok(OrderUpdate::new(status).with_fill(response.executed_qty, response.avg_price))
}

fn into_handle(request: &OrderRequest, response: FuturesOrderResponse) -> OrderHandle {
    let status = OrderStatus::from_binance_str(&response.status).unwrap_or_else(|| {
        tracing::warn!(status = %response.status, order_id = response.order_id, "Unrecognised status on new order");
        OrderStatus::New
    });
    OrderHandle::new(response.order_id.to_string(), request.clone(), status, now_ms())
        .with_client_order_id(response.client_order_id)
        .with_fill(response.executed_qty, response.avg_price)
}

#[async_trait]
impl OrderGateway for FuturesGateway {
    async fn place(&self, request: &OrderRequest) -> Result<OrderHandle, OrderSubmissionError> {
        let client_order_id = generate_client_order_id(client_id_prefix(request.order_type));
        match self.client.place_order(request, &client_order_id).await {
            Ok(response) => Ok(into_handle(request, response)),
            Err(e) => {
                tracing::warn!(
                    symbol = %request.symbol,
                    client_order_id = %client_order_id,
                    error = %e,
                    "Order placement failed"
                );
                Err(e.into())
            }
        }
    }

    async fn cancel(&self, exchange_order_id: &str, symbol: &str) -> Result<(), CancelError> {
        self.client
            .cancel_order(symbol, exchange_order_id)
            .await
            .map(|_| ())
            .map_err(|e| e.into_cancel_error(exchange_order_id))
    }

    async fn status(
        &self,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<OrderUpdate, QueryError> {
        let response = self.client.query_order(symbol, exchange_order_id).await?;
        into_update(&response)
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal, QueryError> {
        Ok(self.client.ticker_price(symbol).await?.price)
    }
}

#[async_trait]
impl SymbolFilters for FuturesGateway {
    async fn get(&self, symbol: &str) -> Result<SymbolFilter, FilterError> {
        let filters = self
            .load_filters()
            .await
            .map_err(|e| FilterError::Unavailable(e.to_string()))?;
        filters
            .get(symbol)
            .copied()
            .ok_or_else(|| FilterError::UnknownSymbol(symbol.to_string()))
    }
}
