//! Typed client for the USDT-M futures REST API.

use crate::credentials::ApiCredentials;
use crate::error::FuturesRestError;
use crate::responses::{
    ExchangeInfoResponse, FuturesOrderResponse, ServerTimeResponse, TickerPriceResponse,
};
use crate::rest::RestClient;
use crate::signer::RequestSigner;
use common::FuturesEnvironment;
use order_core::OrderRequest;
use reqwest::Method;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tolerance the exchange allows between our timestamp and its clock.
const RECV_WINDOW_MS: u64 = 5_000;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Futures REST client.
///
/// Public endpoints work without credentials, so a dry run can still read
/// prices and exchange filters.
pub struct FuturesRestClient {
    client: RestClient,
    credentials: Option<ApiCredentials>,
    environment: FuturesEnvironment,
    /// Local clock minus server clock.
    time_offset_ms: AtomicI64,
}

impl FuturesRestClient {
    /// Client limited to public endpoints.
    pub fn public(environment: FuturesEnvironment) -> Result<Self, FuturesRestError> {
        Self::build(None, environment)
    }

    pub fn with_credentials(
        credentials: ApiCredentials,
        environment: FuturesEnvironment,
    ) -> Result<Self, FuturesRestError> {
        Self::build(Some(credentials), environment)
    }

    fn build(
        credentials: Option<ApiCredentials>,
        environment: FuturesEnvironment,
    ) -> Result<Self, FuturesRestError> {
        let client = RestClient::new(environment.rest_base_url(), REQUEST_TIMEOUT)?;
        Ok(Self {
            client,
            credentials,
            environment,
            time_offset_ms: AtomicI64::new(0),
        })
    }

    pub fn environment(&self) -> FuturesEnvironment {
        self.environment
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Estimated exchange time, from the local clock and the last sync.
    pub fn server_timestamp_ms(&self) -> i64 {
        order_core::now_ms() - self.time_offset_ms.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Public endpoints
    // ========================================================================

    /// Measure the clock offset against the exchange.
    ///
    /// Call once at startup; signed requests are rejected (-1021) when the
    /// local clock drifts outside the receive window.
    pub async fn sync_time(&self) -> Result<(), FuturesRestError> {
        let before = std::time::Instant::now();
        let response: ServerTimeResponse = self.client.get("/fapi/v1/time", None, &[]).await?;
        let rtt = before.elapsed().as_millis() as i64;

        let local_time = order_core::now_ms();
        let offset = local_time - (response.server_time + rtt / 2);
        self.time_offset_ms.store(offset, Ordering::Relaxed);

        tracing::info!(
            server_time = response.server_time,
            offset_ms = offset,
            rtt_ms = rtt,
            "Time synchronized with exchange"
        );
        Ok(())
    }

    pub async fn ticker_price(&self, symbol: &str) -> Result<TickerPriceResponse, FuturesRestError> {
        let query = format!("symbol={}", symbol);
        Ok(self
            .client
            .get("/fapi/v1/ticker/price", Some(&query), &[])
            .await?)
    }

    pub async fn exchange_info(&self) -> Result<ExchangeInfoResponse, FuturesRestError> {
        Ok(self.client.get("/fapi/v1/exchangeInfo", None, &[]).await?)
    }

    // ========================================================================
    // Order management (signed)
    // ========================================================================

    /// POST /fapi/v1/order
    ///
    /// Market orders ask for `newOrderRespType=RESULT` so the response
    /// carries the fill.
    pub async fn place_order(
        &self,
        request: &OrderRequest,
        client_order_id: &str,
    ) -> Result<FuturesOrderResponse, FuturesRestError> {
        let params = order_params(request, client_order_id);

        tracing::info!(
            symbol = %request.symbol,
            side = %request.side,
            order_type = %request.order_type,
            quantity = %request.quantity,
            client_order_id = %client_order_id,
            "Placing order"
        );

        let response: FuturesOrderResponse =
            self.signed(Method::POST, "/fapi/v1/order", &params).await?;

        tracing::info!(
            order_id = response.order_id,
            status = %response.status,
            "Order placed"
        );
        Ok(response)
    }

    /// GET /fapi/v1/order
    pub async fn query_order(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<FuturesOrderResponse, FuturesRestError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        self.signed(Method::GET, "/fapi/v1/order", &params).await
    }

    /// DELETE /fapi/v1/order
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<FuturesOrderResponse, FuturesRestError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        tracing::info!(symbol = %symbol, order_id = %order_id, "Canceling order");

        let response: FuturesOrderResponse =
            self.signed(Method::DELETE, "/fapi/v1/order", &params).await?;

        tracing::info!(
            order_id = response.order_id,
            status = %response.status,
            "Order canceled"
        );
        Ok(response)
    }

    async fn signed<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &'static str,
        params: &[(&str, String)],
    ) -> Result<T, FuturesRestError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(FuturesRestError::Unauthenticated(path))?;

        let query = RequestSigner::new(credentials).signed_query(
            params,
            Some(RECV_WINDOW_MS),
            self.server_timestamp_ms(),
        )?;
        let headers = [(API_KEY_HEADER, credentials.api_key())];

        Ok(self
            .client
            .send(method, path, Some(&query), &headers)
            .await?)
    }
}

/// Request parameters in the order the exchange documents them.
fn order_params(request: &OrderRequest, client_order_id: &str) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", request.symbol.clone()),
        ("side", request.side.as_binance_str().to_string()),
        ("type", request.order_type.as_binance_str().to_string()),
        ("quantity", request.quantity.normalize().to_string()),
    ];
    if let Some(price) = request.price {
        params.push(("price", price.normalize().to_string()));
    }
    if let Some(stop) = request.stop_price {
        params.push(("stopPrice", stop.normalize().to_string()));
    }
    if let Some(tif) = request.time_in_force {
        params.push(("timeInForce", tif.as_binance_str().to_string()));
    }
    if request.reduce_only {
        params.push(("reduceOnly", "true".to_string()));
    }
    params.push(("newClientOrderId", client_order_id.to_string()));
    params.push(("newOrderRespType", "RESULT".to_string()));
    params
}

impl std::fmt::Debug for FuturesRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuturesRestClient")
            .field("environment", &self.environment)
            .field("base_url", &self.client.base_url())
            .field(
                "api_key",
                &self.credentials.as_ref().map(|c| c.api_key()),
            )
            .field(
                "time_offset_ms",
                &self.time_offset_ms.load(Ordering::Relaxed),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_core::OrderSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stop_limit_params() {
        let request = OrderRequest::stop_limit(
            "BTCUSDT",
            OrderSide::Sell,
            dec!(0.010),
            dec!(44000.0),
            dec!(43950.0),
        )
        .reduce_only();
        let params = order_params(&request, "stp_1");
        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();

        assert_eq!(
            keys,
            [
                "symbol",
                "side",
                "type",
                "quantity",
                "price",
                "stopPrice",
                "timeInForce",
                "reduceOnly",
                "newClientOrderId",
                "newOrderRespType"
            ]
        );
        assert_eq!(params[2].1, "STOP");
        assert_eq!(params[3].1, "0.01");
        assert_eq!(params[4].1, "43950");
    }

    #[test]
    fn test_market_params_omit_price() {
        let request = OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(1));
        let params = order_params(&request, "mkt_1");
        assert!(params.iter().all(|(k, _)| *k != "price" && *k != "timeInForce"));
        assert!(params.iter().all(|(k, _)| *k != "reduceOnly"));
    }

    #[tokio::test]
    async fn test_signed_call_requires_credentials() {
        let client = FuturesRestClient::public(FuturesEnvironment::Testnet).unwrap();
        assert!(!client.is_authenticated());

        let err = client.query_order("BTCUSDT", "1").await.unwrap_err();
        assert!(matches!(err, FuturesRestError::Unauthenticated("/fapi/v1/order")));
    }

    #[test]
    fn test_debug_hides_secret() {
        let client = FuturesRestClient::with_credentials(
            ApiCredentials::new("pub".into(), "hidden".into()),
            FuturesEnvironment::Testnet,
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("testnet.binancefuture.com"));
        assert!(!debug.contains("hidden"));
    }
}
