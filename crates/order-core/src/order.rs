//! Order requests, handles and status enums.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing one of the order enums from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}'")]
pub struct ParseOrderEnumError {
    kind: &'static str,
    value: String,
}

impl ParseOrderEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Convert from Binance string representation.
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to Binance string representation.
    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_binance_str())
    }
}

impl FromStr for OrderSide {
    type Err = ParseOrderEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_binance_str(&s.trim().to_uppercase())
            .ok_or_else(|| ParseOrderEnumError::new("side", s))
    }
}

/// Futures order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    /// Stop-limit: a limit order activated once the stop price trades.
    Stop,
    /// Stop-market: a market order activated once the stop price trades.
    StopMarket,
}

impl OrderType {
    /// Convert from Binance string representation.
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "MARKET" => Some(Self::Market),
            "LIMIT" => Some(Self::Limit),
            "STOP" => Some(Self::Stop),
            "STOP_MARKET" => Some(Self::StopMarket),
            _ => None,
        }
    }

    /// Convert to Binance string representation.
    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::Stop => "STOP",
            Self::StopMarket => "STOP_MARKET",
        }
    }

    /// Whether a limit price must accompany this type.
    pub fn requires_price(&self) -> bool {
        matches!(self, Self::Limit | Self::Stop)
    }

    /// Whether a trigger price must accompany this type.
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, Self::Stop | Self::StopMarket)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_binance_str())
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order accepted and resting (or waiting for its trigger).
    New,
    /// Order partially filled.
    PartiallyFilled,
    /// Order completely filled.
    Filled,
    /// Order canceled.
    Canceled,
    /// Order rejected by exchange.
    Rejected,
    /// Order expired (IOC/FOK remainder, self-trade prevention, ...).
    Expired,
}

impl OrderStatus {
    /// Convert from Binance string representation.
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "PARTIALLY_FILLED" => Some(Self::PartiallyFilled),
            "FILLED" => Some(Self::Filled),
            "CANCELED" => Some(Self::Canceled),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" | "EXPIRED_IN_MATCH" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Check if this is a terminal status (order is done).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_binance_str())
    }
}

/// Time in force for limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good Till Canceled - remains active until filled or canceled.
    GTC,
    /// Immediate Or Cancel - fill what's possible immediately, cancel rest.
    IOC,
    /// Fill Or Kill - must be filled completely immediately or canceled.
    FOK,
    /// Good Till Crossing - post-only.
    GTX,
}

impl TimeInForce {
    /// Convert from Binance string representation.
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "GTC" => Some(Self::GTC),
            "IOC" => Some(Self::IOC),
            "FOK" => Some(Self::FOK),
            "GTX" => Some(Self::GTX),
            _ => None,
        }
    }

    /// Convert to Binance string representation.
    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::GTC => "GTC",
            Self::IOC => "IOC",
            Self::FOK => "FOK",
            Self::GTX => "GTX",
        }
    }
}

impl FromStr for TimeInForce {
    type Err = ParseOrderEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_binance_str(&s.trim().to_uppercase())
            .ok_or_else(|| ParseOrderEnumError::new("time in force", s))
    }
}

/// An order to be submitted.
///
/// Constructors fill in the fields each order type needs; validation of the
/// values against exchange filters happens in the engine before submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading pair symbol (e.g., "BTCUSDT").
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price (LIMIT and STOP).
    pub price: Option<Decimal>,
    /// Trigger price (STOP and STOP_MARKET).
    pub stop_price: Option<Decimal>,
    pub reduce_only: bool,
    pub time_in_force: Option<TimeInForce>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            reduce_only: false,
            time_in_force: None,
        }
    }

    /// Limit order, GTC unless overridden.
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Stop-limit: once `stop_price` trades, a GTC limit at `limit_price` is
    /// working.
    pub fn stop_limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Stop,
            price: Some(limit_price),
            stop_price: Some(stop_price),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn stop_market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::StopMarket,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }

    /// Value of the order at its limit price, else its stop price, else
    /// `reference`.
    pub fn notional(&self, reference: Option<Decimal>) -> Option<Decimal> {
        self.price
            .or(self.stop_price)
            .or(reference)
            .map(|p| p * self.quantity)
    }
}

/// One status read from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderUpdate {
    pub status: OrderStatus,
    /// Cumulative executed quantity, when the exchange reported it.
    pub filled_qty: Option<Decimal>,
    pub avg_price: Option<Decimal>,
}

impl OrderUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            filled_qty: None,
            avg_price: None,
        }
    }

    pub fn with_fill(mut self, filled_qty: Decimal, avg_price: Option<Decimal>) -> Self {
        self.filled_qty = Some(filled_qty);
        self.avg_price = avg_price.filter(|p| !p.is_zero());
        self
    }
}

impl From<OrderStatus> for OrderUpdate {
    fn from(status: OrderStatus) -> Self {
        Self::new(status)
    }
}

/// A submitted order as tracked locally.
///
/// Status is private: it only moves through [`OrderHandle::apply_status`]
/// and [`OrderHandle::apply_update`], which never leave a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHandle {
    /// Exchange-assigned order ID.
    pub exchange_order_id: String,
    /// Client-generated order ID, when the gateway assigned one.
    pub client_order_id: Option<String>,
    pub request: OrderRequest,
    status: OrderStatus,
    /// Last time the status was set or polled, epoch ms.
    pub last_checked_at_ms: i64,
    /// Quantity filled so far, as last reported.
    pub filled_qty: Decimal,
    /// Average fill price, if any fills were reported.
    pub avg_price: Option<Decimal>,
}

impl OrderHandle {
    pub fn new(
        exchange_order_id: impl Into<String>,
        request: OrderRequest,
        status: OrderStatus,
        now_ms: i64,
    ) -> Self {
        let filled_qty = if status == OrderStatus::Filled {
            request.quantity
        } else {
            Decimal::ZERO
        };
        Self {
            exchange_order_id: exchange_order_id.into(),
            client_order_id: None,
            request,
            status,
            last_checked_at_ms: now_ms,
            filled_qty,
            avg_price: None,
        }
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Attach fill information reported by the exchange.
    pub fn with_fill(mut self, filled_qty: Decimal, avg_price: Option<Decimal>) -> Self {
        self.filled_qty = filled_qty;
        self.avg_price = avg_price.filter(|p| !p.is_zero());
        self
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn symbol(&self) -> &str {
        &self.request.symbol
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Apply a polled status.
    ///
    /// Returns `true` if the status changed. Terminal handles are left
    /// untouched, including their check timestamp.
    pub fn apply_status(&mut self, status: OrderStatus, now_ms: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.last_checked_at_ms = now_ms;
        if self.status == status {
            return false;
        }
        self.status = status;
        if status == OrderStatus::Filled {
            self.filled_qty = self.request.quantity;
        }
        true
    }

    /// Apply a polled status together with any fill it reports.
    pub fn apply_update(&mut self, update: OrderUpdate, now_ms: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if let Some(qty) = update.filled_qty {
            self.filled_qty = qty;
        }
        if let Some(price) = update.avg_price {
            self.avg_price = Some(price);
        }
        self.apply_status(update.status, now_ms)
    }

    /// Quantity executed on an order that did not fill completely.
    pub fn partial_fill(&self) -> Option<Decimal> {
        Some(self.filled_qty).filter(|qty| !qty.is_zero() && !self.is_filled())
    }
}
