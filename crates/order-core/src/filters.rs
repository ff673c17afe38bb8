//! Per-symbol exchange filters and price/quantity rounding.

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Trading constraints the exchange enforces for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilter {
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Minimum quantity increment.
    pub step_size: Decimal,
    pub min_qty: Decimal,
    /// Minimum price × quantity.
    pub min_notional: Decimal,
}

impl SymbolFilter {
    pub fn new(
        tick_size: Decimal,
        step_size: Decimal,
        min_qty: Decimal,
        min_notional: Decimal,
    ) -> Self {
        Self {
            tick_size,
            step_size,
            min_qty,
            min_notional,
        }
    }

    /// A zero tick size means the exchange imposes no increment.
    pub fn is_tick_aligned(&self, price: Decimal) -> bool {
        self.tick_size.is_zero() || (price % self.tick_size).is_zero()
    }

    pub fn is_step_aligned(&self, quantity: Decimal) -> bool {
        self.step_size.is_zero() || (quantity % self.step_size).is_zero()
    }

    /// Nearest tick, halves rounded away from zero.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        if self.tick_size.is_zero() {
            return price;
        }
        let ticks = (price / self.tick_size)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        (ticks * self.tick_size).normalize()
    }

    /// Largest step multiple not above `quantity`.
    pub fn floor_quantity(&self, quantity: Decimal) -> Decimal {
        if self.step_size.is_zero() {
            return quantity;
        }
        ((quantity / self.step_size).floor() * self.step_size).normalize()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Filter metadata could not be fetched.
    #[error("symbol filters unavailable: {0}")]
    Unavailable(String),
}

/// Source of per-symbol filters.
#[async_trait]
pub trait SymbolFilters: Send + Sync {
    async fn get(&self, symbol: &str) -> Result<SymbolFilter, FilterError>;
}

/// Fixed filter table, used offline (dry runs) and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSymbolFilters {
    filters: HashMap<String, SymbolFilter>,
    fallback: Option<SymbolFilter>,
}

impl StaticSymbolFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters for the most traded USDT-M perpetuals, as published by the
    /// exchange.
    pub fn futures_defaults() -> Self {
        let d = Decimal::new;
        Self::new()
            .with_symbol(
                "BTCUSDT",
                SymbolFilter::new(d(1, 1), d(1, 3), d(1, 3), d(100, 0)),
            )
            .with_symbol(
                "ETHUSDT",
                SymbolFilter::new(d(1, 2), d(1, 3), d(1, 3), d(20, 0)),
            )
            .with_symbol(
                "BNBUSDT",
                SymbolFilter::new(d(1, 2), d(1, 2), d(1, 2), d(5, 0)),
            )
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>, filter: SymbolFilter) -> Self {
        self.filters.insert(symbol.into(), filter);
        self
    }

    /// Filter returned for symbols not in the table.
    pub fn with_fallback(mut self, filter: SymbolFilter) -> Self {
        self.fallback = Some(filter);
        self
    }

    pub fn lookup(&self, symbol: &str) -> Option<SymbolFilter> {
        self.filters.get(symbol).copied().or(self.fallback)
    }
}

#[async_trait]
impl SymbolFilters for StaticSymbolFilters {
    async fn get(&self, symbol: &str) -> Result<SymbolFilter, FilterError> {
        self.lookup(symbol)
            .ok_or_else(|| FilterError::UnknownSymbol(symbol.to_string()))
    }
}

/// Answers from `fallback` when `primary` cannot reach its source.
///
/// An unknown symbol from the primary source is final and is not
/// retried against the fallback table.
#[derive(Clone)]
pub struct FallbackSymbolFilters {
    primary: Arc<dyn SymbolFilters>,
    fallback: StaticSymbolFilters,
}

impl FallbackSymbolFilters {
    pub fn new(primary: Arc<dyn SymbolFilters>, fallback: StaticSymbolFilters) -> Self {
        Self { primary, fallback }
    }
}

impl std::fmt::Debug for FallbackSymbolFilters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackSymbolFilters")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SymbolFilters for FallbackSymbolFilters {
    async fn get(&self, symbol: &str) -> Result<SymbolFilter, FilterError> {
        match self.primary.get(symbol).await {
            Err(FilterError::Unavailable(_)) => self.fallback.get(symbol).await,
            other => other,
        }
    }
}
