//! Futures API response types.

use order_core::SymbolFilter;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Response from GET /fapi/v1/time.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTimeResponse {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

/// Response from POST, GET and DELETE /fapi/v1/order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesOrderResponse {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub orig_qty: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub executed_qty: Decimal,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub price: Option<Decimal>,
    /// Zero until the first fill.
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub avg_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub update_time: i64,
}

/// Response from GET /fapi/v1/ticker/price.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPriceResponse {
    pub symbol: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub price: Decimal,
}

/// Response from GET /fapi/v1/exchangeInfo (only the parts used here).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilterEntry>,
}

/// One entry of a symbol's `filters` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilterEntry {
    #[serde(rename = "PRICE_FILTER")]
    Price {
        #[serde(rename = "tickSize", deserialize_with = "deserialize_decimal_from_str")]
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize", deserialize_with = "deserialize_decimal_from_str")]
        step_size: Decimal,
        #[serde(rename = "minQty", deserialize_with = "deserialize_decimal_from_str")]
        min_qty: Decimal,
    },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional {
        #[serde(deserialize_with = "deserialize_decimal_from_str")]
        notional: Decimal,
    },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    /// Collapse the filter entries into a `SymbolFilter`.
    ///
    /// Returns `None` if PRICE_FILTER or LOT_SIZE is missing; an absent
    /// MIN_NOTIONAL is treated as zero.
    pub fn to_symbol_filter(&self) -> Option<SymbolFilter> {
        let mut tick = None;
        let mut lot = None;
        let mut min_notional = Decimal::ZERO;

        for entry in &self.filters {
            match entry {
                SymbolFilterEntry::Price { tick_size } => tick = Some(*tick_size),
                SymbolFilterEntry::LotSize { step_size, min_qty } => {
                    lot = Some((*step_size, *min_qty))
                }
                SymbolFilterEntry::MinNotional { notional } => min_notional = *notional,
                SymbolFilterEntry::Other => {}
            }
        }

        let (step_size, min_qty) = lot?;
        Some(SymbolFilter::new(
            tick?.normalize(),
            step_size.normalize(),
            min_qty.normalize(),
            min_notional.normalize(),
        ))
    }
}

fn deserialize_decimal_from_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}

/// Empty strings and zero both mean "not set" in order responses.
fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    match s.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => {
            let d = v.parse::<Decimal>().map_err(serde::de::Error::custom)?;
            Ok(if d.is_zero() { None } else { Some(d) })
        }
    }
}
