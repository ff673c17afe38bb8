//! Pre-submission checks.
//!
//! Everything here is pure: no I/O, no clocks. Strategies run these checks
//! for every order they intend to submit before the first gateway call, so
//! invalid input never produces a partial submission.

use order_core::{OrderRequest, OrderSide, SymbolFilter};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::ValidationError;

/// Upper bound on any single order quantity.
pub const MAX_QUANTITY: Decimal = dec!(1000000);
/// Upper bound on any price.
pub const MAX_PRICE: Decimal = dec!(10000000);

const QUOTE_ASSET: &str = "USDT";

/// Trim and upper-case `raw`, then check it names a USDT-M pair.
pub fn normalize_symbol(raw: &str) -> Result<String, ValidationError> {
    let symbol = raw.trim().to_uppercase();
    check_symbol(&symbol)?;
    Ok(symbol)
}

fn check_symbol(symbol: &str) -> Result<(), ValidationError> {
    let well_formed = symbol.len() >= QUOTE_ASSET.len() + 2
        && symbol.ends_with(QUOTE_ASSET)
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidSymbol(symbol.to_string()))
    }
}

/// Check one request against the symbol's filters.
///
/// The notional is priced at the limit price, else the stop price, else
/// `reference` (the market price, when known). Market orders without a
/// reference skip the notional check.
pub fn validate_order(
    request: &OrderRequest,
    filter: &SymbolFilter,
    reference: Option<Decimal>,
) -> Result<(), ValidationError> {
    check_symbol(&request.symbol)?;
    validate_quantity(request.quantity, filter)?;

    if request.order_type.requires_price() && request.price.is_none() {
        return Err(ValidationError::MissingPrice(request.order_type));
    }
    if request.order_type.requires_stop_price() && request.stop_price.is_none() {
        return Err(ValidationError::MissingStopPrice(request.order_type));
    }
    if let Some(price) = request.price {
        validate_price("price", price, filter)?;
    }
    if let Some(stop) = request.stop_price {
        validate_price("stop price", stop, filter)?;
    }

    if let Some(notional) = request.notional(reference) {
        if notional < filter.min_notional {
            return Err(ValidationError::NotionalBelowMinimum {
                notional,
                min_notional: filter.min_notional,
            });
        }
    }
    Ok(())
}

pub fn validate_quantity(quantity: Decimal, filter: &SymbolFilter) -> Result<(), ValidationError> {
    if quantity <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveQuantity(quantity));
    }
    if quantity > MAX_QUANTITY {
        return Err(ValidationError::AboveSanityLimit {
            field: "quantity",
            value: quantity,
            limit: MAX_QUANTITY,
        });
    }
    if quantity < filter.min_qty {
        return Err(ValidationError::QuantityBelowMinimum {
            quantity,
            min_qty: filter.min_qty,
        });
    }
    if !filter.is_step_aligned(quantity) {
        return Err(ValidationError::QuantityNotStepAligned {
            quantity,
            step_size: filter.step_size,
        });
    }
    Ok(())
}

pub fn validate_price(
    field: &'static str,
    price: Decimal,
    filter: &SymbolFilter,
) -> Result<(), ValidationError> {
    if price <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePrice { field, value: price });
    }
    if price > MAX_PRICE {
        return Err(ValidationError::AboveSanityLimit {
            field,
            value: price,
            limit: MAX_PRICE,
        });
    }
    if !filter.is_tick_aligned(price) {
        return Err(ValidationError::PriceNotTickAligned {
            field,
            price,
            tick_size: filter.tick_size,
        });
    }
    Ok(())
}

/// A BUY stop-limit must not cap below its trigger, a SELL must not floor
/// above it.
pub fn validate_stop_limit_prices(
    side: OrderSide,
    stop_price: Decimal,
    limit_price: Decimal,
) -> Result<(), ValidationError> {
    let consistent = match side {
        OrderSide::Buy => limit_price >= stop_price,
        OrderSide::Sell => limit_price <= stop_price,
    };
    if consistent {
        Ok(())
    } else {
        let expected = match side {
            OrderSide::Buy => "at or above",
            OrderSide::Sell => "at or below",
        };
        Err(ValidationError::PriceRelationship(format!(
            "{} stop-limit: limit price {} must be {} stop price {}",
            side, limit_price, expected, stop_price
        )))
    }
}

/// `side` is the closing side. SELL closes a long: take-profit above,
/// stop-loss below (and, when `market` is known, on either side of it).
/// BUY closes a short and mirrors that.
pub fn validate_oco_prices(
    side: OrderSide,
    take_profit: Decimal,
    stop_loss: Decimal,
    market: Option<Decimal>,
) -> Result<(), ValidationError> {
    let (tp_ok, word) = match side {
        OrderSide::Sell => (take_profit > stop_loss, "above"),
        OrderSide::Buy => (take_profit < stop_loss, "below"),
    };
    if !tp_ok {
        return Err(ValidationError::PriceRelationship(format!(
            "{} OCO: take-profit {} must be {} stop-loss {}",
            side, take_profit, word, stop_loss
        )));
    }

    if let Some(market) = market {
        let (tp_side_ok, sl_side_ok) = match side {
            OrderSide::Sell => (take_profit > market, stop_loss < market),
            OrderSide::Buy => (take_profit < market, stop_loss > market),
        };
        if !tp_side_ok {
            return Err(ValidationError::PriceRelationship(format!(
                "{} OCO: take-profit {} must be {} market price {}",
                side, take_profit, word, market
            )));
        }
        if !sl_side_ok {
            let opposite = if word == "above" { "below" } else { "above" };
            return Err(ValidationError::PriceRelationship(format!(
                "{} OCO: stop-loss {} must be {} market price {}",
                side, stop_loss, opposite, market
            )));
        }
    }
    Ok(())
}
