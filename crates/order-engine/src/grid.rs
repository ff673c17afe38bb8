//! Static grid: evenly spaced limit orders between two prices, placed in
//! one pass. Buys below the reference price, sells above it. Nothing is
//! monitored after placement.

use order_core::{OrderHandle, OrderRequest, OrderSide, OrderSubmissionError, SymbolFilter};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::GridLimits;
use crate::context::Collaborators;
use crate::error::{StrategyError, ValidationError};
use crate::journal::{JournalEntry, StrategyKind};
use crate::placer::SingleOrderPlacer;
use crate::schedule::is_shutdown;
use crate::twap::BatchStatus;
use crate::validation::{validate_order, validate_quantity, MAX_PRICE};

#[derive(Debug, Clone, PartialEq)]
pub struct GridLevel {
    pub index: u32,
    pub price: Decimal,
    /// `None` when the level sits exactly on the reference price.
    pub side: Option<OrderSide>,
    pub order: Result<OrderRequest, ValidationError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan {
    pub symbol: String,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub level_count: u32,
    pub quantity_per_level: Decimal,
    pub reference_price: Decimal,
    /// Ascending by price.
    pub levels: Vec<GridLevel>,
}

impl GridPlan {
    /// Compute the ladder. Range and count problems fail the whole plan;
    /// a level that fails its own checks is kept with the error.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        symbol: impl Into<String>,
        lower_price: Decimal,
        upper_price: Decimal,
        level_count: u32,
        quantity_per_level: Decimal,
        reference_price: Decimal,
        filter: &SymbolFilter,
        limits: GridLimits,
    ) -> Result<Self, ValidationError> {
        if level_count < 2 || level_count > limits.max_levels {
            return Err(ValidationError::InvalidParameter(format!(
                "grid levels must be between 2 and {}, got {}",
                limits.max_levels, level_count
            )));
        }
        for (field, value) in [("lower price", lower_price), ("upper price", upper_price)] {
            if value <= Decimal::ZERO {
                return Err(ValidationError::NonPositivePrice { field, value });
            }
            if value > MAX_PRICE {
                return Err(ValidationError::AboveSanityLimit {
                    field,
                    value,
                    limit: MAX_PRICE,
                });
            }
        }
        if lower_price >= upper_price {
            return Err(ValidationError::PriceRelationship(format!(
                "lower price {} must be below upper price {}",
                lower_price, upper_price
            )));
        }
        validate_quantity(quantity_per_level, filter)?;

        let prices = level_prices(lower_price, upper_price, level_count, filter)?;
        let symbol = symbol.into();
        let levels = prices
            .into_iter()
            .zip(0u32..)
            .map(|(price, index)| {
                let side = if price < reference_price {
                    Some(OrderSide::Buy)
                } else if price > reference_price {
                    Some(OrderSide::Sell)
                } else {
                    None
                };
                let order = match side {
                    Some(side) => {
                        let request =
                            OrderRequest::limit(symbol.clone(), side, quantity_per_level, price);
                        validate_order(&request, filter, None).map(|()| request)
                    }
                    None => Err(ValidationError::PriceRelationship(format!(
                        "level {} equals the reference price, no side to place",
                        price
                    ))),
                };
                GridLevel {
                    index,
                    price,
                    side,
                    order,
                }
            })
            .collect();

        Ok(Self {
            symbol,
            lower_price,
            upper_price,
            level_count,
            quantity_per_level,
            reference_price,
            levels,
        })
    }

    pub fn prices(&self) -> Vec<Decimal> {
        self.levels.iter().map(|l| l.price).collect()
    }

    pub fn placeable_levels(&self) -> usize {
        self.levels.iter().filter(|l| l.order.is_ok()).count()
    }
}

fn level_prices(
    lower: Decimal,
    upper: Decimal,
    count: u32,
    filter: &SymbolFilter,
) -> Result<Vec<Decimal>, ValidationError> {
    let step = (upper - lower) / Decimal::from(count - 1);
    let prices: Vec<Decimal> = (0..count)
        .map(|i| {
            let raw = if i + 1 == count {
                upper
            } else {
                lower + step * Decimal::from(i)
            };
            filter.round_price(raw)
        })
        .collect();

    let increasing = prices.windows(2).all(|w| w[0] < w[1]);
    if !increasing || prices[0] <= Decimal::ZERO {
        return Err(ValidationError::InvalidParameter(format!(
            "range {}..{} is too narrow for {} levels at tick size {}",
            lower, upper, count, filter.tick_size
        )));
    }
    Ok(prices)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    #[error("skipped: {0}")]
    Invalid(#[from] ValidationError),
    #[error("rejected: {0}")]
    Rejected(#[from] OrderSubmissionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridPlacement {
    pub level_index: u32,
    pub price: Decimal,
    pub side: Option<OrderSide>,
    pub result: Result<OrderHandle, PlacementError>,
}

#[derive(Debug, Clone)]
pub struct GridReport {
    pub placements: Vec<GridPlacement>,
    pub level_count: u32,
    pub interrupted: bool,
}

impl GridReport {
    pub fn placed(&self) -> impl Iterator<Item = &OrderHandle> {
        self.placements.iter().filter_map(|p| p.result.as_ref().ok())
    }

    pub fn failures(&self) -> Vec<&GridPlacement> {
        self.placements.iter().filter(|p| p.result.is_err()).collect()
    }

    pub fn status(&self) -> BatchStatus {
        let placed = self.placed().count();
        if placed == 0 {
            BatchStatus::None
        } else if placed == self.level_count as usize {
            BatchStatus::Complete
        } else {
            BatchStatus::Partial
        }
    }
}

pub struct GridPlacer {
    ctx: Collaborators,
    placer: SingleOrderPlacer,
    limits: GridLimits,
}

impl GridPlacer {
    pub fn new(ctx: Collaborators, limits: GridLimits) -> Self {
        Self {
            placer: SingleOrderPlacer::new(ctx.clone()),
            ctx,
            limits,
        }
    }

    pub async fn plan(
        &self,
        symbol: &str,
        lower_price: Decimal,
        upper_price: Decimal,
        level_count: u32,
        quantity_per_level: Decimal,
        reference_price: Decimal,
    ) -> Result<GridPlan, StrategyError> {
        let filter = self.ctx.filters.get(symbol).await?;
        let plan = GridPlan::build(
            symbol,
            lower_price,
            upper_price,
            level_count,
            quantity_per_level,
            reference_price,
            &filter,
            self.limits,
        )?;
        Ok(plan)
    }

    /// Place every valid level in ascending price order. Failures are
    /// recorded per level and never stop the batch; shutdown does.
    pub async fn execute(&self, plan: &GridPlan, shutdown: watch::Receiver<bool>) -> GridReport {
        info!(
            symbol = %plan.symbol,
            lower = %plan.lower_price,
            upper = %plan.upper_price,
            levels = plan.level_count,
            reference = %plan.reference_price,
            "placing grid"
        );

        let mut placements = Vec::with_capacity(plan.levels.len());
        let mut interrupted = false;
        for level in &plan.levels {
            if is_shutdown(&shutdown) {
                interrupted = true;
                break;
            }
            let result = match &level.order {
                Ok(request) => self
                    .placer
                    .submit(request)
                    .await
                    .map_err(PlacementError::from),
                Err(e) => {
                    warn!(level = level.index, price = %level.price, reason = %e, "grid level skipped");
                    Err(PlacementError::from(e.clone()))
                }
            };
            self.record_level(plan, level, &result);
            placements.push(GridPlacement {
                level_index: level.index,
                price: level.price,
                side: level.side,
                result,
            });
        }

        let report = GridReport {
            placements,
            level_count: plan.level_count,
            interrupted,
        };
        let summary = format!(
            "{}/{} levels placed, {} failed",
            report.placed().count(),
            plan.level_count,
            report.failures().len()
        );
        info!(symbol = %plan.symbol, "grid done: {}", summary);
        self.ctx.record(JournalEntry::info(
            StrategyKind::Grid,
            if interrupted {
                "GRID_STRATEGY_INTERRUPTED"
            } else {
                "GRID_STRATEGY_COMPLETE"
            },
            &plan.symbol,
            summary,
        ));
        report
    }

    fn record_level(
        &self,
        plan: &GridPlan,
        level: &GridLevel,
        result: &Result<OrderHandle, PlacementError>,
    ) {
        let side = level.side.map_or("-", |s| s.as_binance_str());
        let entry = match result {
            Ok(handle) => JournalEntry::info(
                StrategyKind::Grid,
                "GRID_ORDER_PLACED",
                &plan.symbol,
                format!("level {} {} {} at {}", level.index, side, plan.quantity_per_level, level.price),
            )
            .with_order_id(&handle.exchange_order_id),
            Err(e) => JournalEntry::error(
                StrategyKind::Grid,
                "GRID_ORDER_FAILED",
                &plan.symbol,
                format!("level {} {} at {}: {}", level.index, side, level.price, e),
            ),
        };
        self.ctx.record(entry);
    }
}
