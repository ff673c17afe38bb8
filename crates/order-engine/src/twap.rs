//! Time-weighted slicing.
//!
//! The total is split into equal step-aligned slices, the remainder going
//! to the last slice, and one slice fires per interval measured from the
//! start of execution. Slices are market orders unless a limit price is
//! given, in which case each is a GTC limit at that price. A failed slice is
//! recorded and the schedule carries on.

use std::time::Duration;

use order_core::{
    OrderHandle, OrderRequest, OrderSide, OrderSubmissionError, OrderType, SymbolFilter,
};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::TwapLimits;
use crate::context::Collaborators;
use crate::error::{StrategyError, ValidationError};
use crate::journal::{JournalEntry, StrategyKind};
use crate::placer::SingleOrderPlacer;
use crate::schedule::pause_until;
use crate::validation::{validate_order, validate_quantity};

#[derive(Debug, Clone, PartialEq)]
pub struct TwapSlice {
    /// 1-based position in the schedule.
    pub index: u32,
    /// Delay from the start of execution.
    pub offset: Duration,
    pub request: OrderRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwapPlan {
    pub symbol: String,
    pub side: OrderSide,
    pub total_quantity: Decimal,
    pub slice_count: u32,
    pub duration: Duration,
    pub interval: Duration,
    /// Set when slices rest as limit orders instead of crossing the book.
    pub limit_price: Option<Decimal>,
    pub slices: Vec<TwapSlice>,
}

impl TwapPlan {
    /// Precompute every slice. Fails if the count is out of range or a
    /// slice would fall below the symbol's minimum quantity.
    pub fn build(
        symbol: impl Into<String>,
        side: OrderSide,
        total_quantity: Decimal,
        slice_count: u32,
        duration: Duration,
        filter: &SymbolFilter,
        limits: TwapLimits,
    ) -> Result<Self, ValidationError> {
        if slice_count == 0 || slice_count > limits.max_slices {
            return Err(ValidationError::InvalidParameter(format!(
                "slice count must be between 1 and {}, got {}",
                limits.max_slices, slice_count
            )));
        }
        validate_quantity(total_quantity, filter)?;

        let count = Decimal::from(slice_count);
        let per_slice = filter.floor_quantity(total_quantity / count);
        if per_slice < filter.min_qty || per_slice.is_zero() {
            return Err(ValidationError::InvalidParameter(format!(
                "{} split into {} slices gives {} per slice, below the minimum {}",
                total_quantity, slice_count, per_slice, filter.min_qty
            )));
        }
        let last_slice = total_quantity - per_slice * Decimal::from(slice_count - 1);

        let symbol = symbol.into();
        let interval = duration / slice_count;
        let slices = (0..slice_count)
            .map(|i| {
                let quantity = if i + 1 == slice_count {
                    last_slice
                } else {
                    per_slice
                };
                TwapSlice {
                    index: i + 1,
                    offset: interval * i,
                    request: OrderRequest::market(symbol.clone(), side, quantity),
                }
            })
            .collect();

        Ok(Self {
            symbol,
            side,
            total_quantity,
            slice_count,
            duration,
            interval,
            limit_price: None,
            slices,
        })
    }

    /// Turn every slice into a GTC limit order at `price`.
    pub fn with_limit_price(mut self, price: Decimal) -> Self {
        for slice in &mut self.slices {
            slice.request = OrderRequest::limit(
                self.symbol.clone(),
                self.side,
                slice.request.quantity,
                price,
            );
        }
        self.limit_price = Some(price);
        self
    }

    pub fn slice_total(&self) -> Decimal {
        self.slices.iter().map(|s| s.request.quantity).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceResult {
    pub index: u32,
    pub quantity: Decimal,
    pub scheduled: Duration,
    /// Actual time from the start of execution to submission.
    pub fired_after: Duration,
    /// Market price sampled just before submission.
    pub reference_price: Option<Decimal>,
    pub result: Result<OrderHandle, OrderSubmissionError>,
}

/// Aggregate outcome of a batch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Complete,
    Partial,
    None,
}

#[derive(Debug, Clone)]
pub struct TwapReport {
    pub requested_quantity: Decimal,
    pub slice_count: u32,
    pub results: Vec<SliceResult>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl TwapReport {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failures(&self) -> Vec<&SliceResult> {
        self.results.iter().filter(|r| r.result.is_err()).collect()
    }

    /// Sum of quantities accepted by the exchange.
    pub fn submitted_quantity(&self) -> Decimal {
        self.results
            .iter()
            .filter(|r| r.result.is_ok())
            .map(|r| r.quantity)
            .sum()
    }

    /// Sum of quantities the exchange reported as filled.
    pub fn executed_quantity(&self) -> Decimal {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .map(|h| h.filled_qty)
            .sum()
    }

    /// Quantity-weighted average of each accepted slice's fill price. A
    /// market slice with no reported fill price counts at its sampled
    /// reference price; a limit slice without one is left out.
    pub fn average_price(&self) -> Option<Decimal> {
        let (notional, quantity) = self
            .results
            .iter()
            .filter_map(|r| {
                let handle = r.result.as_ref().ok()?;
                let fallback = r
                    .reference_price
                    .filter(|_| handle.request.order_type == OrderType::Market);
                let price = handle.avg_price.or(fallback)?;
                Some((price * r.quantity, r.quantity))
            })
            .fold((Decimal::ZERO, Decimal::ZERO), |(n, q), (dn, dq)| {
                (n + dn, q + dq)
            });
        if quantity.is_zero() {
            None
        } else {
            Some((notional / quantity).round_dp(8).normalize())
        }
    }

    pub fn status(&self) -> BatchStatus {
        let successful = self.successful();
        if successful == 0 {
            BatchStatus::None
        } else if successful == self.slice_count as usize && !self.interrupted {
            BatchStatus::Complete
        } else {
            BatchStatus::Partial
        }
    }
}

pub struct TwapScheduler {
    ctx: Collaborators,
    placer: SingleOrderPlacer,
    limits: TwapLimits,
    limit_price: Option<Decimal>,
}

impl TwapScheduler {
    pub fn new(ctx: Collaborators, limits: TwapLimits) -> Self {
        Self {
            placer: SingleOrderPlacer::new(ctx.clone()),
            ctx,
            limits,
            limit_price: None,
        }
    }

    /// Plan limit slices at `price` instead of market slices.
    pub fn with_limit_price(mut self, price: Option<Decimal>) -> Self {
        self.limit_price = price;
        self
    }

    /// Build the plan and validate every slice. `reference` prices the
    /// notional check for market slices.
    pub async fn plan(
        &self,
        symbol: &str,
        side: OrderSide,
        total_quantity: Decimal,
        slice_count: u32,
        duration: Duration,
        reference: Option<Decimal>,
    ) -> Result<TwapPlan, StrategyError> {
        let filter = self.ctx.filters.get(symbol).await?;
        let mut plan = TwapPlan::build(
            symbol,
            side,
            total_quantity,
            slice_count,
            duration,
            &filter,
            self.limits,
        )?;
        if let Some(price) = self.limit_price {
            plan = plan.with_limit_price(price);
        }
        for slice in &plan.slices {
            validate_order(&slice.request, &filter, reference)?;
        }
        Ok(plan)
    }

    /// Submit each slice at its offset. Stops early on shutdown; slices
    /// already submitted are left as they are.
    pub async fn execute(&self, plan: &TwapPlan, mut shutdown: watch::Receiver<bool>) -> TwapReport {
        let started = Instant::now();
        info!(
            symbol = %plan.symbol,
            side = %plan.side,
            total = %plan.total_quantity,
            slices = plan.slice_count,
            interval = ?plan.interval,
            limit_price = ?plan.limit_price,
            "starting TWAP"
        );
        self.ctx.record(JournalEntry::info(
            StrategyKind::Twap,
            "TWAP_STRATEGY_START",
            &plan.symbol,
            match plan.limit_price {
                Some(price) => format!(
                    "{} {} over {} limit slices at {} every {:?}",
                    plan.side, plan.total_quantity, plan.slice_count, price, plan.interval
                ),
                None => format!(
                    "{} {} over {} slices every {:?}",
                    plan.side, plan.total_quantity, plan.slice_count, plan.interval
                ),
            },
        ));

        let mut results = Vec::with_capacity(plan.slices.len());
        let mut interrupted = false;
        for slice in &plan.slices {
            if !pause_until(started + slice.offset, &mut shutdown).await {
                interrupted = true;
                break;
            }

            let reference_price = match self.ctx.gateway.ticker_price(&plan.symbol).await {
                Ok(price) => Some(price),
                Err(e) => {
                    debug!(error = %e, "no reference price for slice");
                    None
                }
            };
            let result = self.placer.submit(&slice.request).await;
            self.record_slice(plan, slice, &result);

            results.push(SliceResult {
                index: slice.index,
                quantity: slice.request.quantity,
                scheduled: slice.offset,
                fired_after: started.elapsed(),
                reference_price,
                result,
            });
        }

        let report = TwapReport {
            requested_quantity: plan.total_quantity,
            slice_count: plan.slice_count,
            results,
            interrupted,
            elapsed: started.elapsed(),
        };

        let summary = format!(
            "{}/{} slices succeeded, {} of {} submitted, {} executed",
            report.successful(),
            plan.slice_count,
            report.submitted_quantity(),
            plan.total_quantity,
            report.executed_quantity()
        );
        if interrupted {
            warn!(symbol = %plan.symbol, "TWAP interrupted: {}", summary);
            self.ctx.record(JournalEntry::warn(
                StrategyKind::Twap,
                "TWAP_STRATEGY_INTERRUPTED",
                &plan.symbol,
                summary,
            ));
        } else {
            info!(symbol = %plan.symbol, "TWAP complete: {}", summary);
            self.ctx.record(JournalEntry::info(
                StrategyKind::Twap,
                "TWAP_STRATEGY_COMPLETE",
                &plan.symbol,
                summary,
            ));
        }
        report
    }

    fn record_slice(
        &self,
        plan: &TwapPlan,
        slice: &TwapSlice,
        result: &Result<OrderHandle, OrderSubmissionError>,
    ) {
        let entry = match result {
            Ok(handle) => JournalEntry::info(
                StrategyKind::Twap,
                "TWAP_SLICE_SUCCESS",
                &plan.symbol,
                format!(
                    "slice {}/{}: {} {}",
                    slice.index, plan.slice_count, plan.side, slice.request.quantity
                ),
            )
            .with_order_id(&handle.exchange_order_id),
            Err(e) => JournalEntry::error(
                StrategyKind::Twap,
                "TWAP_SLICE_FAILED",
                &plan.symbol,
                format!("slice {}/{} failed: {}", slice.index, plan.slice_count, e),
            ),
        };
        self.ctx.record(entry);
    }
}
