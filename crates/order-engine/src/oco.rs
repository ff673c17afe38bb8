//! Emulated OCO: a reduce-only take-profit limit and a reduce-only
//! stop-market order, polled until one fills, then the other is canceled.
//!
//! ```text
//! PLACING ──> MONITORING ──> RESOLVING ──> RESOLVED
//!    │            │              │
//!    └────────────┴──────────────┴───────> FAILED
//! ```
//!
//! Each poll round reads both legs before evaluating either, and legs
//! already in a terminal status are not queried again. A fill read in a
//! round wins over a failed query of the other leg. Both legs filled is
//! never reported as success.

use std::time::Duration;

use order_core::{
    now_ms, CancelError, OrderHandle, OrderRequest, OrderSide, OrderStatus, OrderSubmissionError,
    OrderUpdate, QueryError,
};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{OcoConfig, TimeoutPolicy};
use crate::context::Collaborators;
use crate::error::{OcoLeg, StrategyError};
use crate::journal::{JournalEntry, StrategyKind};
use crate::schedule::{is_shutdown, pause_until};
use crate::validation::{validate_oco_prices, validate_order};

/// The two legs to place. `side` is the closing side for both.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoPlan {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit: OrderRequest,
    pub stop_loss: OrderRequest,
}

impl OcoPlan {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        take_profit_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Self {
        let symbol = symbol.into();
        let take_profit =
            OrderRequest::limit(symbol.clone(), side, quantity, take_profit_price).reduce_only();
        let stop_loss =
            OrderRequest::stop_market(symbol.clone(), side, quantity, stop_loss_price).reduce_only();
        Self {
            symbol,
            side,
            quantity,
            take_profit_price,
            stop_loss_price,
            take_profit,
            stop_loss,
        }
    }

    pub fn request(&self, leg: OcoLeg) -> &OrderRequest {
        match leg {
            OcoLeg::TakeProfit => &self.take_profit,
            OcoLeg::StopLoss => &self.stop_loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcoState {
    Placing,
    Monitoring,
    Resolving,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcoResolution {
    Pending,
    TakeProfitFilled,
    StopLossFilled,
    Error,
}

/// Both placed legs.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoPair {
    pub take_profit: OrderHandle,
    pub stop_loss: OrderHandle,
    pub resolution: OcoResolution,
}

impl OcoPair {
    pub fn leg(&self, leg: OcoLeg) -> &OrderHandle {
        match leg {
            OcoLeg::TakeProfit => &self.take_profit,
            OcoLeg::StopLoss => &self.stop_loss,
        }
    }

    fn leg_mut(&mut self, leg: OcoLeg) -> &mut OrderHandle {
        match leg {
            OcoLeg::TakeProfit => &mut self.take_profit,
            OcoLeg::StopLoss => &mut self.stop_loss,
        }
    }

    /// IDs of legs not yet in a terminal status.
    pub fn open_order_ids(&self) -> Vec<&str> {
        [&self.take_profit, &self.stop_loss]
            .into_iter()
            .filter(|h| !h.is_terminal())
            .map(|h| h.exchange_order_id.as_str())
            .collect()
    }
}

/// How supervision ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcoOutcome {
    TakeProfitFilled,
    StopLossFilled,
    BothFilled,
    /// Both legs closed without a fill.
    NoExecution,
    TimedOut { legs_canceled: bool },
    /// A status query kept failing; both legs may still be open.
    QueryFailed(QueryError),
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct OcoReport {
    pub pair: OcoPair,
    pub state: OcoState,
    pub outcome: OcoOutcome,
    pub polls: u32,
    pub elapsed: Duration,
    pub history: Vec<OcoState>,
    /// Set when the leg opposite a fill could not be canceled.
    pub cancel_failure: Option<CancelError>,
}

impl OcoReport {
    /// `Ok` only when exactly one leg filled.
    pub fn check(&self) -> Result<(), StrategyError> {
        match &self.outcome {
            OcoOutcome::TakeProfitFilled | OcoOutcome::StopLossFilled => Ok(()),
            OcoOutcome::BothFilled => Err(StrategyError::BothLegsFilled {
                take_profit: self.pair.take_profit.exchange_order_id.clone(),
                stop_loss: self.pair.stop_loss.exchange_order_id.clone(),
            }),
            OcoOutcome::NoExecution => Err(StrategyError::NoExecution),
            OcoOutcome::TimedOut { .. } => Err(StrategyError::Timeout {
                polls: self.polls,
                elapsed: self.elapsed,
            }),
            OcoOutcome::QueryFailed(e) => Err(StrategyError::Query(e.clone())),
            OcoOutcome::Interrupted => Err(StrategyError::Interrupted),
        }
    }
}

enum Cancelled {
    Now,
    AlreadyClosed,
}

pub struct OcoSupervisor {
    ctx: Collaborators,
    config: OcoConfig,
    state: OcoState,
    history: Vec<OcoState>,
    cancel_failure: Option<CancelError>,
}

impl OcoSupervisor {
    pub fn new(ctx: Collaborators, config: OcoConfig) -> Self {
        Self {
            ctx,
            config,
            state: OcoState::Placing,
            history: vec![OcoState::Placing],
            cancel_failure: None,
        }
    }

    pub fn state(&self) -> OcoState {
        self.state
    }

    /// Check price ordering (and, when `market` is known, which side of the
    /// market each leg sits on) plus both legs against the symbol filters.
    pub async fn validate(
        &self,
        plan: &OcoPlan,
        market: Option<Decimal>,
    ) -> Result<(), StrategyError> {
        validate_oco_prices(
            plan.side,
            plan.take_profit_price,
            plan.stop_loss_price,
            market,
        )?;
        let filter = self.ctx.filters.get(&plan.symbol).await?;
        validate_order(&plan.take_profit, &filter, None)?;
        validate_order(&plan.stop_loss, &filter, None)?;
        Ok(())
    }

    /// Place both legs and supervise them until resolution, timeout or
    /// shutdown. Placement failures are errors; everything after placement
    /// is described by the report.
    pub async fn run(
        mut self,
        plan: &OcoPlan,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<OcoReport, StrategyError> {
        let pair = self.place_legs(plan).await?;
        Ok(self.monitor(pair, &mut shutdown).await)
    }

    fn transition(&mut self, next: OcoState) {
        debug!(from = ?self.state, to = ?next, "oco state transition");
        self.state = next;
        self.history.push(next);
    }

    async fn place_legs(&mut self, plan: &OcoPlan) -> Result<OcoPair, StrategyError> {
        let take_profit = match self.ctx.gateway.place(&plan.take_profit).await {
            Ok(handle) => handle,
            Err(source) => {
                return Err(self.leg_failed(plan, OcoLeg::TakeProfit, source, true));
            }
        };
        info!(
            symbol = %plan.symbol,
            order_id = %take_profit.exchange_order_id,
            price = %plan.take_profit_price,
            "take-profit leg placed"
        );

        let stop_loss = match self.ctx.gateway.place(&plan.stop_loss).await {
            Ok(handle) => handle,
            Err(source) => {
                warn!(
                    symbol = %plan.symbol,
                    order_id = %take_profit.exchange_order_id,
                    error = %source,
                    "stop-loss leg failed, canceling take-profit leg"
                );
                let rolled_back = self.cancel_leg(&take_profit).await.is_ok();
                return Err(self.leg_failed(plan, OcoLeg::StopLoss, source, rolled_back));
            }
        };
        info!(
            symbol = %plan.symbol,
            order_id = %stop_loss.exchange_order_id,
            price = %plan.stop_loss_price,
            "stop-loss leg placed"
        );

        self.ctx.record(
            JournalEntry::info(
                StrategyKind::Oco,
                "OCO_ORDER_SUCCESS",
                &plan.symbol,
                format!(
                    "{} {} OCO placed: take-profit {} at {}, stop-loss {} at {}",
                    plan.side,
                    plan.quantity,
                    take_profit.exchange_order_id,
                    plan.take_profit_price,
                    stop_loss.exchange_order_id,
                    plan.stop_loss_price
                ),
            )
            .with_order_id(&take_profit.exchange_order_id),
        );

        Ok(OcoPair {
            take_profit,
            stop_loss,
            resolution: OcoResolution::Pending,
        })
    }

    fn leg_failed(
        &mut self,
        plan: &OcoPlan,
        leg: OcoLeg,
        source: OrderSubmissionError,
        rolled_back: bool,
    ) -> StrategyError {
        self.transition(OcoState::Failed);
        let mut message = format!("{} leg placement failed: {}", leg, source);
        if !rolled_back {
            message.push_str("; take-profit leg could not be canceled and may still be open");
        }
        error!(symbol = %plan.symbol, leg = %leg, rolled_back, error = %source, "OCO placement failed");
        self.ctx.record(JournalEntry::error(
            StrategyKind::Oco,
            "OCO_ORDER_FAILED",
            &plan.symbol,
            message,
        ));
        StrategyError::LegPlacement {
            leg,
            source,
            rolled_back,
        }
    }

    async fn monitor(
        mut self,
        mut pair: OcoPair,
        shutdown: &mut watch::Receiver<bool>,
    ) -> OcoReport {
        self.transition(OcoState::Monitoring);
        let started = Instant::now();
        let deadline = started + self.config.max_monitor_duration;
        let mut polls = 0u32;

        let outcome = loop {
            if is_shutdown(shutdown) {
                break self.interrupted(&pair);
            }
            polls += 1;

            let take_profit = self.query_open_leg(&pair.take_profit).await;
            let stop_loss = self.query_open_leg(&pair.stop_loss).await;

            let now = now_ms();
            let mut query_error = None;
            for (leg, read) in [(OcoLeg::TakeProfit, take_profit), (OcoLeg::StopLoss, stop_loss)] {
                match read {
                    Ok(Some(update)) => {
                        pair.leg_mut(leg).apply_update(update, now);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(leg = %leg, error = %e, "leg status unknown this round");
                        if query_error.is_none() {
                            query_error = Some(e);
                        }
                    }
                }
            }
            debug!(
                poll = polls,
                take_profit = %pair.take_profit.status(),
                stop_loss = %pair.stop_loss.status(),
                "oco poll"
            );

            match (pair.take_profit.is_filled(), pair.stop_loss.is_filled()) {
                (true, true) => break self.both_filled(&pair),
                (true, false) => break self.resolve(&mut pair, OcoLeg::TakeProfit).await,
                (false, true) => break self.resolve(&mut pair, OcoLeg::StopLoss).await,
                (false, false) => {}
            }
            if let Some(e) = query_error {
                break self.query_failed(&pair, e);
            }
            if pair.take_profit.is_terminal() && pair.stop_loss.is_terminal() {
                break self.no_execution(&pair);
            }

            let next = Instant::now() + self.config.poll_interval;
            let polls_exhausted = self.config.max_polls.is_some_and(|max| polls >= max);
            if polls_exhausted || next > deadline {
                break self.time_out(&mut pair, polls, started.elapsed()).await;
            }
            if !pause_until(next, shutdown).await {
                break self.interrupted(&pair);
            }
        };

        pair.resolution = match outcome {
            OcoOutcome::TakeProfitFilled => OcoResolution::TakeProfitFilled,
            OcoOutcome::StopLossFilled => OcoResolution::StopLossFilled,
            OcoOutcome::Interrupted | OcoOutcome::TimedOut { legs_canceled: false } => {
                OcoResolution::Pending
            }
            _ => OcoResolution::Error,
        };

        OcoReport {
            pair,
            state: self.state,
            outcome,
            polls,
            elapsed: started.elapsed(),
            history: self.history,
            cancel_failure: self.cancel_failure,
        }
    }

    async fn resolve(&mut self, pair: &mut OcoPair, filled: OcoLeg) -> OcoOutcome {
        self.transition(OcoState::Resolving);
        let (action, outcome) = match filled {
            OcoLeg::TakeProfit => ("OCO_TAKE_PROFIT_EXECUTED", OcoOutcome::TakeProfitFilled),
            OcoLeg::StopLoss => ("OCO_STOP_LOSS_EXECUTED", OcoOutcome::StopLossFilled),
        };
        let filled_handle = pair.leg(filled);
        info!(
            symbol = %filled_handle.symbol(),
            leg = %filled,
            order_id = %filled_handle.exchange_order_id,
            "OCO leg filled"
        );
        self.ctx.record(
            JournalEntry::info(
                StrategyKind::Oco,
                action,
                filled_handle.symbol(),
                format!("{} leg filled", filled),
            )
            .with_order_id(&filled_handle.exchange_order_id),
        );

        let other = filled.other();
        let other_handle = pair.leg(other).clone();
        if !other_handle.is_terminal() {
            if let Some(both) = self.cancel_opposite(pair, filled, &other_handle).await {
                return both;
            }
        }
        self.record_partial_fill(pair.leg(other), other);

        self.transition(OcoState::Resolved);
        outcome
    }

    /// Cancel the leg opposite `filled`. Returns an outcome only when the
    /// cancel revealed that leg had filled too.
    async fn cancel_opposite(
        &mut self,
        pair: &mut OcoPair,
        filled: OcoLeg,
        other_handle: &OrderHandle,
    ) -> Option<OcoOutcome> {
        let other = filled.other();
        match self.cancel_leg(other_handle).await {
            Ok(Cancelled::Now) => {
                pair.leg_mut(other).apply_status(OrderStatus::Canceled, now_ms());
                info!(order_id = %other_handle.exchange_order_id, leg = %other, "opposite leg canceled");
            }
            Ok(Cancelled::AlreadyClosed) => match self.query_leg(other_handle).await {
                Ok(update) => {
                    pair.leg_mut(other).apply_update(update, now_ms());
                    if update.status == OrderStatus::Filled {
                        return Some(self.both_filled(pair));
                    }
                }
                Err(e) => self.status_unknown(other_handle, other, &e),
            },
            Err(e) => {
                error!(
                    order_id = %other_handle.exchange_order_id,
                    leg = %other,
                    error = %e,
                    "failed to cancel opposite leg"
                );
                self.ctx.record(
                    JournalEntry::error(
                        StrategyKind::Oco,
                        "OCO_CANCEL_FAILED",
                        other_handle.symbol(),
                        format!(
                            "{} filled but {} leg could not be canceled: {}; cancel it manually",
                            filled, other, e
                        ),
                    )
                    .with_order_id(&other_handle.exchange_order_id),
                );
                self.cancel_failure = Some(e);
            }
        }
        None
    }

    /// A leg reported closed by the cancel whose status could not then be
    /// read. It may have filled.
    fn status_unknown(&self, handle: &OrderHandle, leg: OcoLeg, err: &QueryError) {
        warn!(
            order_id = %handle.exchange_order_id,
            leg = %leg,
            error = %err,
            "leg already closed, final status unknown"
        );
        self.ctx.record(
            JournalEntry::warn(
                StrategyKind::Oco,
                "OCO_QUERY_FAILED",
                handle.symbol(),
                format!(
                    "{} leg already closed but its final status is unknown ({}); check it for a fill",
                    leg, err
                ),
            )
            .with_order_id(&handle.exchange_order_id),
        );
    }

    /// Journal a leg that closed with only part of its quantity executed.
    fn record_partial_fill(&self, handle: &OrderHandle, leg: OcoLeg) {
        let Some(filled_qty) = handle.partial_fill().filter(|_| handle.is_terminal()) else {
            return;
        };
        warn!(
            order_id = %handle.exchange_order_id,
            leg = %leg,
            filled = %filled_qty,
            quantity = %handle.request.quantity,
            "leg closed after a partial fill"
        );
        self.ctx.record(
            JournalEntry::warn(
                StrategyKind::Oco,
                "OCO_PARTIAL_FILL",
                handle.symbol(),
                format!(
                    "{} leg partially filled {} of {} before closing ({})",
                    leg,
                    filled_qty,
                    handle.request.quantity,
                    handle.status()
                ),
            )
            .with_order_id(&handle.exchange_order_id),
        );
    }

    fn both_filled(&mut self, pair: &OcoPair) -> OcoOutcome {
        error!(
            symbol = %pair.take_profit.symbol(),
            take_profit = %pair.take_profit.exchange_order_id,
            stop_loss = %pair.stop_loss.exchange_order_id,
            "BOTH OCO LEGS FILLED: position may be doubled, check the account"
        );
        self.ctx.record(
            JournalEntry::error(
                StrategyKind::Oco,
                "OCO_BOTH_FILLED",
                pair.take_profit.symbol(),
                format!(
                    "take-profit {} and stop-loss {} both filled",
                    pair.take_profit.exchange_order_id, pair.stop_loss.exchange_order_id
                ),
            )
            .with_order_id(&pair.stop_loss.exchange_order_id),
        );
        self.transition(OcoState::Failed);
        OcoOutcome::BothFilled
    }

    fn no_execution(&mut self, pair: &OcoPair) -> OcoOutcome {
        warn!(
            take_profit = %pair.take_profit.status(),
            stop_loss = %pair.stop_loss.status(),
            "both OCO legs closed without a fill"
        );
        self.ctx.record(JournalEntry::error(
            StrategyKind::Oco,
            "OCO_ORDER_FAILED",
            pair.take_profit.symbol(),
            format!(
                "both legs closed without a fill (take-profit {}, stop-loss {})",
                pair.take_profit.status(),
                pair.stop_loss.status()
            ),
        ));
        self.transition(OcoState::Failed);
        OcoOutcome::NoExecution
    }

    fn query_failed(&mut self, pair: &OcoPair, err: QueryError) -> OcoOutcome {
        let open = pair.open_order_ids().join(", ");
        error!(error = %err, open_orders = %open, "OCO status query failed");
        self.ctx.record(JournalEntry::error(
            StrategyKind::Oco,
            "OCO_ORDER_FAILED",
            pair.take_profit.symbol(),
            format!("{}; legs left open: {}", err, open),
        ));
        self.transition(OcoState::Failed);
        OcoOutcome::QueryFailed(err)
    }

    fn interrupted(&mut self, pair: &OcoPair) -> OcoOutcome {
        let open = pair.open_order_ids().join(", ");
        warn!(open_orders = %open, "OCO supervision interrupted, legs left open");
        self.ctx.record(JournalEntry::warn(
            StrategyKind::Oco,
            "OCO_INTERRUPTED",
            pair.take_profit.symbol(),
            format!("supervision stopped; open orders: {}", open),
        ));
        OcoOutcome::Interrupted
    }

    async fn time_out(&mut self, pair: &mut OcoPair, polls: u32, elapsed: Duration) -> OcoOutcome {
        warn!(
            polls,
            elapsed = ?elapsed,
            policy = %self.config.timeout_policy,
            "OCO monitoring timed out"
        );

        let cancel_both = self.config.timeout_policy == TimeoutPolicy::CancelBoth;
        if cancel_both {
            for leg in [OcoLeg::TakeProfit, OcoLeg::StopLoss] {
                let handle = pair.leg(leg).clone();
                if handle.is_terminal() {
                    continue;
                }
                match self.cancel_leg(&handle).await {
                    Ok(Cancelled::Now) => {
                        pair.leg_mut(leg).apply_status(OrderStatus::Canceled, now_ms());
                    }
                    // Closed between the last poll and the cancel: it may have filled
                    Ok(Cancelled::AlreadyClosed) => match self.query_leg(&handle).await {
                        Ok(update) => {
                            pair.leg_mut(leg).apply_update(update, now_ms());
                            if update.status == OrderStatus::Filled {
                                return self.resolve(pair, leg).await;
                            }
                        }
                        Err(e) => self.status_unknown(&handle, leg, &e),
                    },
                    Err(e) => {
                        error!(order_id = %handle.exchange_order_id, leg = %leg, error = %e, "timeout cancel failed");
                        self.ctx.record(
                            JournalEntry::error(
                                StrategyKind::Oco,
                                "OCO_CANCEL_FAILED",
                                handle.symbol(),
                                format!("{} leg could not be canceled: {}", leg, e),
                            )
                            .with_order_id(&handle.exchange_order_id),
                        );
                    }
                }
                self.record_partial_fill(pair.leg(leg), leg);
            }
        }

        // A leg counts as canceled only once it is confirmed closed
        let legs_canceled = cancel_both && pair.open_order_ids().is_empty();
        let message = if legs_canceled {
            format!("no fill after {} polls ({:?}); both legs canceled", polls, elapsed)
        } else {
            format!(
                "no fill after {} polls ({:?}); open orders: {}",
                polls,
                elapsed,
                pair.open_order_ids().join(", ")
            )
        };
        self.ctx.record(JournalEntry::warn(
            StrategyKind::Oco,
            "OCO_TIMEOUT",
            pair.take_profit.symbol(),
            message,
        ));
        self.transition(OcoState::Failed);
        OcoOutcome::TimedOut { legs_canceled }
    }

    /// `None` for a leg already terminal.
    async fn query_open_leg(&self, handle: &OrderHandle) -> Result<Option<OrderUpdate>, QueryError> {
        if handle.is_terminal() {
            return Ok(None);
        }
        self.query_leg(handle).await.map(Some)
    }

    /// Retries only errors flagged retryable.
    async fn query_leg(&self, handle: &OrderHandle) -> Result<OrderUpdate, QueryError> {
        let policy = self.config.query_policy();
        let mut attempt = 0;
        loop {
            match self
                .ctx
                .gateway
                .status(&handle.exchange_order_id, handle.symbol())
                .await
            {
                Ok(update) => return Ok(update),
                Err(e) if e.retryable && policy.should_retry(attempt) => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        order_id = %handle.exchange_order_id,
                        attempt = attempt + 1,
                        delay = ?delay,
                        error = %e,
                        "status query failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn cancel_leg(&self, handle: &OrderHandle) -> Result<Cancelled, CancelError> {
        let policy = self.config.cancel_policy();
        let mut attempt = 0;
        loop {
            match self
                .ctx
                .gateway
                .cancel(&handle.exchange_order_id, handle.symbol())
                .await
            {
                Ok(()) => return Ok(Cancelled::Now),
                Err(e) if e.is_benign() => {
                    debug!(order_id = %handle.exchange_order_id, "cancel target already closed");
                    return Ok(Cancelled::AlreadyClosed);
                }
                Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        order_id = %handle.exchange_order_id,
                        attempt = attempt + 1,
                        delay = ?delay,
                        error = %e,
                        "cancel failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{collaborators, Call, ScriptedGateway};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    use order_core::OrderStatus::{Canceled, Expired, Filled, New, PartiallyFilled};

    fn plan() -> OcoPlan {
        OcoPlan::new("BTCUSDT", OrderSide::Sell, dec!(0.01), dec!(46000), dec!(44000))
    }

    fn config() -> OcoConfig {
        OcoConfig::default()
            .with_poll_interval(Duration::from_secs(5))
            .with_max_monitor_duration(Duration::from_secs(60))
            .with_retry_base_delay(Duration::from_millis(100))
    }

    fn gateway() -> ScriptedGateway {
        ScriptedGateway::new().with_ids(["A", "B"])
    }

    async fn run(gateway: ScriptedGateway, config: OcoConfig) -> (Arc<ScriptedGateway>, OcoReport, Arc<crate::MemoryJournal>) {
        let gateway = Arc::new(gateway);
        let (ctx, journal) = collaborators(gateway.clone());
        let (_tx, rx) = watch::channel(false);
        let report = OcoSupervisor::new(ctx, config).run(&plan(), rx).await.unwrap();
        (gateway, report, journal)
    }

    #[test]
    fn test_plan_legs() {
        let plan = plan();
        assert_eq!(plan.take_profit.order_type, order_core::OrderType::Limit);
        assert_eq!(plan.take_profit.price, Some(dec!(46000)));
        assert!(plan.take_profit.reduce_only);
        assert_eq!(plan.stop_loss.order_type, order_core::OrderType::StopMarket);
        assert_eq!(plan.stop_loss.stop_price, Some(dec!(44000)));
        assert!(plan.stop_loss.reduce_only);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_profit_fills_then_stop_loss_canceled() {
        let gw = gateway()
            .with_statuses("A", [New, Filled])
            .with_statuses("B", [New]);
        let (gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::TakeProfitFilled);
        assert_eq!(report.state, OcoState::Resolved);
        assert_eq!(report.pair.take_profit.status(), Filled);
        assert_eq!(report.pair.stop_loss.status(), Canceled);
        assert_eq!(report.pair.resolution, OcoResolution::TakeProfitFilled);
        assert_eq!(report.polls, 2);
        assert_eq!(report.elapsed, Duration::from_secs(5));
        assert_eq!(
            report.history,
            [
                OcoState::Placing,
                OcoState::Monitoring,
                OcoState::Resolving,
                OcoState::Resolved
            ]
        );
        assert!(report.check().is_ok());

        let calls = gateway.calls();
        assert!(matches!(&calls[0], Call::Place(r) if r.order_type == order_core::OrderType::Limit));
        assert!(matches!(&calls[1], Call::Place(r) if r.order_type == order_core::OrderType::StopMarket));
        assert_eq!(
            calls[2..],
            [
                Call::Status("A".into()),
                Call::Status("B".into()),
                Call::Status("A".into()),
                Call::Status("B".into()),
                Call::Cancel("B".into()),
            ]
        );
        assert_eq!(
            journal.actions(),
            ["OCO_ORDER_SUCCESS", "OCO_TAKE_PROFIT_EXECUTED"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_loss_fill_cancels_take_profit() {
        let gw = gateway()
            .with_statuses("A", [New])
            .with_statuses("B", [Filled]);
        let (gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::StopLossFilled);
        assert_eq!(report.pair.take_profit.status(), Canceled);
        assert_eq!(gateway.cancels(), ["A"]);
        assert!(journal.contains("OCO_STOP_LOSS_EXECUTED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_filled_in_one_round_is_not_success() {
        let gw = gateway()
            .with_statuses("A", [Filled])
            .with_statuses("B", [Filled]);
        let (gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::BothFilled);
        assert_eq!(report.state, OcoState::Failed);
        assert!(matches!(
            report.check(),
            Err(StrategyError::BothLegsFilled { .. })
        ));
        assert!(gateway.cancels().is_empty());
        assert!(journal.contains("OCO_BOTH_FILLED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_benign_cancel_reveals_second_fill() {
        let gw = gateway()
            .with_statuses("A", [Filled])
            .with_statuses("B", [New, Filled])
            .with_cancel_results("B", [Err(CancelError::AlreadyClosed("B".into()))]);
        let (_gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::BothFilled);
        assert_eq!(report.pair.stop_loss.status(), Filled);
        assert!(report.check().is_err());
        assert!(journal.contains("OCO_TAKE_PROFIT_EXECUTED"));
        assert!(journal.contains("OCO_BOTH_FILLED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_benign_cancel_after_expiry_resolves() {
        let gw = gateway()
            .with_statuses("A", [Filled])
            .with_statuses("B", [New, Expired])
            .with_cancel_results("B", [Err(CancelError::AlreadyClosed("B".into()))]);
        let (_gateway, report, _journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::TakeProfitFilled);
        assert_eq!(report.state, OcoState::Resolved);
        assert_eq!(report.pair.stop_loss.status(), Expired);
        assert!(report.cancel_failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_retried_then_succeeds() {
        let gw = gateway()
            .with_statuses("A", [New])
            .with_statuses("B", [Filled])
            .with_cancel_results("A", [Err(CancelError::failed("busy", true)), Ok(())]);
        let (gateway, report, _journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::StopLossFilled);
        assert_eq!(gateway.cancels(), ["A", "A"]);
        assert!(report.cancel_failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_failure_reported_but_fill_stands() {
        let gw = gateway()
            .with_statuses("A", [New])
            .with_statuses("B", [Filled])
            .with_cancel_results(
                "A",
                [
                    Err(CancelError::failed("busy", true)),
                    Err(CancelError::failed("busy", true)),
                ],
            );
        let (gateway, report, journal) = run(gw, config().with_retries(1)).await;

        assert_eq!(report.outcome, OcoOutcome::StopLossFilled);
        assert_eq!(gateway.cancels().len(), 2);
        assert!(report.cancel_failure.is_some());
        assert!(report.check().is_ok());
        assert!(journal.contains("OCO_CANCEL_FAILED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_wins_over_failed_query_of_other_leg() {
        let gw = gateway()
            .with_statuses("A", [Filled])
            .fail_queries("B", vec![QueryError::new("timeout", true); 4]);
        let (gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::TakeProfitFilled);
        assert_eq!(report.state, OcoState::Resolved);
        assert_eq!(report.polls, 1);
        assert_eq!(report.pair.stop_loss.status(), Canceled);
        assert_eq!(gateway.cancels(), ["B"]);
        assert!(report.check().is_ok());
        assert_eq!(
            journal.actions(),
            ["OCO_ORDER_SUCCESS", "OCO_TAKE_PROFIT_EXECUTED"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_loss_fill_wins_over_failed_take_profit_query() {
        let gw = gateway()
            .fail_queries("A", [QueryError::new("bad response", false)])
            .with_statuses("B", [Filled]);
        let (gateway, report, _journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::StopLossFilled);
        assert_eq!(report.pair.take_profit.status(), Canceled);
        assert_eq!(gateway.cancels(), ["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_query_not_retried() {
        let gw = gateway().fail_queries("A", [QueryError::new("unrecognised order status", false)]);
        let (gateway, report, journal) = run(gw, config()).await;

        assert!(matches!(report.outcome, OcoOutcome::QueryFailed(_)));
        let a_queries = gateway
            .calls()
            .into_iter()
            .filter(|c| *c == Call::Status("A".into()))
            .count();
        assert_eq!(a_queries, 1);
        assert!(gateway.cancels().is_empty());
        assert_eq!(journal.actions(), ["OCO_ORDER_SUCCESS", "OCO_ORDER_FAILED"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_cancel_not_retried() {
        let gw = gateway()
            .with_statuses("A", [New])
            .with_statuses("B", [Filled])
            .with_cancel_results("A", [Err(CancelError::failed("rejected", false)), Ok(())]);
        let (gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::StopLossFilled);
        assert_eq!(gateway.cancels(), ["A"]);
        assert_eq!(
            report.cancel_failure,
            Some(CancelError::failed("rejected", false))
        );
        assert_eq!(report.pair.open_order_ids(), ["A"]);
        assert!(journal.contains("OCO_CANCEL_FAILED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_leg_after_benign_cancel_is_journaled() {
        let gw = gateway()
            .with_statuses("A", [Filled])
            .with_reads(
                "B",
                [
                    Ok(OrderUpdate::new(New)),
                    Err(QueryError::new("bad response", false)),
                ],
            )
            .with_cancel_results("B", [Err(CancelError::AlreadyClosed("B".into()))]);
        let (_gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::TakeProfitFilled);
        assert_eq!(report.pair.open_order_ids(), ["B"]);
        let entry = journal
            .entries()
            .into_iter()
            .find(|e| e.action == "OCO_QUERY_FAILED")
            .unwrap();
        assert_eq!(entry.order_id.as_deref(), Some("B"));
        assert!(entry.message.contains("bad response"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_fill_of_canceled_leg_is_journaled() {
        let gw = gateway().with_statuses("A", [New, Filled]).with_reads(
            "B",
            [
                Ok(OrderUpdate::new(New)),
                Ok(OrderUpdate::new(PartiallyFilled).with_fill(dec!(0.004), Some(dec!(44000)))),
            ],
        );
        let (gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::TakeProfitFilled);
        assert_eq!(gateway.cancels(), ["B"]);
        assert_eq!(report.pair.stop_loss.status(), Canceled);
        assert_eq!(report.pair.stop_loss.filled_qty, dec!(0.004));
        assert_eq!(
            journal.actions(),
            ["OCO_ORDER_SUCCESS", "OCO_TAKE_PROFIT_EXECUTED", "OCO_PARTIAL_FILL"]
        );
        let entry = journal.entries().pop().unwrap();
        assert_eq!(entry.order_id.as_deref(), Some("B"));
        assert!(entry.message.contains("stop-loss leg partially filled 0.004 of 0.01"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_loss_placement_failure_rolls_back() {
        let gw = gateway().fail_place(1, OrderSubmissionError::rejected("Margin is insufficient."));
        let gateway = Arc::new(gw);
        let (ctx, journal) = collaborators(gateway.clone());
        let (_tx, rx) = watch::channel(false);

        let err = OcoSupervisor::new(ctx, config())
            .run(&plan(), rx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StrategyError::LegPlacement {
                leg: OcoLeg::StopLoss,
                rolled_back: true,
                ..
            }
        ));
        assert_eq!(gateway.cancels(), ["A"]);
        assert_eq!(journal.actions(), ["OCO_ORDER_FAILED"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rollback_is_reported() {
        let gw = gateway()
            .fail_place(1, OrderSubmissionError::rejected("rejected"))
            .with_cancel_results(
                "A",
                [
                    Err(CancelError::failed("down", true)),
                    Err(CancelError::failed("down", true)),
                ],
            );
        let gateway = Arc::new(gw);
        let (ctx, _journal) = collaborators(gateway.clone());
        let (_tx, rx) = watch::channel(false);

        let err = OcoSupervisor::new(ctx, config().with_retries(1))
            .run(&plan(), rx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StrategyError::LegPlacement {
                rolled_back: false,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_profit_placement_failure_places_nothing_else() {
        let gw = gateway().fail_place(0, OrderSubmissionError::network("timeout"));
        let gateway = Arc::new(gw);
        let (ctx, _journal) = collaborators(gateway.clone());
        let (_tx, rx) = watch::channel(false);

        let err = OcoSupervisor::new(ctx, config())
            .run(&plan(), rx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StrategyError::LegPlacement {
                leg: OcoLeg::TakeProfit,
                ..
            }
        ));
        assert_eq!(gateway.placed().len(), 1);
        assert!(gateway.cancels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_legs_open() {
        let config = config().with_max_monitor_duration(Duration::from_secs(12));
        let (gateway, report, journal) = run(gateway(), config).await;

        assert_eq!(report.outcome, OcoOutcome::TimedOut { legs_canceled: false });
        assert_eq!(report.polls, 3);
        assert_eq!(report.elapsed, Duration::from_secs(10));
        assert_eq!(report.pair.open_order_ids(), ["A", "B"]);
        assert!(gateway.cancels().is_empty());
        assert!(journal.contains("OCO_TIMEOUT"));

        let err = report.check().unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_both_when_configured() {
        let config = config()
            .with_max_polls(2)
            .with_timeout_policy(TimeoutPolicy::CancelBoth);
        let (gateway, report, _journal) = run(gateway(), config).await;

        assert_eq!(report.outcome, OcoOutcome::TimedOut { legs_canceled: true });
        assert_eq!(report.polls, 2);
        assert_eq!(gateway.cancels(), ["A", "B"]);
        assert_eq!(report.pair.take_profit.status(), Canceled);
        assert_eq!(report.pair.stop_loss.status(), Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_only_confirmed_cancels() {
        let config = config()
            .with_max_polls(1)
            .with_retries(0)
            .with_timeout_policy(TimeoutPolicy::CancelBoth);
        // A reports closed but still reads NEW
        let gw = gateway()
            .with_statuses("A", [New])
            .with_cancel_results("A", [Err(CancelError::AlreadyClosed("A".into()))]);
        let (gateway, report, journal) = run(gw, config).await;

        assert_eq!(report.outcome, OcoOutcome::TimedOut { legs_canceled: false });
        assert_eq!(gateway.cancels(), ["A", "B"]);
        assert_eq!(report.pair.take_profit.status(), New);
        assert_eq!(report.pair.stop_loss.status(), Canceled);
        assert_eq!(report.pair.open_order_ids(), ["A"]);
        assert_eq!(report.pair.resolution, OcoResolution::Pending);

        let entry = journal.entries().pop().unwrap();
        assert_eq!(entry.action, "OCO_TIMEOUT");
        assert!(entry.message.contains("open orders: A"));
        assert!(!entry.message.contains("both legs canceled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_unreadable_leg_reports_it_open() {
        let config = config()
            .with_max_polls(1)
            .with_retries(0)
            .with_timeout_policy(TimeoutPolicy::CancelBoth);
        let gw = gateway()
            .with_reads(
                "A",
                [
                    Ok(OrderUpdate::new(New)),
                    Err(QueryError::new("timeout", true)),
                ],
            )
            .with_cancel_results("A", [Err(CancelError::AlreadyClosed("A".into()))]);
        let (_gateway, report, journal) = run(gw, config).await;

        assert_eq!(report.outcome, OcoOutcome::TimedOut { legs_canceled: false });
        assert_eq!(report.pair.open_order_ids(), ["A"]);
        assert_eq!(
            journal.actions(),
            ["OCO_ORDER_SUCCESS", "OCO_QUERY_FAILED", "OCO_TIMEOUT"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_closed_without_fill() {
        let gw = gateway()
            .with_statuses("A", [Canceled])
            .with_statuses("B", [Expired]);
        let (_gateway, report, journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::NoExecution);
        assert_eq!(report.state, OcoState::Failed);
        assert!(matches!(report.check(), Err(StrategyError::NoExecution)));
        assert!(journal.contains("OCO_ORDER_FAILED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_leg_not_requeried() {
        let gw = gateway()
            .with_statuses("A", [Canceled])
            .with_statuses("B", [New, New, Filled]);
        let (gateway, report, _journal) = run(gw, config()).await;

        assert_eq!(report.outcome, OcoOutcome::StopLossFilled);
        assert_eq!(report.polls, 3);
        let a_queries = gateway
            .calls()
            .into_iter()
            .filter(|c| *c == Call::Status("A".into()))
            .count();
        assert_eq!(a_queries, 1);
        assert!(gateway.cancels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_retry_then_exhaustion() {
        let gw = gateway()
            .with_statuses("A", [Filled])
            .fail_queries("A", [QueryError::new("timeout", true)]);
        let (_gateway, report, _journal) = run(gw, config()).await;
        assert_eq!(report.outcome, OcoOutcome::TakeProfitFilled);

        let gw = gateway().fail_queries(
            "A",
            [
                QueryError::new("timeout", true),
                QueryError::new("timeout", true),
            ],
        );
        let (_gateway, report, journal) = run(gw, config().with_retries(1)).await;
        assert!(matches!(report.outcome, OcoOutcome::QueryFailed(_)));
        assert_eq!(report.state, OcoState::Failed);
        assert!(matches!(report.check(), Err(StrategyError::Query(_))));
        assert!(journal.contains("OCO_ORDER_FAILED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_supervision() {
        let gateway = Arc::new(gateway());
        let (ctx, journal) = collaborators(gateway.clone());
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            let _ = tx.send(true);
        });

        let report = OcoSupervisor::new(ctx, config())
            .run(&plan(), rx)
            .await
            .unwrap();

        assert_eq!(report.outcome, OcoOutcome::Interrupted);
        assert_eq!(report.polls, 2);
        assert_eq!(report.pair.resolution, OcoResolution::Pending);
        assert!(gateway.cancels().is_empty());
        assert_eq!(report.check().unwrap_err().exit_code(), 130);
        assert!(journal.contains("OCO_INTERRUPTED"));
    }

    #[tokio::test]
    async fn test_validate_against_market() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (ctx, _journal) = collaborators(gateway.clone());
        let supervisor = OcoSupervisor::new(ctx, config());

        assert!(supervisor.validate(&plan(), Some(dec!(45000))).await.is_ok());
        let err = supervisor
            .validate(&plan(), Some(dec!(46500)))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        // 0.001 * 44000 = 44 < 100
        let small = OcoPlan::new("BTCUSDT", OrderSide::Sell, dec!(0.001), dec!(46000), dec!(44000));
        assert!(supervisor.validate(&small, None).await.is_err());
        assert!(gateway.calls().is_empty());
    }
}
