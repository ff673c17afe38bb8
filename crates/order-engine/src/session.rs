//! Command dispatch: one command in, one validated plan out, then either
//! the plan itself (dry run) or the result of executing it.

use std::time::Duration;

use order_core::{OrderHandle, OrderRequest, OrderSide, OrderType, TimeInForce};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::context::Collaborators;
use crate::error::StrategyError;
use crate::grid::{GridPlacer, GridPlan, GridReport};
use crate::journal::{JournalEntry, StrategyKind};
use crate::oco::{OcoPlan, OcoReport, OcoSupervisor};
use crate::placer::SingleOrderPlacer;
use crate::stop_limit::StopLimitStrategy;
use crate::twap::{TwapPlan, TwapReport, TwapScheduler};
use crate::validation::normalize_symbol;

/// One strategy invocation with its raw parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Market {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    },
    Limit {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        reduce_only: bool,
        time_in_force: Option<TimeInForce>,
    },
    StopLimit {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    },
    Oco {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        take_profit: Decimal,
        stop_loss: Decimal,
    },
    Twap {
        symbol: String,
        side: OrderSide,
        total_quantity: Decimal,
        slices: u32,
        duration: Duration,
        /// Rest each slice as a limit order at this price.
        limit_price: Option<Decimal>,
    },
    Grid {
        symbol: String,
        lower_price: Decimal,
        upper_price: Decimal,
        levels: u32,
        quantity_per_level: Decimal,
        /// Splits buys from sells; defaults to the market price.
        midpoint: Option<Decimal>,
    },
}

impl Command {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Market { symbol, .. }
            | Self::Limit { symbol, .. }
            | Self::StopLimit { symbol, .. }
            | Self::Oco { symbol, .. }
            | Self::Twap { symbol, .. }
            | Self::Grid { symbol, .. } => symbol,
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        match self {
            Self::Market { .. } => StrategyKind::Market,
            Self::Limit { .. } => StrategyKind::Limit,
            Self::StopLimit { .. } => StrategyKind::StopLimit,
            Self::Oco { .. } => StrategyKind::Oco,
            Self::Twap { .. } => StrategyKind::Twap,
            Self::Grid { .. } => StrategyKind::Grid,
        }
    }

    fn failed_action(&self) -> &'static str {
        match self {
            Self::Market { .. } => "MARKET_ORDER_FAILED",
            Self::Limit { .. } => "LIMIT_ORDER_FAILED",
            Self::StopLimit { .. } => "STOP_LIMIT_ORDER_FAILED",
            Self::Oco { .. } => "OCO_ORDER_FAILED",
            Self::Twap { .. } => "TWAP_STRATEGY_FAILED",
            Self::Grid { .. } => "GRID_STRATEGY_FAILED",
        }
    }
}

/// Validated, fully computed orders for one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Single(OrderRequest),
    Oco(OcoPlan),
    Twap(TwapPlan),
    Grid(GridPlan),
}

#[derive(Debug)]
pub enum Outcome {
    DryRun(Plan),
    Placed(OrderHandle),
    Oco(OcoReport),
    Twap(TwapReport),
    Grid(GridReport),
}

impl Outcome {
    /// Batch strategies succeed whenever the plan ran, whatever happened to
    /// individual items. An OCO succeeds only with exactly one leg filled.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DryRun(_) | Self::Placed(_) => 0,
            Self::Oco(report) => report.check().map_or_else(|e| e.exit_code(), |()| 0),
            Self::Twap(report) if report.interrupted => StrategyError::Interrupted.exit_code(),
            Self::Grid(report) if report.interrupted => StrategyError::Interrupted.exit_code(),
            Self::Twap(_) | Self::Grid(_) => 0,
        }
    }
}

pub struct Session {
    ctx: Collaborators,
    config: EngineConfig,
    dry_run: bool,
}

impl Session {
    pub fn new(ctx: Collaborators, config: EngineConfig) -> Self {
        Self {
            ctx,
            config,
            dry_run: false,
        }
    }

    /// In dry-run mode nothing is placed or canceled; read-only market data
    /// may still be fetched.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validate `command` and compute its orders. Identical in dry-run and
    /// live mode whenever the market price can be read.
    pub async fn plan(&self, command: &Command) -> Result<Plan, StrategyError> {
        match self.build_plan(command).await {
            Ok(plan) => Ok(plan),
            Err(e) => {
                warn!(strategy = %command.strategy(), symbol = %command.symbol(), error = %e, "command rejected");
                self.ctx.record(JournalEntry::error(
                    command.strategy(),
                    command.failed_action(),
                    command.symbol(),
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    pub async fn run(
        &self,
        command: &Command,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Outcome, StrategyError> {
        let plan = self.plan(command).await?;
        if self.dry_run {
            info!(strategy = %command.strategy(), "dry run: plan validated, nothing submitted");
            return Ok(Outcome::DryRun(plan));
        }

        match plan {
            Plan::Single(request) if request.order_type == OrderType::Stop => {
                let handle = StopLimitStrategy::new(self.ctx.clone())
                    .execute(&request)
                    .await?;
                Ok(Outcome::Placed(handle))
            }
            Plan::Single(request) => {
                let handle = SingleOrderPlacer::new(self.ctx.clone())
                    .place(&request, None)
                    .await?;
                Ok(Outcome::Placed(handle))
            }
            Plan::Oco(plan) => {
                let report = OcoSupervisor::new(self.ctx.clone(), self.config.oco.clone())
                    .run(&plan, shutdown)
                    .await?;
                Ok(Outcome::Oco(report))
            }
            Plan::Twap(plan) => {
                let report = TwapScheduler::new(self.ctx.clone(), self.config.twap)
                    .execute(&plan, shutdown)
                    .await;
                Ok(Outcome::Twap(report))
            }
            Plan::Grid(plan) => {
                let report = GridPlacer::new(self.ctx.clone(), self.config.grid)
                    .execute(&plan, shutdown)
                    .await;
                Ok(Outcome::Grid(report))
            }
        }
    }

    async fn build_plan(&self, command: &Command) -> Result<Plan, StrategyError> {
        let symbol = normalize_symbol(command.symbol())?;

        match command {
            Command::Market {
                side,
                quantity,
                reduce_only,
                ..
            } => {
                let mut request = OrderRequest::market(symbol.as_str(), *side, *quantity);
                if *reduce_only {
                    request = request.reduce_only();
                }
                let reference = self.market_price(&symbol).await;
                SingleOrderPlacer::new(self.ctx.clone())
                    .validate(&request, reference)
                    .await?;
                Ok(Plan::Single(request))
            }
            Command::Limit {
                side,
                quantity,
                price,
                reduce_only,
                time_in_force,
                ..
            } => {
                let mut request = OrderRequest::limit(symbol.as_str(), *side, *quantity, *price);
                if *reduce_only {
                    request = request.reduce_only();
                }
                if let Some(tif) = time_in_force {
                    request = request.with_time_in_force(*tif);
                }
                SingleOrderPlacer::new(self.ctx.clone())
                    .validate(&request, None)
                    .await?;
                Ok(Plan::Single(request))
            }
            Command::StopLimit {
                side,
                quantity,
                stop_price,
                limit_price,
                ..
            } => {
                let request = StopLimitStrategy::request(
                    symbol.as_str(),
                    *side,
                    *quantity,
                    *stop_price,
                    *limit_price,
                );
                StopLimitStrategy::new(self.ctx.clone())
                    .validate(&request)
                    .await?;
                Ok(Plan::Single(request))
            }
            Command::Oco {
                side,
                quantity,
                take_profit,
                stop_loss,
                ..
            } => {
                let plan = OcoPlan::new(symbol.as_str(), *side, *quantity, *take_profit, *stop_loss);
                let market = self.market_price(&symbol).await;
                OcoSupervisor::new(self.ctx.clone(), self.config.oco.clone())
                    .validate(&plan, market)
                    .await?;
                Ok(Plan::Oco(plan))
            }
            Command::Twap {
                side,
                total_quantity,
                slices,
                duration,
                limit_price,
                ..
            } => {
                let reference = self.market_price(&symbol).await;
                let plan = TwapScheduler::new(self.ctx.clone(), self.config.twap)
                    .with_limit_price(*limit_price)
                    .plan(&symbol, *side, *total_quantity, *slices, *duration, reference)
                    .await?;
                Ok(Plan::Twap(plan))
            }
            Command::Grid {
                lower_price,
                upper_price,
                levels,
                quantity_per_level,
                midpoint,
                ..
            } => {
                let reference = match midpoint {
                    Some(midpoint) => *midpoint,
                    None => self.grid_reference(&symbol, *lower_price, *upper_price).await?,
                };
                let plan = GridPlacer::new(self.ctx.clone(), self.config.grid)
                    .plan(
                        &symbol,
                        *lower_price,
                        *upper_price,
                        *levels,
                        *quantity_per_level,
                        reference,
                    )
                    .await?;
                Ok(Plan::Grid(plan))
            }
        }
    }

    /// Market price for a grid without an explicit midpoint. A dry run that
    /// cannot read it plans around the middle of the range instead.
    async fn grid_reference(
        &self,
        symbol: &str,
        lower_price: Decimal,
        upper_price: Decimal,
    ) -> Result<Decimal, StrategyError> {
        match self.ctx.gateway.ticker_price(symbol).await {
            Ok(price) => Ok(price),
            Err(e) if self.dry_run => {
                let middle = (lower_price + upper_price) / Decimal::TWO;
                warn!(symbol = %symbol, error = %e, reference = %middle, "market price unavailable, using middle of the grid range");
                Ok(middle)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn market_price(&self, symbol: &str) -> Option<Decimal> {
        match self.ctx.gateway.ticker_price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "market price unavailable, skipping market checks");
                None
            }
        }
    }
}
