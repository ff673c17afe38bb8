//! Order validation and supervised order strategies.
//!
//! Every strategy receives its exchange access through [`Collaborators`]:
//! an [`order_core::OrderGateway`], a [`order_core::SymbolFilters`] source
//! and an [`OrderJournal`]. Nothing here talks to the network directly.
//!
//! - [`SingleOrderPlacer`]: one market or limit order, no retry
//! - [`StopLimitStrategy`]: one conditional order, immediate triggers surfaced
//! - [`OcoSupervisor`]: take-profit and stop-loss pair, polled until one fills
//! - [`TwapScheduler`]: equal market or limit slices on a fixed schedule
//! - [`GridPlacer`]: a ladder of limit orders placed in one batch
//!
//! [`Session`] maps a [`Command`] to a dry-run plan or a live execution.

mod config;
mod context;
mod error;
mod grid;
mod journal;
mod oco;
mod placer;
mod schedule;
mod session;
mod stop_limit;
mod twap;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use config::{EngineConfig, GridLimits, OcoConfig, TimeoutPolicy, TwapLimits};
pub use context::Collaborators;
pub use error::{OcoLeg, StrategyError, ValidationError};
pub use grid::{GridLevel, GridPlacement, GridPlacer, GridPlan, GridReport, PlacementError};
pub use journal::{
    JournalEntry, JournalLevel, MemoryJournal, OrderJournal, StrategyKind, TracingJournal,
};
pub use oco::{OcoOutcome, OcoPair, OcoPlan, OcoReport, OcoResolution, OcoState, OcoSupervisor};
pub use placer::SingleOrderPlacer;
pub use session::{Command, Outcome, Plan, Session};
pub use stop_limit::StopLimitStrategy;
pub use twap::{BatchStatus, SliceResult, TwapPlan, TwapReport, TwapScheduler, TwapSlice};
