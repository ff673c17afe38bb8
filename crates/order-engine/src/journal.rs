//! Order journal: the audit trail every strategy writes to.
//!
//! Recording is fire-and-forget; strategies never branch on it.

use std::fmt;

use order_core::now_ms;
use parking_lot::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalLevel {
    Info,
    Warn,
    Error,
}

/// The strategy an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Market,
    Limit,
    StopLimit,
    Oco,
    Twap,
    Grid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::StopLimit => "stop-limit",
            Self::Oco => "oco",
            Self::Twap => "twap",
            Self::Grid => "grid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub timestamp_ms: i64,
    pub level: JournalLevel,
    /// Upper snake case event name, e.g. `OCO_STOP_LOSS_EXECUTED`.
    pub action: &'static str,
    pub message: String,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub order_id: Option<String>,
}

impl JournalEntry {
    pub fn new(
        level: JournalLevel,
        strategy: StrategyKind,
        action: &'static str,
        symbol: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms: now_ms(),
            level,
            action,
            message: message.into(),
            symbol: symbol.into(),
            strategy,
            order_id: None,
        }
    }

    pub fn info(
        strategy: StrategyKind,
        action: &'static str,
        symbol: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(JournalLevel::Info, strategy, action, symbol, message)
    }

    pub fn warn(
        strategy: StrategyKind,
        action: &'static str,
        symbol: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(JournalLevel::Warn, strategy, action, symbol, message)
    }

    pub fn error(
        strategy: StrategyKind,
        action: &'static str,
        symbol: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(JournalLevel::Error, strategy, action, symbol, message)
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }
}

/// Sink for journal entries.
pub trait OrderJournal: Send + Sync {
    fn record(&self, entry: JournalEntry);
}

/// Journal that emits each entry as a `tracing` event with target `orders`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingJournal;

impl OrderJournal for TracingJournal {
    fn record(&self, entry: JournalEntry) {
        let order_id = entry.order_id.as_deref().unwrap_or("-");
        match entry.level {
            JournalLevel::Info => info!(
                target: "orders",
                action = entry.action,
                strategy = %entry.strategy,
                symbol = %entry.symbol,
                order_id = %order_id,
                ts = entry.timestamp_ms,
                "{}", entry.message
            ),
            JournalLevel::Warn => warn!(
                target: "orders",
                action = entry.action,
                strategy = %entry.strategy,
                symbol = %entry.symbol,
                order_id = %order_id,
                ts = entry.timestamp_ms,
                "{}", entry.message
            ),
            JournalLevel::Error => error!(
                target: "orders",
                action = entry.action,
                strategy = %entry.strategy,
                symbol = %entry.symbol,
                order_id = %order_id,
                ts = entry.timestamp_ms,
                "{}", entry.message
            ),
        }
    }
}

/// In-memory journal, mainly for asserting on what was recorded.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.entries.lock().iter().map(|e| e.action).collect()
    }

    pub fn contains(&self, action: &str) -> bool {
        self.entries.lock().iter().any(|e| e.action == action)
    }

    pub fn count(&self, action: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.action == action).count()
    }
}

impl OrderJournal for MemoryJournal {
    fn record(&self, entry: JournalEntry) {
        self.entries.lock().push(entry);
    }
}
