//! Engine configuration.
//!
//! Defaults are safe for interactive use; `from_env` lets the operator tune
//! OCO supervision without recompiling, and CLI flags override both.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use common::RetryPolicy;

/// What to do with both OCO legs when monitoring times out without a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Leave both legs resting on the exchange.
    #[default]
    LeaveOpen,
    /// Cancel both legs before returning.
    CancelBoth,
}

impl FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "leave" | "leave-open" | "leave_open" => Ok(Self::LeaveOpen),
            "cancel" | "cancel-both" | "cancel_both" => Ok(Self::CancelBoth),
            other => Err(format!(
                "invalid timeout policy '{}', expected 'leave' or 'cancel'",
                other
            )),
        }
    }
}

impl fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeaveOpen => write!(f, "leave"),
            Self::CancelBoth => write!(f, "cancel"),
        }
    }
}

/// OCO supervision settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoConfig {
    /// Time between status rounds.
    pub poll_interval: Duration,
    /// Total monitoring budget measured from the end of placement.
    pub max_monitor_duration: Duration,
    /// Optional cap on status rounds, checked alongside the duration.
    pub max_polls: Option<u32>,
    pub timeout_policy: TimeoutPolicy,
    /// Extra attempts for a cancel that fails with a retryable error.
    pub cancel_retries: u32,
    /// Extra attempts for a status query that fails with a retryable error.
    pub query_retries: u32,
    /// First retry delay; doubles on each further attempt.
    pub retry_base_delay: Duration,
}

impl Default for OcoConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_monitor_duration: Duration::from_secs(3600),
            max_polls: None,
            timeout_policy: TimeoutPolicy::LeaveOpen,
            cancel_retries: 3,
            query_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl OcoConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_monitor_duration(mut self, duration: Duration) -> Self {
        self.max_monitor_duration = duration;
        self
    }

    pub fn with_max_polls(mut self, polls: u32) -> Self {
        self.max_polls = Some(polls);
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Sets both cancel and query retry budgets.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.cancel_retries = retries;
        self.query_retries = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub(crate) fn cancel_policy(&self) -> RetryPolicy {
        RetryPolicy::deterministic(self.cancel_retries, self.retry_base_delay)
    }

    pub(crate) fn query_policy(&self) -> RetryPolicy {
        RetryPolicy::deterministic(self.query_retries, self.retry_base_delay)
    }
}

/// TWAP bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwapLimits {
    pub max_slices: u32,
}

impl Default for TwapLimits {
    fn default() -> Self {
        Self { max_slices: 100 }
    }
}

/// Grid bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLimits {
    pub max_levels: u32,
}

impl Default for GridLimits {
    fn default() -> Self {
        Self { max_levels: 50 }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub oco: OcoConfig,
    pub twap: TwapLimits,
    pub grid: GridLimits,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `OCO_POLL_INTERVAL_SECS`, `OCO_MAX_MONITOR_SECS`,
    /// `OCO_TIMEOUT_POLICY` and `MAX_RETRY_ATTEMPTS`. Unparseable values are
    /// logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>(&lookup, "OCO_POLL_INTERVAL_SECS") {
            if secs > 0 {
                config.oco.poll_interval = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "OCO_MAX_MONITOR_SECS") {
            config.oco.max_monitor_duration = Duration::from_secs(secs);
        }
        if let Some(policy) = parse_var::<TimeoutPolicy>(&lookup, "OCO_TIMEOUT_POLICY") {
            config.oco.timeout_policy = policy;
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "MAX_RETRY_ATTEMPTS") {
            config.oco = config.oco.with_retries(retries);
        }
        config
    }

    pub fn with_oco(mut self, oco: OcoConfig) -> Self {
        self.oco = oco;
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
