//! USDT-M futures environment selection.
//!
//! The bot defaults to the futures testnet; production must be requested
//! explicitly.

use std::fmt;
use std::str::FromStr;

/// Which futures venue to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FuturesEnvironment {
    /// Production futures (real funds).
    Production,
    /// Futures testnet.
    #[default]
    Testnet,
}

impl FuturesEnvironment {
    /// REST API base URL.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://fapi.binance.com",
            Self::Testnet => "https://testnet.binancefuture.com",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_testnet(&self) -> bool {
        matches!(self, Self::Testnet)
    }

    /// Resolve from the process environment.
    ///
    /// `BINANCE_ENVIRONMENT` wins when it parses. Otherwise `USE_TESTNET`
    /// is consulted (`false`/`0`/`no` select production). Anything else
    /// yields the testnet.
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var("BINANCE_ENVIRONMENT").ok().as_deref(),
            std::env::var("USE_TESTNET").ok().as_deref(),
        )
    }

    fn resolve(environment: Option<&str>, use_testnet: Option<&str>) -> Self {
        if let Some(env) = environment.and_then(|s| s.parse().ok()) {
            return env;
        }
        match use_testnet.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("false") | Some("0") | Some("no") => Self::Production,
            _ => Self::Testnet,
        }
    }
}

impl fmt::Display for FuturesEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for FuturesEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" | "mainnet" | "main" => Ok(Self::Production),
            "testnet" | "test" | "sandbox" => Ok(Self::Testnet),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Error parsing environment string.
#[derive(Debug, Clone)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment '{}', expected 'production' or 'testnet'",
            self.0
        )
    }
}

impl std::error::Error for ParseEnvironmentError {}
