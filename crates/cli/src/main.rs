mod output;

use clap::{Parser, Subcommand};
use common::{init_logging, FuturesEnvironment, LogConfig, RetryPolicy};
use futures_rest::{ApiCredentials, FuturesGateway, FuturesRestClient, FuturesRestError};
use order_core::{FallbackSymbolFilters, OrderSide, StaticSymbolFilters, TimeInForce};
use order_engine::{
    Collaborators, Command, EngineConfig, Session, StrategyError, TimeoutPolicy, TracingJournal,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "futures-bot", author, version, about = "Place and supervise Binance USDT-M futures orders", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Validate and print the orders without submitting anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Console and file log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    /// Append-only log file; pass an empty string to disable
    #[arg(long, global = true, default_value = "bot.log")]
    log_file: String,

    /// What to do with open OCO legs when monitoring times out: leave | cancel
    #[arg(long, global = true)]
    on_timeout: Option<TimeoutPolicy>,

    /// Seconds between OCO status polls
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: Option<u64>,

    /// Maximum seconds an OCO pair is monitored
    #[arg(long, global = true)]
    monitor_time: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Place a market order
    Market {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        #[arg(long)]
        reduce_only: bool,
    },
    /// Place a limit order
    Limit {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        #[arg(long)]
        reduce_only: bool,
        /// GTC | IOC | FOK | GTX
        #[arg(long)]
        tif: Option<TimeInForce>,
    },
    /// Place a stop-limit order: a limit order armed at the stop price
    StopLimit {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    },
    /// Place a take-profit / stop-loss pair and cancel one when the other fills
    Oco {
        symbol: String,
        /// Side of the position being closed
        side: OrderSide,
        quantity: Decimal,
        take_profit: Decimal,
        stop_loss: Decimal,
    },
    /// Split an order into evenly spaced market slices, or limit slices with --limit-price
    Twap {
        symbol: String,
        side: OrderSide,
        total_quantity: Decimal,
        slices: u32,
        /// Total duration in seconds
        duration: u64,
        /// Place each slice as a GTC limit order at this price
        #[arg(long)]
        limit_price: Option<Decimal>,
    },
    /// Place limit orders on evenly spaced price levels
    Grid {
        symbol: String,
        lower_price: Decimal,
        upper_price: Decimal,
        levels: u32,
        quantity_per_level: Decimal,
        /// Price separating buy levels from sell levels (defaults to market)
        #[arg(long)]
        midpoint: Option<Decimal>,
    },
}

impl Commands {
    fn into_command(self) -> Command {
        match self {
            Self::Market {
                symbol,
                side,
                quantity,
                reduce_only,
            } => Command::Market {
                symbol,
                side,
                quantity,
                reduce_only,
            },
            Self::Limit {
                symbol,
                side,
                quantity,
                price,
                reduce_only,
                tif,
            } => Command::Limit {
                symbol,
                side,
                quantity,
                price,
                reduce_only,
                time_in_force: tif,
            },
            Self::StopLimit {
                symbol,
                side,
                quantity,
                stop_price,
                limit_price,
            } => Command::StopLimit {
                symbol,
                side,
                quantity,
                stop_price,
                limit_price,
            },
            Self::Oco {
                symbol,
                side,
                quantity,
                take_profit,
                stop_loss,
            } => Command::Oco {
                symbol,
                side,
                quantity,
                take_profit,
                stop_loss,
            },
            Self::Twap {
                symbol,
                side,
                total_quantity,
                slices,
                duration,
                limit_price,
            } => Command::Twap {
                symbol,
                side,
                total_quantity,
                slices,
                duration: Duration::from_secs(duration),
                limit_price,
            },
            Self::Grid {
                symbol,
                lower_price,
                upper_price,
                levels,
                quantity_per_level,
                midpoint,
            } => Command::Grid {
                symbol,
                lower_price,
                upper_price,
                levels,
                quantity_per_level,
                midpoint,
            },
        }
    }
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let file = Some(self.log_file.trim())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        LogConfig::default()
            .with_level(self.log_level)
            .with_file(file)
    }

    /// Environment settings with command-line flags layered on top.
    fn engine_config(&self, base: EngineConfig) -> EngineConfig {
        let mut oco = base.oco.clone();
        if let Some(policy) = self.on_timeout {
            oco = oco.with_timeout_policy(policy);
        }
        if let Some(secs) = self.poll_interval {
            oco = oco.with_poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.monitor_time {
            oco = oco.with_max_monitor_duration(Duration::from_secs(secs));
        }
        base.with_oco(oco)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_config()) {
        eprintln!("error: cannot open log file {}: {}", cli.log_file, e);
        return ExitCode::from(1);
    }

    let environment = FuturesEnvironment::from_env();
    let config = cli.engine_config(EngineConfig::from_env());
    let command = cli.command.into_command();

    info!(
        environment = %environment,
        strategy = %command.strategy(),
        symbol = %command.symbol(),
        dry_run = cli.dry_run,
        "Starting futures order bot"
    );

    let ctx = match connect(environment, cli.dry_run, metadata_retry(&config)).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "exchange client setup failed");
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping");
            let _ = shutdown_tx.send(true);
        }
    });

    let session = Session::new(ctx, config).with_dry_run(cli.dry_run);
    let code = match session.run(&command, shutdown_rx).await {
        Ok(outcome) => {
            output::print_outcome(&outcome);
            outcome.exit_code()
        }
        Err(e) => {
            print_failure(&e);
            e.exit_code()
        }
    };

    info!(exit_code = code, "Finished");
    ExitCode::from(code)
}

/// Exchange metadata requests share the OCO query retry budget.
fn metadata_retry(config: &EngineConfig) -> RetryPolicy {
    RetryPolicy::default().with_max_retries(config.oco.query_retries)
}

/// Builds the collaborators for this run. Dry runs use the public client
/// only and fall back to built-in filters when the exchange is unreachable.
async fn connect(
    environment: FuturesEnvironment,
    dry_run: bool,
    retry: RetryPolicy,
) -> Result<Collaborators, FuturesRestError> {
    let journal = Arc::new(TracingJournal);

    if dry_run {
        let gateway = Arc::new(
            FuturesGateway::new(FuturesRestClient::public(environment)?).with_retry_policy(retry),
        );
        let filters =
            FallbackSymbolFilters::new(gateway.clone(), StaticSymbolFilters::futures_defaults());
        return Ok(Collaborators::new(gateway, Arc::new(filters), journal));
    }

    let credentials = ApiCredentials::from_env()?;
    let client = FuturesRestClient::with_credentials(credentials, environment)?;
    if let Err(e) = client.sync_time().await {
        warn!(error = %e, "server time sync failed, signing with local clock");
    }
    let gateway = Arc::new(FuturesGateway::new(client).with_retry_policy(retry));
    Ok(Collaborators::new(gateway.clone(), gateway, journal))
}

fn print_failure(e: &StrategyError) {
    eprintln!("error: {}", e);
    if e.is_validation() {
        eprintln!("nothing was submitted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_engine::OcoConfig;
    use rust_decimal_macros::dec;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("futures-bot").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_limit_command() {
        let cli = parse(&["limit", "BTCUSDT", "BUY", "0.01", "45000", "--tif", "IOC", "--dry-run"]);
        assert!(cli.dry_run);
        assert_eq!(
            cli.command.into_command(),
            Command::Limit {
                symbol: "BTCUSDT".into(),
                side: OrderSide::Buy,
                quantity: dec!(0.01),
                price: dec!(45000),
                reduce_only: false,
                time_in_force: Some(TimeInForce::IOC),
            }
        );
    }

    #[test]
    fn test_twap_duration_in_seconds() {
        let cli = parse(&["twap", "ETHUSDT", "sell", "1.5", "5", "300"]);
        match cli.command.into_command() {
            Command::Twap {
                side,
                slices,
                duration,
                limit_price,
                ..
            } => {
                assert_eq!(side, OrderSide::Sell);
                assert_eq!(slices, 5);
                assert_eq!(duration, Duration::from_secs(300));
                assert_eq!(limit_price, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_twap_limit_price_flag() {
        let cli = parse(&["twap", "ETHUSDT", "BUY", "1", "4", "120", "--limit-price", "2450.5"]);
        match cli.command.into_command() {
            Command::Twap { limit_price, .. } => assert_eq!(limit_price, Some(dec!(2450.5))),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_metadata_retry_follows_query_retries() {
        let config = EngineConfig::new().with_oco(OcoConfig::default().with_retries(7));
        assert_eq!(metadata_retry(&config).max_retries(), 7);
    }

    #[test]
    fn test_grid_midpoint_flag() {
        let cli = parse(&["grid", "BTCUSDT", "44000", "46000", "5", "0.01", "--midpoint", "45000"]);
        match cli.command.into_command() {
            Command::Grid { midpoint, levels, .. } => {
                assert_eq!(midpoint, Some(dec!(45000)));
                assert_eq!(levels, 5);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_invalid_side_rejected() {
        let result = Cli::try_parse_from(["futures-bot", "market", "BTCUSDT", "HOLD", "0.01"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = Cli::try_parse_from([
            "futures-bot", "oco", "BTCUSDT", "BUY", "0.01", "46000", "44000", "--poll-interval", "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_environment() {
        let cli = parse(&[
            "oco", "BTCUSDT", "BUY", "0.01", "46000", "44000", "--on-timeout", "cancel",
            "--poll-interval", "2", "--monitor-time", "60",
        ]);
        let base = EngineConfig::new().with_oco(OcoConfig::default().with_retries(5));
        let config = cli.engine_config(base);

        assert_eq!(config.oco.timeout_policy, TimeoutPolicy::CancelBoth);
        assert_eq!(config.oco.poll_interval, Duration::from_secs(2));
        assert_eq!(config.oco.max_monitor_duration, Duration::from_secs(60));
        assert_eq!(config.oco.cancel_retries, 5);
    }

    #[test]
    fn test_empty_log_file_disables_file_output() {
        let cli = parse(&["market", "BTCUSDT", "BUY", "0.01", "--log-file", ""]);
        assert!(cli.log_config().file.is_none());

        let cli = parse(&["market", "BTCUSDT", "BUY", "0.01"]);
        assert_eq!(cli.log_config().file, Some(PathBuf::from("bot.log")));
    }
}
