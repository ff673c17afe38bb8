//! Process-wide tracing setup: a console layer on stderr plus an optional
//! append-only log file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Noisy dependencies held at `warn` regardless of the chosen level.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"];

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is unset.
    pub level: Level,
    /// When set, every event is also appended here without ANSI colours.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file: Some(PathBuf::from("bot.log")),
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }
}

/// Install the global subscriber.
///
/// Fails only if the log file cannot be opened. A second call is a no-op.
pub fn init_logging(config: LogConfig) -> std::io::Result<()> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();
    for target in QUIET_TARGETS {
        if let Ok(directive) = target.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init();

    Ok(())
}
