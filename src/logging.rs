//! Logging infrastructure - structured tracing for pool events
//!
//! Design: the engines emit `tracing` events under the `poolset` targets
//! and never install a subscriber themselves. Applications that want output
//! call `init` (environment driven) or `init_with_config` once:
//! - `RUST_LOG` wins when set, else `POOLSET_LOG_LEVEL`
//! - `POOLSET_LOG_JSON` switches to JSON lines
//! - `POOLSET_LOG_FILE` (a directory) adds a daily-rolling file

use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Set once the global subscriber is installed; holds the file writer guard
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

const LOG_FILE_PREFIX: &str = "poolset.log";

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for the `poolset` targets when `RUST_LOG` is unset
    pub level: Level,
    /// Emit JSON lines instead of the compact format
    pub json_format: bool,
    /// Also write to a daily-rolling file in this directory
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            log_dir: None,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("POOLSET_LOG_LEVEL") {
            config.level = parse_level(&level);
        }
        config.json_format = std::env::var("POOLSET_LOG_JSON").is_ok();
        config.log_dir = std::env::var_os("POOLSET_LOG_FILE").map(PathBuf::from);

        config
    }

    /// Every allocation and free, for chasing a leak or a double free
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_json(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("poolset={}", self.level.to_string().to_lowercase())))
    }
}

fn parse_level(value: &str) -> Level {
    match value.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with an explicit configuration
///
/// Only the first call has an effect. A subscriber installed elsewhere is
/// left in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let console = if config.json_format {
            fmt::layer().json().with_target(true).boxed()
        } else {
            fmt::layer().compact().with_target(true).boxed()
        };

        let (file, guard) = match &config.log_dir {
            Some(dir) => {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let installed = tracing_subscriber::registry()
            .with(console.with_filter(config.filter()))
            .with(file.map(|layer| layer.with_filter(config.filter())))
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!(target: "poolset", ?config, "logging initialized");
        }
        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}
