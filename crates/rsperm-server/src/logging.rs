//! Log output for engine decisions.
//!
//! The engine reports through `tracing`: built expressions and decisions at
//! `debug`, individual check results at `trace`, checks that error at `warn`.
//! This module turns the `logging` section of [`ServerConfig`] into a
//! subscriber. `RUST_LOG` still takes precedence over the configured level.
//!
//! A JSON line for a denied decision looks like:
//!
//! ```json
//! {"timestamp":"...","level":"DEBUG","fields":{"message":"permission denied","diagnostic":"DELETE PERMISSION WAS INVOKED ON ..."},"target":"rsperm_domain::executor"}
//! ```
//!
//! [`ServerConfig`]: crate::ServerConfig

use tracing::level_filters::LevelFilter;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigLoadError, LoggingSettings};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Compact human-readable lines.
    Text,
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level used when `RUST_LOG` is unset.
    pub level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: Level::INFO,
        }
    }
}

impl TryFrom<&LoggingSettings> for LoggingConfig {
    type Error = ConfigLoadError;

    fn try_from(settings: &LoggingSettings) -> Result<Self, Self::Error> {
        let level = settings
            .level
            .parse::<Level>()
            .map_err(|_| ConfigLoadError::Invalid {
                message: format!("logging.level: unknown level '{}'", settings.level),
            })?;
        let format = if settings.json {
            LogFormat::Json
        } else {
            LogFormat::Text
        };
        Ok(Self { format, level })
    }
}

impl LoggingConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy()
    }

    /// Builds a subscriber writing to `writer`.
    pub fn subscriber<W>(&self, writer: W) -> impl Subscriber + Send + Sync + 'static
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        let (json, text) = match self.format {
            LogFormat::Json => (
                Some(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_writer(writer),
                ),
                None,
            ),
            LogFormat::Text => (None, Some(fmt::layer().compact().with_writer(writer))),
        };

        tracing_subscriber::registry()
            .with(self.filter())
            .with(json)
            .with(text)
    }
}

/// Installs the global subscriber, writing to stdout.
///
/// Fails when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(config.subscriber(std::io::stdout))
}
