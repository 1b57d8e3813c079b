//! Logging setup for the fixture.
//!
//! Events go through `tracing`; this module installs the `tracing-subscriber`
//! stack once per process. Level and output format come from the `[application]`
//! section of the configuration, and `RUST_LOG` wins over both when set:
//!
//! ```toml
//! [application]
//! log_level = "debug"
//! log_format = "json"
//! ```
//!
//! ```no_run
//! use hmi_fixture::{config::FixtureConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FixtureConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!(port = %config.serial.port, "fixture starting");
//! # Ok(())
//! # }
//! ```

use crate::config::{ApplicationConfig, FixtureConfig};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, coloured; for a developer at the bench.
    Pretty,
    /// One line per event; what the operator console shows.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "Unknown log format '{}', expected compact, pretty or json",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    pub format: OutputFormat,
    /// Log span open/close (useful with `#[instrument]`ed test steps).
    pub with_span_events: bool,
    pub with_file_and_line: bool,
    pub with_thread_names: bool,
    /// Colours; honoured by the pretty format only.
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_span_events: false,
            with_file_and_line: false,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Level and format from `[application]`.
    pub fn from_application(app: &ApplicationConfig) -> Result<Self, String> {
        let level = Level::from_str(&app.log_level)
            .map_err(|_| format!("Invalid log level '{}'", app.log_level))?;
        let format = app.log_format.parse()?;
        Ok(Self::new(level).with_format(format))
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.with_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_span_events(self.span_events())
            .with_file(self.with_file_and_line)
            .with_line_number(self.with_file_and_line)
            .with_thread_names(self.with_thread_names);

        match self.format {
            OutputFormat::Pretty => layer.pretty().with_ansi(self.with_ansi).boxed(),
            OutputFormat::Compact => layer.compact().with_ansi(false).boxed(),
            OutputFormat::Json => layer.json().with_ansi(false).boxed(),
        }
    }
}

/// Install the subscriber described by `[application]`.
pub fn init_from_config(config: &FixtureConfig) -> Result<(), String> {
    init(TracingConfig::from_application(&config.application)?)
}

/// Install the global subscriber.
///
/// Calling it again once a subscriber is installed is a no-op, so tests and the
/// CLI can both call it.
pub fn init(config: TracingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    tracing_subscriber::registry()
        .with(config.fmt_layer().with_filter(filter))
        .try_init()
        .or_else(already_initialized_is_ok)
}

fn already_initialized_is_ok(e: TryInitError) -> Result<(), String> {
    if e.to_string()
        .contains("a global default trace dispatcher has already been set")
    {
        Ok(())
    } else {
        Err(format!("Failed to initialize tracing: {}", e))
    }
}
