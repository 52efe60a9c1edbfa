//! Logging setup for the compiler and its CLI
//!
//! Every stage emits `tracing` events; this module installs the subscriber
//! that renders them.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rotated file
    File { directory: String, prefix: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events (one per compile stage)
    pub span_events: bool,
    /// Extra filter directives, e.g. `typthon_ext::exttypes=trace`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Parse a level name (`"debug"`, `"INFO"`, ...), keeping the current
    /// level when the name is not recognised.
    pub fn with_level_name(mut self, level: &str) -> Self {
        if let Ok(level) = Level::from_str(level) {
            self.level = level;
        }
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered events when dropped; keep it alive
/// until the program exits. Returns `None` if a subscriber is already set.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let filter = build_filter(&config);
    let spans = span_events_config(config.span_events);

    let (writer, guard): (NonBlocking, WorkerGuard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => tracing_appender::non_blocking(rolling::daily(directory, prefix)),
    };

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .pretty()
            .with_span_events(spans)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(writer)
            .compact()
            .with_span_events(spans)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .with_span_events(spans)
            .with_filter(filter)
            .boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str.split(',').fold(base_filter, |filter, directive| {
            filter.add_directive(directive.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid filter directive: {}", directive);
                config.level.into()
            }))
        }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Verbose stderr logging with stage spans.
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::DEBUG,
        format: LogFormat::Pretty,
        output: LogOutput::Stderr,
        span_events: true,
        filter: Some("typthon_ext=debug".to_string()),
    })
}

/// JSON logs to a daily-rotated file under `log_dir`.
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::INFO,
        format: LogFormat::Json,
        output: LogOutput::File {
            directory: log_dir.as_ref().to_string_lossy().to_string(),
            prefix: "typthon-ext".to_string(),
        },
        span_events: false,
        filter: Some("typthon_ext=info,warn".to_string()),
    })
}
