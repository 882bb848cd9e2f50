//! Structured logging initialisation.
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! the embedding application's call. [`init_logging`] is the stock setup:
//! an [`EnvFilter`], a JSON or pretty `fmt` layer, and optionally a
//! non-blocking writer so request handling never waits on log I/O.
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `BRRTFN_LOG_LEVEL` | `trace`/`debug`/`info`/`warn`/`error` | `info` |
//! | `BRRTFN_LOG_FORMAT` | `json`/`pretty` | `json` |
//! | `BRRTFN_LOG_TARGET_FILTER` | comma-separated directives | none |
//! | `BRRTFN_LOG_INCLUDE_LOCATION` | `true`/`false` | `false` |
//! | `BRRTFN_LOG_ASYNC` | `true`/`false` | `true` |
//!
//! `RUST_LOG`, when set, replaces the level.

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    /// Extra `EnvFilter` directives, comma-separated.
    pub target_filter: Option<String>,
    /// Include file:line location (dev only)
    pub include_location: bool,
    pub async_logging: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
            async_logging: true,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable booleans keep
    /// their defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|v| v.trim().parse::<bool>().ok())
                .unwrap_or(default)
        };
        Self {
            log_level: lookup("BRRTFN_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: lookup("BRRTFN_LOG_FORMAT")
                .map_or(defaults.format, |v| LogFormat::parse(&v)),
            target_filter: lookup("BRRTFN_LOG_TARGET_FILTER").filter(|v| !v.trim().is_empty()),
            include_location: flag("BRRTFN_LOG_INCLUDE_LOCATION", defaults.include_location),
            async_logging: flag("BRRTFN_LOG_ASYNC", defaults.async_logging),
        }
    }

    /// Pretty, synchronous, debug level with locations.
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_owned(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
            async_logging: false,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// The filter [`init_logging`] installs, without consulting `RUST_LOG`.
    ///
    /// Invalid directives in `target_filter` are skipped.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(self.level().as_str());
        for directive in self
            .target_filter
            .iter()
            .flat_map(|f| f.split(','))
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            match directive.parse() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(err) => eprintln!("Warning: invalid log filter directive '{directive}': {err}"),
            }
        }
        filter
    }
}

fn fmt_layer<S, W>(config: &LogConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    }
}

/// Install the global subscriber. Logs go to stderr.
///
/// With `async_logging` the returned guard owns the background writer; keep
/// it alive until shutdown or buffered lines are lost.
///
/// # Errors
///
/// A global subscriber is already installed.
///
/// ```no_run
/// use brrtfn::logging::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::from_env()).expect("logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| config.env_filter()),
        Err(_) => config.env_filter(),
    };
    let registry = tracing_subscriber::registry().with(filter);

    if config.async_logging {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        registry
            .with(fmt_layer(config, writer))
            .try_init()
            .context("Failed to initialize async logging")?;
        Ok(Some(guard))
    } else {
        registry
            .with(fmt_layer(config, std::io::stderr))
            .try_init()
            .context("Failed to initialize sync logging")?;
        Ok(None)
    }
}
