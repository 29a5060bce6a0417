//! Logger configuration, from code or from command-line flags.
use std::{
    ffi::OsStr,
    fmt,
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use getopts::Options;
use thiserror::Error;
use tracing::{debug, subscriber::SetGlobalDefaultError, Subscriber};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self as tracing_fmt, writer::BoxMakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    Layer, Registry,
};

use crate::{LineLogger, LineProtocolLayer};

const DEFAULT_METRIC: &str = "log";

/// Errors that could occur while resolving or applying a [`LoggerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The command-line flags could not be parsed.
    #[error("failed to parse logging flags: {0}")]
    Flags(#[from] getopts::Fail),

    /// The log file could not be opened.
    #[error("failed to open log file {}: {source}", path.display())]
    Destination {
        /// Path of the log file.
        path: PathBuf,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A global default subscriber was already installed.
    #[error("failed to install logger: {0}")]
    Install(#[from] SetGlobalDefaultError),
}

/// Where log records are written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Destination {
    /// Standard output.
    Stdout,

    /// Standard error.
    #[default]
    Stderr,

    /// A file, created if missing and appended to otherwise.
    File(PathBuf),
}

impl Destination {
    /// Parses a destination.
    ///
    /// `stdout` and `stderr` select the standard streams, and the empty string selects standard
    /// error. Anything else is a file path.
    pub fn parse(s: &str) -> Self {
        match s {
            "stdout" => Destination::Stdout,
            "stderr" | "" => Destination::Stderr,
            path => Destination::File(PathBuf::from(path)),
        }
    }

    /// Opens the destination and creates a writer for it.
    ///
    /// # Errors
    ///
    /// If the destination is a file that cannot be opened for appending, an error is returned.
    pub fn make_writer(&self) -> Result<BoxMakeWriter, ConfigError> {
        match self {
            Destination::Stdout => Ok(BoxMakeWriter::new(io::stdout)),
            Destination::Stderr => Ok(BoxMakeWriter::new(io::stderr)),
            Destination::File(path) => {
                let file = open_append(path)
                    .map_err(|source| ConfigError::Destination { path: path.clone(), source })?;
                Ok(BoxMakeWriter::new(Arc::new(file)))
            }
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => f.write_str("stdout"),
            Destination::Stderr => f.write_str("stderr"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn open_append(path: &Path) -> io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// How log records are formatted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One line-protocol record per event.
    Line,

    /// Human-readable `key=value` text, without colors.
    #[default]
    Logfmt,

    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a log format, case-insensitively.
    ///
    /// Unrecognized formats select [`LogFormat::Line`].
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "logfmt" => LogFormat::Logfmt,
            "json" => LogFormat::Json,
            _ => LogFormat::Line,
        }
    }
}

/// Parses a level name, case-insensitively.
///
/// `all` enables every level and `none` disables logging. Unrecognized names select
/// [`LevelFilter::WARN`].
pub fn parse_level(s: &str) -> LevelFilter {
    match s.to_ascii_lowercase().as_str() {
        "all" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "none" => LevelFilter::OFF,
        _ => LevelFilter::WARN,
    }
}

/// Logger configuration.
///
/// The default configuration writes human-readable text at `warn` and above to standard error.
/// [`from_args`][Self::from_args] builds a configuration from command-line flags instead.
///
/// Building a layer has no global side effects. [`install`][Self::install] is the only operation
/// that changes process-wide state.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggerConfig {
    /// Where log records are written.
    pub destination: Destination,

    /// The most verbose level that is written.
    pub level: LevelFilter,

    /// How log records are formatted.
    pub format: LogFormat,

    /// Metric name used for line-protocol records.
    pub metric: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            destination: Destination::Stderr,
            level: LevelFilter::WARN,
            format: LogFormat::Logfmt,
            metric: DEFAULT_METRIC.to_owned(),
        }
    }
}

impl LoggerConfig {
    /// Gets the command-line options understood by [`from_args`][Self::from_args].
    ///
    /// Useful for printing usage, or as a starting point for a program's own options.
    pub fn options() -> Options {
        let mut opts = Options::new();
        opts.long_only(true);
        opts.optopt("", "log", "log destination: \"stdout\", \"stderr\", or a file path", "DEST");
        opts.optopt("", "log-level", "log level: all, debug, info, warn, error, or none", "LEVEL");
        opts.optopt("", "log-format", "log format: line, logfmt, or json", "FORMAT");
        opts.optopt("", "log-metric", "metric name for line-protocol log records", "NAME");
        opts
    }

    /// Builds a configuration from command-line arguments, not including the program name.
    ///
    /// Flags may be given with one or two leading dashes. Flags that are not given fall back to
    /// writing line-protocol records at `error` and above to standard error, with a metric name of
    /// `log`. Free arguments are ignored.
    ///
    /// # Errors
    ///
    /// If the arguments contain an unknown flag, or a flag without its value, an error is returned.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let matches = Self::options().parse(args)?;
        let flag =
            |name: &str, default: &str| matches.opt_str(name).unwrap_or_else(|| default.to_owned());

        let config = Self {
            destination: Destination::parse(&flag("log", "stderr")),
            level: parse_level(&flag("log-level", "error")),
            format: LogFormat::parse(&flag("log-format", "line")),
            metric: flag("log-metric", DEFAULT_METRIC),
        };
        debug!(
            destination = %config.destination,
            level = %config.level,
            format = ?config.format,
            metric = %config.metric,
            "resolved logger configuration"
        );

        Ok(config)
    }

    /// Builds a configuration from the arguments of the current process.
    ///
    /// # Errors
    ///
    /// See [`from_args`][Self::from_args].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_args(std::env::args_os().skip(1))
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Sets the most verbose level that is written.
    #[must_use]
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Sets the format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the metric name used for line-protocol records.
    #[must_use]
    pub fn with_metric<N: Into<String>>(mut self, metric: N) -> Self {
        self.metric = metric.into();
        self
    }

    /// Builds a level-filtered layer for this configuration.
    ///
    /// # Errors
    ///
    /// If the destination cannot be opened, an error is returned.
    pub fn layer<S>(&self) -> Result<Box<dyn Layer<S> + Send + Sync + 'static>, ConfigError>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let writer = self.destination.make_writer()?;
        let layer: Box<dyn Layer<S> + Send + Sync> = match self.format {
            LogFormat::Line => {
                let logger = LineLogger::new(self.metric.clone(), writer);
                LineProtocolLayer::new(logger).with_filter(self.level).boxed()
            }
            LogFormat::Logfmt => tracing_fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(self.level)
                .boxed(),
            LogFormat::Json => {
                tracing_fmt::layer().json().with_writer(writer).with_filter(self.level).boxed()
            }
        };

        Ok(layer)
    }

    /// Installs this configuration as the global default subscriber.
    ///
    /// # Errors
    ///
    /// If the destination cannot be opened, or a global default subscriber is already installed, an
    /// error is returned.
    pub fn install(&self) -> Result<(), ConfigError> {
        let subscriber = tracing_subscriber::registry().with(self.layer::<Registry>()?);
        tracing::subscriber::set_global_default(subscriber)?;

        debug!(destination = %self.destination, format = ?self.format, "installed logger");
        Ok(())
    }
}
