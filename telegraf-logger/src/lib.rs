//! A logger that writes log records as [line protocol][line-protocol] metrics, for collection by
//! Telegraf alongside an application's other metrics.
//!
//! [line-protocol]: https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/
//!
//! # Direct logging
//!
//! [`LineLogger`] takes a flat list of alternating keys and values and writes it as a single
//! record:
//!
//! ```
//! # use telegraf_logger::LineLogger;
//! let logger = LineLogger::new("log", std::io::stderr);
//! logger.log(&["level".into(), "error".into(), "msg".into(), "disk full".into()])?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! which writes a record like:
//!
//! ```text
//! log level="error",msg="disk full" 1700000000000000000
//! ```
//!
//! Encoders are checked out of a [`MetricEncoderPool`][line_metric_encoder::MetricEncoderPool] for
//! the duration of each call, so loggers can be shared freely between threads.
//!
//! # With `tracing`
//!
//! [`LineProtocolLayer`] writes every `tracing` event as a record, with the event's level and
//! message as the `level` and `msg` fields:
//!
//! ```
//! # use telegraf_logger::{LineLogger, LineProtocolLayer};
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let layer = LineProtocolLayer::new(LineLogger::new("log", std::io::stdout));
//! let subscriber = tracing_subscriber::registry().with(layer);
//!
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::warn!(attempt = 3, "retrying upload");
//! });
//! ```
//!
//! # Configuration
//!
//! [`LoggerConfig`] selects the destination, level, and format, either in code or from
//! command-line flags (`--log`, `--log-level`, `--log-format`, and `--log-metric`). Nothing is
//! installed globally until [`LoggerConfig::install`] is called:
//!
//! ```no_run
//! # use telegraf_logger::LoggerConfig;
//! LoggerConfig::from_env()?.install()?;
//! # Ok::<(), telegraf_logger::ConfigError>(())
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod config;
pub use self::config::{parse_level, ConfigError, Destination, LogFormat, LoggerConfig};

mod layer;
pub use self::layer::{LineProtocolLayer, WriteFailures};

mod logger;
pub use self::logger::LineLogger;

pub use line_metric_encoder::Value;
