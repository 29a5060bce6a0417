//! A pooled encoder for metrics in the [line protocol][line-protocol] format used by Telegraf and
//! InfluxDB.
//!
//! [line-protocol]: https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/
//!
//! # Usage
//!
//! Metrics are built up from a name, a timestamp, tags, and fields, and then encoded by a
//! [`MetricEncoder`]. Encoders own their output buffer and are meant to be reused, and a
//! [`MetricEncoderPool`] allows many threads to share a small number of them:
//!
//! ```
//! # use line_metric_encoder::MetricEncoderPool;
//! # use std::time::{Duration, UNIX_EPOCH};
//! let pool = MetricEncoderPool::new();
//!
//! // Check out an encoder. It goes back to the pool when `encoder` is dropped.
//! let mut encoder = pool.pull();
//! let line = encoder
//!     .begin("log")
//!     .with_time(UNIX_EPOCH + Duration::from_secs(1))
//!     .with_tag("host", "a")
//!     .with_field("count", 3)
//!     .with_field("ok", true)
//!     .encode()
//!     .expect("metric has fields");
//!
//! assert_eq!(line, b"log,host=a count=3i,ok=true 1000000000\n");
//! ```
//!
//! Call sites that only want to write a metric once can skip the explicit checkout:
//!
//! ```
//! # use line_metric_encoder::MetricEncoderPool;
//! let pool = MetricEncoderPool::new();
//! let mut out = Vec::new();
//!
//! pool.new_metric("log").with_field("msg", "hello").write(&mut out).expect("write failed");
//! ```
//!
//! # Field values
//!
//! Field values are normalized as they are added: strings, booleans, integers, and floats are
//! stored as-is, while errors and other [`Display`][std::fmt::Display] or
//! [`Debug`][std::fmt::Debug] values are stored as text. See [`Value`].
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod encoder;
pub use self::encoder::{Error, MetricEncoder};

mod fluent;
pub use self::fluent::{FieldBuilder, TagBuilder};

mod metric;
pub use self::metric::{FieldValue, Metric, Value};

mod pool;
pub use self::pool::{MetricEncoderPool, PooledEncoder, PooledMetric};

mod protocol;
pub use self::protocol::{EncodeError, Precision, Serializer};
