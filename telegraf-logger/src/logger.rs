use std::{io, sync::Arc};

use line_metric_encoder::{EncodeError, Error, MetricEncoder, MetricEncoderPool, Value};
use tracing_subscriber::fmt::{writer::BoxMakeWriter, MakeWriter};

/// A logger that writes each log call as one line-protocol record.
///
/// Every call to [`log`][Self::log] checks out an encoder from the logger's
/// [`MetricEncoderPool`], builds a single metric named after the configured metric name with one
/// field per key/value pair, and writes it to a writer obtained from `W`. The encoder is back in the
/// pool before the call returns, whether or not the write succeeded.
///
/// `W` is any [`MakeWriter`]. Writers are created per call, so a sink shared between threads must
/// do its own synchronization, just as with the writers used by `tracing_subscriber::fmt`.
#[derive(Clone)]
pub struct LineLogger<W = BoxMakeWriter> {
    metric: String,
    global_tags: Vec<(String, String)>,
    make_writer: W,
    pool: Arc<MetricEncoderPool>,
}

impl<W> LineLogger<W>
where
    W: for<'a> MakeWriter<'a>,
{
    /// Creates a new `LineLogger` that writes metrics named `metric` to `make_writer`.
    pub fn new<N: Into<String>>(metric: N, make_writer: W) -> Self {
        Self {
            metric: metric.into(),
            global_tags: Vec::new(),
            make_writer,
            pool: Arc::new(MetricEncoderPool::new()),
        }
    }

    /// Uses the given encoder pool instead of a private one.
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<MetricEncoderPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Adds a tag to every record written by this logger.
    #[must_use]
    pub fn with_global_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.global_tags.push((key.into(), value.into()));
        self
    }

    /// Name of the metric written for each log call.
    pub fn metric_name(&self) -> &str {
        &self.metric
    }

    /// The encoder pool used by this logger.
    pub fn pool(&self) -> &Arc<MetricEncoderPool> {
        &self.pool
    }

    /// Writes one record from a flat list of alternating keys and values.
    ///
    /// Keys that are not strings are converted to text with their `Display` rendering. Values are
    /// stored according to [`Value`]; errors are stored as their description.
    ///
    /// A trailing key without a value is dropped. If no key/value pairs remain, nothing is written
    /// and `Ok(())` is returned, since a record without fields cannot be represented.
    ///
    /// # Errors
    ///
    /// The record is handed to the sink in a single write call, which is never retried. If the sink
    /// fails, its error is returned unmodified. If it accepts only part of the record, an error of
    /// kind [`io::ErrorKind::WriteZero`] is returned. A metric name that cannot be encoded results
    /// in an error of kind [`io::ErrorKind::InvalidInput`].
    pub fn log(&self, keyvals: &[Value<'_>]) -> io::Result<()> {
        self.emit(|encoder| {
            for pair in keyvals.chunks_exact(2) {
                let (key, value) = (pair[0], pair[1]);
                match key.as_str() {
                    Some(key) => encoder.with_field(key, value),
                    None => encoder.with_field(&key.to_string(), value),
                };
            }
        })
    }

    /// Builds a record with `fill` and writes it.
    ///
    /// `fill` receives an encoder on which the metric has already been started, with the global
    /// tags applied.
    pub(crate) fn emit<F>(&self, fill: F) -> io::Result<()>
    where
        F: FnOnce(&mut MetricEncoder),
    {
        let mut encoder = self.pool.pull();
        encoder.begin(&self.metric);
        for (key, value) in &self.global_tags {
            encoder.with_tag(key, value);
        }

        fill(&mut encoder);

        let mut writer = self.make_writer.make_writer();
        match encoder.write(&mut writer) {
            Ok(_) | Err(Error::Encode(EncodeError::NoFields)) => Ok(()),
            Err(Error::Encode(e)) => Err(io::Error::new(io::ErrorKind::InvalidInput, e)),
            Err(Error::Io(e)) => Err(e),
            Err(e @ Error::ShortWrite { .. }) => Err(io::Error::new(io::ErrorKind::WriteZero, e)),
        }
    }
}
