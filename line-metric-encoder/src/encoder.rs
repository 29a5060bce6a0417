use std::{
    io::{self, Write},
    time::SystemTime,
};

use thiserror::Error;

use crate::{
    metric::{Metric, Value},
    protocol::{EncodeError, Precision, Serializer},
};

/// Errors that could occur while writing a metric.
#[derive(Debug, Error)]
pub enum Error {
    /// The metric could not be encoded, and nothing was written.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The sink failed to accept the encoded metric.
    ///
    /// This is the error reported by the sink, unmodified.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The sink accepted only part of the encoded metric.
    ///
    /// The remainder is not retried.
    #[error("short write: sink accepted {written} of {len} bytes")]
    ShortWrite {
        /// Number of bytes the sink accepted.
        written: usize,

        /// Length of the encoded metric.
        len: usize,
    },
}

/// A reusable, non-reentrant metric encoder.
///
/// Each encoder owns one output buffer, one serializer, and one in-progress [`Metric`]. The buffer
/// is cleared at the start of every encode or write, so an encoder can be used any number of times
/// in sequence without earlier output leaking into later output, while the allocations behind the
/// buffer and the metric are reused.
///
/// An encoder is not synchronized internally. Sharing one between callers goes through
/// [`MetricEncoderPool`][crate::MetricEncoderPool], which hands each encoder to exactly one caller
/// at a time.
pub struct MetricEncoder {
    buf: Vec<u8>,
    serializer: Serializer,
    metric: Metric,
}

impl MetricEncoder {
    /// Creates a new `MetricEncoder`.
    ///
    /// The encoder does not limit line length.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            serializer: Serializer::new().with_max_line_bytes(None),
            metric: Metric::new(""),
        }
    }

    /// Sets the timestamp precision used when encoding.
    ///
    /// Defaults to nanoseconds.
    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.serializer.set_precision(precision);
        self
    }

    /// Starts a new metric with the given name, timestamped with the current time.
    ///
    /// Any state from a previous metric is discarded.
    pub fn begin(&mut self, name: &str) -> &mut Self {
        self.buf.clear();
        self.metric.reset(name);
        self
    }

    /// Overrides the timestamp of the current metric.
    pub fn with_time(&mut self, time: SystemTime) -> &mut Self {
        self.metric.with_time(time);
        self
    }

    /// Adds a tag to the current metric.
    pub fn with_tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.metric.with_tag(key, value);
        self
    }

    /// Adds a field to the current metric.
    ///
    /// Errors and other non-primitive values are stored as their textual representation.
    pub fn with_field<'v, V>(&mut self, key: &str, value: V) -> &mut Self
    where
        V: Into<Value<'v>>,
    {
        self.metric.with_field(key, value);
        self
    }

    /// Gets a reference to the current metric.
    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Gets a mutable reference to the current metric.
    pub fn metric_mut(&mut self) -> &mut Metric {
        &mut self.metric
    }

    /// Encodes the current metric.
    ///
    /// The returned bytes are only valid until the next call that touches the buffer; callers that
    /// need to hold on to them must copy them.
    ///
    /// # Errors
    ///
    /// If the current metric cannot be encoded, an error is returned.
    pub fn encode(&mut self) -> Result<&[u8], EncodeError> {
        encode_into(&mut self.serializer, &self.metric, &mut self.buf)?;
        Ok(&self.buf)
    }

    /// Encodes the current metric and writes it to `writer`.
    ///
    /// The record is handed to the writer in a single `write` call. Returns the number of bytes
    /// written, which is the full length of the encoded record.
    ///
    /// # Errors
    ///
    /// If the current metric cannot be encoded, nothing is written and an error is returned. If the
    /// writer fails, its error is returned as-is, including [`io::ErrorKind::Interrupted`]. If the
    /// writer accepts only part of the record, [`Error::ShortWrite`] is returned. Writes are never
    /// retried.
    pub fn write<W>(&mut self, writer: &mut W) -> Result<usize, Error>
    where
        W: Write + ?Sized,
    {
        encode_into(&mut self.serializer, &self.metric, &mut self.buf)?;
        write_buf(&self.buf, writer)
    }

    /// Encodes the given metric.
    ///
    /// The current metric of this encoder is left untouched. The same buffer validity rules as
    /// [`encode`][Self::encode] apply.
    ///
    /// # Errors
    ///
    /// If the metric cannot be encoded, an error is returned.
    pub fn encode_metric(&mut self, metric: &Metric) -> Result<&[u8], EncodeError> {
        encode_into(&mut self.serializer, metric, &mut self.buf)?;
        Ok(&self.buf)
    }

    /// Encodes the given metric and writes it to `writer`.
    ///
    /// # Errors
    ///
    /// See [`write`][Self::write].
    pub fn write_metric<W>(&mut self, metric: &Metric, writer: &mut W) -> Result<usize, Error>
    where
        W: Write + ?Sized,
    {
        encode_into(&mut self.serializer, metric, &mut self.buf)?;
        write_buf(&self.buf, writer)
    }
}

impl Default for MetricEncoder {
    fn default() -> Self {
        MetricEncoder::new()
    }
}

fn encode_into(
    serializer: &mut Serializer,
    metric: &Metric,
    buf: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    buf.clear();
    serializer.serialize(metric, buf).map(|_| ())
}

fn write_buf<W>(buf: &[u8], writer: &mut W) -> Result<usize, Error>
where
    W: Write + ?Sized,
{
    let written = writer.write(buf)?;
    if written < buf.len() {
        return Err(Error::ShortWrite { written, len: buf.len() });
    }

    Ok(written)
}
