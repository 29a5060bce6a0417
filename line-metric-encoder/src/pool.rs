use std::{
    io,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
    time::SystemTime,
};

use crossbeam_queue::SegQueue;
use tracing::trace;

use crate::{
    encoder::{Error, MetricEncoder},
    metric::{Metric, Value},
    protocol::{EncodeError, Precision},
};

/// A concurrent pool of [`MetricEncoder`]s.
///
/// Encoders are lent out to one caller at a time and returned when the caller is done, so that their
/// buffers are reused across many encodes. The pool never blocks: when no idle encoder is available,
/// a new one is created, and the pool grows to the number of encoders that are ever checked out at
/// the same time.
///
/// Encoders can be checked out and returned by hand with [`get`][Self::get] and
/// [`put_back`][Self::put_back], or through the [`pull`][Self::pull] guard which returns the encoder
/// when it is dropped, including on early returns and unwinding.
pub struct MetricEncoderPool {
    idle: SegQueue<MetricEncoder>,
    created: AtomicUsize,
    max_idle: Option<usize>,
    precision: Precision,
}

impl MetricEncoderPool {
    /// Creates a new, empty `MetricEncoderPool`.
    pub fn new() -> Self {
        Self {
            idle: SegQueue::new(),
            created: AtomicUsize::new(0),
            max_idle: None,
            precision: Precision::Nanoseconds,
        }
    }

    /// Sets the maximum number of idle encoders kept by the pool.
    ///
    /// Encoders returned while the pool already holds this many idle encoders are dropped. Under
    /// concurrent returns the limit is approximate.
    ///
    /// Defaults to no limit.
    #[must_use]
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Sets the timestamp precision of encoders created by the pool.
    ///
    /// Defaults to nanoseconds.
    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Checks out an encoder.
    ///
    /// An idle encoder is reused if one is available, otherwise a new one is created. The caller
    /// owns the encoder until it hands it back with [`put_back`][Self::put_back].
    pub fn get(&self) -> MetricEncoder {
        match self.idle.pop() {
            Some(encoder) => encoder,
            None => {
                let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(created, "Creating new metric encoder.");
                MetricEncoder::new().with_precision(self.precision)
            }
        }
    }

    /// Returns an encoder to the pool.
    ///
    /// The encoder becomes available to a later [`get`][Self::get]. Its buffers are left as they
    /// are; encoders reset themselves at the start of every encode.
    pub fn put_back(&self, encoder: MetricEncoder) {
        if let Some(max_idle) = self.max_idle {
            if self.idle.len() >= max_idle {
                return;
            }
        }

        self.idle.push(encoder);
    }

    /// Checks out an encoder that is returned to the pool when dropped.
    pub fn pull(&self) -> PooledEncoder<'_> {
        PooledEncoder { pool: self, encoder: Some(self.get()) }
    }

    /// Creates a new metric whose encodes and writes borrow an encoder from this pool.
    pub fn new_metric(&self, name: &str) -> PooledMetric<'_> {
        PooledMetric { pool: self, metric: Metric::new(name) }
    }

    /// Returns the number of encoders this pool has created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Returns the number of idle encoders currently held by this pool.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }
}

impl Default for MetricEncoderPool {
    fn default() -> Self {
        MetricEncoderPool::new()
    }
}

/// An encoder checked out of a [`MetricEncoderPool`].
///
/// Dereferences to the [`MetricEncoder`], and returns it to the pool when dropped.
pub struct PooledEncoder<'a> {
    pool: &'a MetricEncoderPool,
    encoder: Option<MetricEncoder>,
}

impl PooledEncoder<'_> {
    /// Detaches the encoder from the pool.
    ///
    /// The encoder is no longer returned automatically; it can be handed back with
    /// [`MetricEncoderPool::put_back`], or simply dropped.
    pub fn detach(mut self) -> MetricEncoder {
        self.encoder.take().expect("encoder is only taken once")
    }
}

impl Deref for PooledEncoder<'_> {
    type Target = MetricEncoder;

    fn deref(&self) -> &Self::Target {
        self.encoder.as_ref().expect("encoder is only taken on drop or detach")
    }
}

impl DerefMut for PooledEncoder<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.encoder.as_mut().expect("encoder is only taken on drop or detach")
    }
}

impl Drop for PooledEncoder<'_> {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.pool.put_back(encoder);
        }
    }
}

/// A metric bound to a [`MetricEncoderPool`].
///
/// Encoding or writing the metric checks out an encoder for the duration of the call and returns it
/// before the call completes.
pub struct PooledMetric<'a> {
    pool: &'a MetricEncoderPool,
    metric: Metric,
}

impl PooledMetric<'_> {
    /// Overrides the timestamp of this metric.
    pub fn with_time(&mut self, time: SystemTime) -> &mut Self {
        self.metric.with_time(time);
        self
    }

    /// Adds a tag.
    pub fn with_tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.metric.with_tag(key, value);
        self
    }

    /// Adds a field.
    ///
    /// Errors and other non-primitive values are stored as their textual representation.
    pub fn with_field<'v, V>(&mut self, key: &str, value: V) -> &mut Self
    where
        V: Into<Value<'v>>,
    {
        self.metric.with_field(key, value);
        self
    }

    /// Encodes this metric.
    ///
    /// The encoder goes back to the pool before this returns, so the encoded bytes are copied out.
    ///
    /// # Errors
    ///
    /// If the metric cannot be encoded, an error is returned.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = self.pool.pull();
        encoder.encode_metric(&self.metric).map(<[u8]>::to_vec)
    }

    /// Encodes this metric and writes it to `writer`.
    ///
    /// # Errors
    ///
    /// If the metric cannot be encoded, nothing is written and an error is returned. If the writer
    /// fails, its error is returned as-is.
    pub fn write<W>(&self, writer: &mut W) -> Result<usize, Error>
    where
        W: io::Write + ?Sized,
    {
        let mut encoder = self.pool.pull();
        encoder.write_metric(&self.metric, writer)
    }

    /// Encodes this metric and writes it to standard output.
    ///
    /// # Errors
    ///
    /// See [`write`][Self::write].
    pub fn print(&self) -> Result<usize, Error> {
        self.write(&mut io::stdout().lock())
    }

    /// Consumes this wrapper, returning the metric.
    pub fn into_inner(self) -> Metric {
        self.metric
    }
}

impl Deref for PooledMetric<'_> {
    type Target = Metric;

    fn deref(&self) -> &Self::Target {
        &self.metric
    }
}

impl DerefMut for PooledMetric<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.metric
    }
}
