//! A [`Layer`] that writes `tracing` events as line-protocol records.
use std::{
    error::Error as StdError,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use line_metric_encoder::{MetricEncoder, Value};
use tracing_core::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    fmt::{writer::BoxMakeWriter, MakeWriter},
    layer::{Context, Layer},
};

use crate::LineLogger;

/// Number of records a [`LineProtocolLayer`] failed to write.
///
/// Obtained from [`LineProtocolLayer::write_failures`] before the layer is handed to a subscriber.
#[derive(Clone, Debug, Default)]
pub struct WriteFailures(Arc<AtomicU64>);

impl WriteFailures {
    /// Gets the number of failed writes so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// A [`Layer`] that writes every event it sees as one line-protocol record.
///
/// Each record is a metric named after the logger's metric name, with the event's level as the
/// `level` field, the event's message as the `msg` field, and every other event field as a field of
/// the same name. Span context is not recorded.
///
/// Write failures cannot be reported from inside a subscriber without recursing into it, so they
/// are counted instead. See [`write_failures`][Self::write_failures].
pub struct LineProtocolLayer<W = BoxMakeWriter> {
    logger: LineLogger<W>,
    failures: WriteFailures,
}

impl<W> LineProtocolLayer<W>
where
    W: for<'a> MakeWriter<'a>,
{
    /// Creates a new `LineProtocolLayer` that writes through `logger`.
    pub fn new(logger: LineLogger<W>) -> Self {
        Self { logger, failures: WriteFailures::default() }
    }

    /// Gets a handle to the number of records this layer failed to write.
    pub fn write_failures(&self) -> WriteFailures {
        self.failures.clone()
    }
}

impl<S, W> Layer<S> for LineProtocolLayer<W>
where
    S: Subscriber,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _cx: Context<'_, S>) {
        let level = level_name(event.metadata().level());
        let result = self.logger.emit(|encoder| {
            encoder.with_field("level", level);
            event.record(&mut FieldVisitor { encoder });
        });

        if result.is_err() {
            self.failures.increment();
        }
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

struct FieldVisitor<'e> {
    encoder: &'e mut MetricEncoder,
}

impl FieldVisitor<'_> {
    fn add(&mut self, field: &Field, value: Value<'_>) {
        let key = match field.name() {
            "message" => "msg",
            name => name,
        };
        self.encoder.with_field(key, value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.add(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.add(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.add(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.add(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.add(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        self.add(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.add(field, Value::Debug(value));
    }
}
