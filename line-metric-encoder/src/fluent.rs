//! Builders for conditionally adding a single field or tag.
//!
//! These exist for call sites where the value comes out of a fallible operation:
//!
//! ```
//! # use line_metric_encoder::Metric;
//! let mut metric = Metric::new("sensor");
//! metric
//!     .build_field("temperature")
//!     .value_if_ok("21.5".parse::<f64>())
//!     .build_tag("unit")
//!     .value("celsius");
//! assert!(metric.has_fields());
//! ```
use crate::metric::{Metric, Value};

/// Builder for a single field on a [`Metric`].
pub struct FieldBuilder<'m, 'k> {
    metric: &'m mut Metric,
    key: &'k str,
}

impl<'m, 'k> FieldBuilder<'m, 'k> {
    /// Adds the field with the given value.
    pub fn value<'v, V>(self, value: V) -> &'m mut Metric
    where
        V: Into<Value<'v>>,
    {
        self.metric.with_field(self.key, value)
    }

    /// Adds the field only if `result` holds a value.
    ///
    /// When `result` is an error, the metric is returned unchanged.
    pub fn value_if_ok<'v, V, E>(self, result: Result<V, E>) -> &'m mut Metric
    where
        V: Into<Value<'v>>,
    {
        match result {
            Ok(value) => self.value(value),
            Err(_) => self.metric,
        }
    }
}

/// Builder for a single tag on a [`Metric`].
pub struct TagBuilder<'m, 'k> {
    metric: &'m mut Metric,
    key: &'k str,
}

impl<'m, 'k> TagBuilder<'m, 'k> {
    /// Adds the tag with the given value.
    pub fn value(self, value: &str) -> &'m mut Metric {
        self.metric.with_tag(self.key, value)
    }

    /// Adds the tag only if `result` holds a value.
    ///
    /// When `result` is an error, the metric is returned unchanged.
    pub fn value_if_ok<S, E>(self, result: Result<S, E>) -> &'m mut Metric
    where
        S: AsRef<str>,
    {
        match result {
            Ok(value) => self.metric.with_tag(self.key, value.as_ref()),
            Err(_) => self.metric,
        }
    }
}

impl Metric {
    /// Starts building a field with the given key.
    pub fn build_field<'m, 'k>(&'m mut self, key: &'k str) -> FieldBuilder<'m, 'k> {
        FieldBuilder { metric: self, key }
    }

    /// Starts building a tag with the given key.
    pub fn build_tag<'m, 'k>(&'m mut self, key: &'k str) -> TagBuilder<'m, 'k> {
        TagBuilder { metric: self, key }
    }
}
