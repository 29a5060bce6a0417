//! Line protocol serialization.
//!
//! A record is a single line of the form:
//!
//! ```text
//! <name>[,<tag_key>=<tag_value>...] <field_key>=<field_value>[,...] <timestamp>\n
//! ```
//!
//! Tags are written in key order, fields in insertion order. Escaping follows the rules used by
//! Telegraf and InfluxDB: names escape commas and spaces, tag keys/values and field keys additionally
//! escape equals signs, and string field values escape double quotes and backslashes.
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::metric::{FieldValue, Metric};

/// Errors that could occur while serializing a metric.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The metric name was empty after escaping.
    #[error("metric name must not be empty")]
    EmptyName,

    /// No field could be written for the metric.
    ///
    /// Either no fields were added, or every field held a value that cannot be represented, such as
    /// a NaN or infinite float.
    #[error("metric has no encodable fields")]
    NoFields,

    /// The encoded line exceeded the configured maximum line length.
    #[error("encoded line is {len} bytes, exceeding the maximum of {max} bytes")]
    LineTooLong {
        /// Length of the line that was rejected.
        len: usize,
        /// Configured maximum line length.
        max: usize,
    },
}

/// Timestamp precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    /// Nanoseconds since the Unix epoch.
    #[default]
    Nanoseconds,

    /// Microseconds since the Unix epoch.
    Microseconds,

    /// Milliseconds since the Unix epoch.
    Milliseconds,

    /// Seconds since the Unix epoch.
    Seconds,
}

impl Precision {
    const fn divisor(self) -> i128 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
        }
    }

    /// Converts a point in time into a timestamp at this precision.
    ///
    /// Times before the Unix epoch produce negative timestamps. Values outside of the `i64` range
    /// saturate.
    pub fn timestamp(self, time: SystemTime) -> i64 {
        let nanos = match time.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_nanos() as i128,
            Err(e) => -(e.duration().as_nanos() as i128),
        };

        let scaled = nanos / self.divisor();
        i64::try_from(scaled).unwrap_or(if scaled < 0 { i64::MIN } else { i64::MAX })
    }
}

/// Serializes metrics into line protocol.
///
/// The serializer holds no reference to its output: every call appends exactly one line to the
/// buffer it is handed, or nothing at all if the metric cannot be encoded.
pub struct Serializer {
    precision: Precision,
    max_line_bytes: Option<usize>,
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl Serializer {
    /// Creates a new `Serializer` with nanosecond precision and no line length limit.
    pub fn new() -> Self {
        Self {
            precision: Precision::Nanoseconds,
            max_line_bytes: None,
            int_writer: itoa::Buffer::new(),
            float_writer: ryu::Buffer::new(),
        }
    }

    /// Sets the timestamp precision.
    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Sets the maximum length of a single encoded line, including the trailing newline.
    ///
    /// `None` disables the limit.
    #[must_use]
    pub fn with_max_line_bytes(mut self, max_line_bytes: Option<usize>) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Returns the configured timestamp precision.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Sets the timestamp precision in place.
    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = precision;
    }

    /// Appends the line protocol encoding of `metric` to `buf`.
    ///
    /// Returns the number of bytes appended.
    ///
    /// # Errors
    ///
    /// If the metric cannot be encoded, an error is returned and `buf` is left exactly as it was
    /// before the call.
    pub fn serialize(&mut self, metric: &Metric, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let start = buf.len();
        let result = self.serialize_inner(metric, buf);
        match result {
            Ok(()) => {
                let len = buf.len() - start;
                match self.max_line_bytes {
                    Some(max) if len > max => {
                        buf.truncate(start);
                        Err(EncodeError::LineTooLong { len, max })
                    }
                    _ => Ok(len),
                }
            }
            Err(e) => {
                buf.truncate(start);
                Err(e)
            }
        }
    }

    fn serialize_inner(&mut self, metric: &Metric, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let name_start = buf.len();
        write_escaped(buf, strip_trailing_backslash(metric.name()), NAME_ESCAPES);
        if buf.len() == name_start {
            return Err(EncodeError::EmptyName);
        }

        for (key, value) in metric.tags() {
            let key = strip_trailing_backslash(key);
            let value = strip_trailing_backslash(value);
            if key.is_empty() || value.is_empty() {
                continue;
            }

            buf.push(b',');
            write_escaped(buf, key, KEY_ESCAPES);
            buf.push(b'=');
            write_escaped(buf, value, KEY_ESCAPES);
        }

        let mut wrote_field = false;
        for (key, value) in metric.fields() {
            let key = strip_trailing_backslash(key);
            if key.is_empty() || !is_representable(value) {
                continue;
            }

            // The first field is separated from the name and tags by a space, the rest by commas.
            buf.push(if wrote_field { b',' } else { b' ' });
            wrote_field = true;

            write_escaped(buf, key, KEY_ESCAPES);
            buf.push(b'=');
            self.write_field_value(buf, value);
        }

        if !wrote_field {
            return Err(EncodeError::NoFields);
        }

        buf.push(b' ');
        let timestamp = self.precision.timestamp(metric.time());
        buf.extend_from_slice(self.int_writer.format(timestamp).as_bytes());
        buf.push(b'\n');

        Ok(())
    }

    fn write_field_value(&mut self, buf: &mut Vec<u8>, value: &FieldValue) {
        match value {
            FieldValue::String(s) => {
                buf.push(b'"');
                write_escaped(buf, s, STRING_ESCAPES);
                buf.push(b'"');
            }
            FieldValue::Boolean(b) => {
                buf.extend_from_slice(if *b { &b"true"[..] } else { &b"false"[..] });
            }
            FieldValue::Integer(i) => {
                buf.extend_from_slice(self.int_writer.format(*i).as_bytes());
                buf.push(b'i');
            }
            FieldValue::Float(f) => {
                buf.extend_from_slice(self.float_writer.format_finite(*f).as_bytes());
            }
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer::new()
    }
}

type Escapes = &'static [(u8, &'static [u8])];

const CONTROL_ESCAPES: [(u8, &[u8]); 4] =
    [(b'\t', b"\\t"), (b'\n', b"\\n"), (b'\x0c', b"\\f"), (b'\r', b"\\r")];

const NAME_ESCAPES: Escapes = &[
    CONTROL_ESCAPES[0],
    CONTROL_ESCAPES[1],
    CONTROL_ESCAPES[2],
    CONTROL_ESCAPES[3],
    (b',', b"\\,"),
    (b' ', b"\\ "),
];

const KEY_ESCAPES: Escapes = &[
    CONTROL_ESCAPES[0],
    CONTROL_ESCAPES[1],
    CONTROL_ESCAPES[2],
    CONTROL_ESCAPES[3],
    (b',', b"\\,"),
    (b' ', b"\\ "),
    (b'=', b"\\="),
];

const STRING_ESCAPES: Escapes = &[
    CONTROL_ESCAPES[0],
    CONTROL_ESCAPES[1],
    CONTROL_ESCAPES[2],
    CONTROL_ESCAPES[3],
    (b'"', b"\\\""),
    (b'\\', b"\\\\"),
];

fn write_escaped(buf: &mut Vec<u8>, s: &str, escapes: Escapes) {
    let bytes = s.as_bytes();

    // Copy unescaped runs in bulk, only stopping at bytes that need a replacement. Every escaped
    // byte is ASCII, so this never splits a multi-byte character.
    let mut run_start = 0;
    for (i, byte) in bytes.iter().enumerate() {
        if let Some((_, replacement)) = escapes.iter().find(|(b, _)| b == byte) {
            buf.extend_from_slice(&bytes[run_start..i]);
            buf.extend_from_slice(replacement);
            run_start = i + 1;
        }
    }
    buf.extend_from_slice(&bytes[run_start..]);
}

fn strip_trailing_backslash(s: &str) -> &str {
    s.trim_end_matches('\\')
}

fn is_representable(value: &FieldValue) -> bool {
    match value {
        FieldValue::Float(f) => f.is_finite(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::{EncodeError, Precision, Serializer};
    use crate::metric::Metric;

    fn at(nanos: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(nanos)
    }

    fn serialize(serializer: &mut Serializer, metric: &Metric) -> Result<String, EncodeError> {
        let mut buf = Vec::new();
        serializer.serialize(metric, &mut buf)?;
        Ok(String::from_utf8(buf).expect("line protocol output should be valid UTF-8"))
    }

    #[test]
    fn field_types() {
        // Cases are defined as: metric builder, expected output.
        let cases: [(fn(&mut Metric), &str); 6] = [
            (|m| { m.with_field("value", 42i64); }, "m value=42i 1000\n"),
            (|m| { m.with_field("value", -7i32); }, "m value=-7i 1000\n"),
            (|m| { m.with_field("value", u64::MAX); }, "m value=9223372036854775807i 1000\n"),
            (|m| { m.with_field("value", 3.25); }, "m value=3.25 1000\n"),
            (|m| { m.with_field("value", false); }, "m value=false 1000\n"),
            (|m| { m.with_field("value", "hi"); }, "m value=\"hi\" 1000\n"),
        ];

        let mut serializer = Serializer::new();
        for (build, expected) in cases {
            let mut metric = Metric::new("m");
            metric.with_time(at(1000));
            build(&mut metric);

            assert_eq!(serialize(&mut serializer, &metric).unwrap(), expected);
        }
    }

    #[test]
    fn tags_are_sorted_and_escaped() {
        let mut metric = Metric::new("cpu load");
        metric
            .with_time(at(1))
            .with_tag("zone", "us east")
            .with_tag("host", "a,b=c")
            .with_field("usage", 0.5);

        let actual = serialize(&mut Serializer::new(), &metric).unwrap();
        assert_eq!(actual, "cpu\\ load,host=a\\,b\\=c,zone=us\\ east usage=0.5 1\n");
    }

    #[test]
    fn string_fields_are_escaped() {
        let mut metric = Metric::new("log");
        metric.with_time(at(5)).with_field("msg", "say \"hi\"\\\nbye");

        let actual = serialize(&mut Serializer::new(), &metric).unwrap();
        assert_eq!(actual, "log msg=\"say \\\"hi\\\"\\\\\\nbye\" 5\n");
    }

    #[test]
    fn field_keys_escape_equals() {
        let mut metric = Metric::new("log");
        metric.with_time(at(5)).with_field("a=b c", 1i64);

        let actual = serialize(&mut Serializer::new(), &metric).unwrap();
        assert_eq!(actual, "log a\\=b\\ c=1i 5\n");
    }

    #[test]
    fn empty_tags_and_trailing_backslashes_are_dropped() {
        let mut metric = Metric::new("log");
        metric
            .with_time(at(5))
            .with_tag("empty", "")
            .with_tag("path", "c:\\")
            .with_tag("\\", "x")
            .with_field("ok", true);

        let actual = serialize(&mut Serializer::new(), &metric).unwrap();
        assert_eq!(actual, "log,path=c: ok=true 5\n");
    }

    #[test]
    fn non_finite_floats_are_skipped() {
        let mut metric = Metric::new("log");
        metric
            .with_time(at(5))
            .with_field("nan", f64::NAN)
            .with_field("ok", true)
            .with_field("inf", f64::INFINITY);

        let actual = serialize(&mut Serializer::new(), &metric).unwrap();
        assert_eq!(actual, "log ok=true 5\n");

        let mut metric = Metric::new("log");
        metric.with_field("nan", f64::NAN);

        let mut buf = b"keep".to_vec();
        let result = Serializer::new().serialize(&metric, &mut buf);
        assert_eq!(result, Err(EncodeError::NoFields));
        assert_eq!(buf, b"keep");
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut metric = Metric::new("");
        metric.with_field("ok", true);

        assert_eq!(serialize(&mut Serializer::new(), &metric), Err(EncodeError::EmptyName));
    }

    #[test]
    fn trailing_backslashes_are_stripped_from_name() {
        // Cases are defined as: metric name, expected output.
        let cases = [
            ("app\\", Ok("app,host=a ok=true 0\n".to_owned())),
            ("app\\\\", Ok("app,host=a ok=true 0\n".to_owned())),
            ("a\\pp", Ok("a\\pp,host=a ok=true 0\n".to_owned())),
            ("\\", Err(EncodeError::EmptyName)),
        ];

        for (name, expected) in cases {
            let mut metric = Metric::new(name);
            metric.with_time(at(0)).with_tag("host", "a").with_field("ok", true);
            assert_eq!(serialize(&mut Serializer::new(), &metric), expected, "name: {name:?}");
        }
    }

    #[test]
    fn max_line_bytes() {
        let mut metric = Metric::new("log");
        metric.with_time(at(5)).with_field("msg", "0123456789");

        let mut serializer = Serializer::new().with_max_line_bytes(Some(16));
        let mut buf = Vec::new();
        let result = serializer.serialize(&metric, &mut buf);
        assert_eq!(result, Err(EncodeError::LineTooLong { len: 23, max: 16 }));
        assert!(buf.is_empty());

        let mut serializer = Serializer::new().with_max_line_bytes(None);
        assert_eq!(serializer.serialize(&metric, &mut buf), Ok(23));
    }

    #[test]
    fn precision() {
        let time = at(1_600_000_000_123_456_789);

        // Cases are defined as: precision, expected timestamp.
        let cases = [
            (Precision::Nanoseconds, 1_600_000_000_123_456_789),
            (Precision::Microseconds, 1_600_000_000_123_456),
            (Precision::Milliseconds, 1_600_000_000_123),
            (Precision::Seconds, 1_600_000_000),
        ];

        for (precision, expected) in cases {
            assert_eq!(precision.timestamp(time), expected);
        }

        let before_epoch = UNIX_EPOCH - Duration::from_secs(2);
        assert_eq!(Precision::Seconds.timestamp(before_epoch), -2);
    }
}
