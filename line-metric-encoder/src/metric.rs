use std::{error::Error as StdError, fmt, time::SystemTime};

/// A field value as it is stored on a metric.
///
/// Field values are normalized into one of these four kinds when they are added to a [`Metric`],
/// so the serializer never has to inspect arbitrary types.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A string value.
    String(String),

    /// A boolean value.
    Boolean(bool),

    /// A signed integer value.
    Integer(i64),

    /// A floating-point value.
    Float(f64),
}

/// A borrowed value handed to a metric or logger.
///
/// `Value` is the open-ended input side of [`FieldValue`]: besides the primitive kinds, it can carry
/// errors and anything implementing [`Display`][fmt::Display] or [`Debug`][fmt::Debug]. Those are
/// rendered to text when the value is stored.
#[derive(Clone, Copy)]
pub enum Value<'a> {
    /// A string slice.
    Str(&'a str),

    /// A boolean.
    Bool(bool),

    /// A signed integer.
    Int(i64),

    /// An unsigned integer.
    ///
    /// Values larger than `i64::MAX` are clamped when stored.
    UInt(u64),

    /// A floating-point number.
    Float(f64),

    /// An error, stored as its description.
    Error(&'a (dyn StdError + 'a)),

    /// A value stored via its `Display` implementation.
    Display(&'a (dyn fmt::Display + 'a)),

    /// A value stored via its `Debug` implementation.
    Debug(&'a (dyn fmt::Debug + 'a)),
}

impl<'a> Value<'a> {
    /// Creates a `Value` from an error.
    pub fn error<E: StdError + 'a>(error: &'a E) -> Self {
        Value::Error(error)
    }

    /// Creates a `Value` from anything implementing `Display`.
    pub fn display<T: fmt::Display + 'a>(value: &'a T) -> Self {
        Value::Display(value)
    }

    /// Creates a `Value` from anything implementing `Debug`.
    pub fn debug<T: fmt::Debug + 'a>(value: &'a T) -> Self {
        Value::Debug(value)
    }

    /// Returns the string slice if this value is textual.
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Str(s) => Some(*s),
            _ => None,
        }
    }

    pub(crate) fn normalize(self) -> FieldValue {
        match self {
            Value::Str(s) => FieldValue::String(s.to_owned()),
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Int(i) => FieldValue::Integer(i),
            Value::UInt(u) => FieldValue::Integer(i64::try_from(u).unwrap_or(i64::MAX)),
            Value::Float(f) => FieldValue::Float(f),
            Value::Error(e) => FieldValue::String(e.to_string()),
            Value::Display(d) => FieldValue::String(d.to_string()),
            Value::Debug(d) => FieldValue::String(format!("{d:?}")),
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Error(e) => write!(f, "{e}"),
            Value::Display(d) => write!(f, "{d}"),
            Value::Debug(d) => write!(f, "{d:?}"),
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::UInt(u) => f.debug_tuple("UInt").field(u).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Error(e) => f.debug_tuple("Error").field(&format_args!("{e}")).finish(),
            Value::Display(d) => f.debug_tuple("Display").field(&format_args!("{d}")).finish(),
            Value::Debug(d) => f.debug_tuple("Debug").field(d).finish(),
        }
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Str(s)
    }
}

impl<'a> From<&'a String> for Value<'a> {
    fn from(s: &'a String) -> Self {
        Value::Str(s.as_str())
    }
}

impl<'a, 'b: 'a> From<&'a (dyn StdError + 'b)> for Value<'a> {
    fn from(e: &'a (dyn StdError + 'b)) -> Self {
        Value::Error(e)
    }
}

impl<'a, 'b: 'a> From<&'a (dyn StdError + Send + Sync + 'b)> for Value<'a> {
    fn from(e: &'a (dyn StdError + Send + Sync + 'b)) -> Self {
        Value::Error(e)
    }
}

impl<'a> From<&'a std::io::Error> for Value<'a> {
    fn from(e: &'a std::io::Error) -> Self {
        Value::Error(e)
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f32> for Value<'_> {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value<'_> {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

macro_rules! impl_from_signed {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value<'_> {
                fn from(i: $ty) -> Self {
                    Value::Int(i as i64)
                }
            }
        )*
    };
}

macro_rules! impl_from_unsigned {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value<'_> {
                fn from(u: $ty) -> Self {
                    Value::UInt(u as u64)
                }
            }
        )*
    };
}

impl_from_signed!(i8, i16, i32, i64, isize);
impl_from_unsigned!(u8, u16, u32, u64, usize);

/// A single record: a name, a timestamp, tags, and fields.
///
/// Tags are kept sorted by key; adding a tag whose key already exists replaces its value. Fields
/// keep their insertion order; adding a field whose key already exists replaces its value in
/// place. Entries with an empty key are ignored.
///
/// A metric needs at least one field to be encodable.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    name: String,
    time: SystemTime,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
}

impl Metric {
    /// Creates a new `Metric` with the given name, timestamped with the current time.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Metric { name: name.into(), time: SystemTime::now(), tags: Vec::new(), fields: Vec::new() }
    }

    /// Resets this metric to a fresh state with the given name and the current time.
    ///
    /// All tags and fields are removed, but the underlying allocations are kept for reuse.
    pub fn reset(&mut self, name: &str) {
        self.name.clear();
        self.name.push_str(name);
        self.time = SystemTime::now();
        self.tags.clear();
        self.fields.clear();
    }

    /// Overrides the timestamp of this metric.
    pub fn with_time(&mut self, time: SystemTime) -> &mut Self {
        self.time = time;
        self
    }

    /// Adds a tag.
    pub fn with_tag(&mut self, key: &str, value: &str) -> &mut Self {
        if key.is_empty() {
            return self;
        }

        match self.tags.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
            Ok(idx) => {
                let existing = &mut self.tags[idx].1;
                existing.clear();
                existing.push_str(value);
            }
            Err(idx) => self.tags.insert(idx, (key.to_owned(), value.to_owned())),
        }
        self
    }

    /// Adds a field.
    ///
    /// Errors and other non-primitive values are converted to their textual representation here,
    /// before they are stored.
    pub fn with_field<'v, V>(&mut self, key: &str, value: V) -> &mut Self
    where
        V: Into<Value<'v>>,
    {
        if key.is_empty() {
            return self;
        }

        let value = value.into().normalize();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key.to_owned(), value)),
        }
        self
    }

    /// Name of this metric.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Timestamp of this metric.
    pub fn time(&self) -> SystemTime {
        self.time
    }

    /// Iterates over the tags of this metric, in key order.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over the fields of this metric, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Gets the value of the given tag, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|idx| self.tags[idx].1.as_str())
    }

    /// Gets the value of the given field, if present.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns `true` if this metric has any fields.
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fmt, io,
        time::{Duration, UNIX_EPOCH},
    };

    use super::{FieldValue, Metric, Value};

    #[derive(Debug)]
    struct DiskFull;

    impl fmt::Display for DiskFull {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("disk full")
        }
    }

    impl std::error::Error for DiskFull {}

    #[test]
    fn tags_sorted_last_write_wins() {
        let mut metric = Metric::new("m");
        metric.with_tag("zone", "a").with_tag("host", "h1").with_tag("zone", "b").with_tag("", "x");

        let tags = metric.tags().collect::<Vec<_>>();
        assert_eq!(tags, vec![("host", "h1"), ("zone", "b")]);
        assert_eq!(metric.tag("zone"), Some("b"));
        assert_eq!(metric.tag("missing"), None);
    }

    #[test]
    fn fields_keep_insertion_order() {
        let mut metric = Metric::new("m");
        metric.with_field("b", 1i64).with_field("a", true).with_field("b", 2.5).with_field("", 3i64);

        let fields = metric.fields().collect::<Vec<_>>();
        assert_eq!(fields, vec![("b", &FieldValue::Float(2.5)), ("a", &FieldValue::Boolean(true))]);
    }

    #[test]
    fn errors_are_normalized_to_text() {
        let io_error = io::Error::new(io::ErrorKind::Other, "permission denied");
        let custom: Box<dyn std::error::Error + Send + Sync> = Box::new(DiskFull);

        let mut metric = Metric::new("m");
        metric
            .with_field("io", &io_error)
            .with_field("custom", Value::error(&DiskFull))
            .with_field("boxed", custom.as_ref());

        assert_eq!(metric.field("io"), Some(&FieldValue::String("permission denied".to_owned())));
        assert_eq!(metric.field("custom"), Some(&FieldValue::String("disk full".to_owned())));
        assert_eq!(metric.field("boxed"), Some(&FieldValue::String("disk full".to_owned())));
    }

    #[test]
    fn value_normalization() {
        let path = std::path::Path::new("/tmp/x");
        let shown = path.display();
        let list = vec![1, 2];

        // Cases are defined as: input value, expected stored value.
        let cases = [
            (Value::from("text"), FieldValue::String("text".to_owned())),
            (Value::from(true), FieldValue::Boolean(true)),
            (Value::from(-3i8), FieldValue::Integer(-3)),
            (Value::from(7usize), FieldValue::Integer(7)),
            (Value::from(u64::MAX), FieldValue::Integer(i64::MAX)),
            (Value::from(1.5f32), FieldValue::Float(1.5)),
            (Value::display(&shown), FieldValue::String("/tmp/x".to_owned())),
            (Value::debug(&list), FieldValue::String("[1, 2]".to_owned())),
        ];

        for (input, expected) in cases {
            assert_eq!(input.normalize(), expected);
        }
    }

    #[test]
    fn reset_clears_state() {
        let mut metric = Metric::new("first");
        metric.with_time(UNIX_EPOCH).with_tag("host", "a").with_field("count", 1i64);

        metric.reset("second");
        assert_eq!(metric.name(), "second");
        assert_eq!(metric.tags().count(), 0);
        assert!(!metric.has_fields());
        assert!(metric.time() > UNIX_EPOCH + Duration::from_secs(1));
    }
}
