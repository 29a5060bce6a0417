use std::{
    fmt, io,
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};

use line_metric_encoder::{FieldValue, Metric, MetricEncoder, MetricEncoderPool, Precision, Value};
use proptest::prelude::*;

#[derive(Debug)]
struct UploadFailed {
    reason: String,
}

impl fmt::Display for UploadFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload failed: {}", self.reason)
    }
}

impl std::error::Error for UploadFailed {}

/// Escapes a string the way string field values are escaped.
fn escape_string_field(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\x0c' => escaped.push_str("\\f"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[test]
fn test_log_record() {
    let pool = MetricEncoderPool::new();
    let mut out = Vec::new();

    pool.new_metric("log")
        .with_time(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        .with_field("level", "error")
        .with_field("msg", "disk full")
        .write(&mut out)
        .unwrap();

    assert_eq!(out, b"log level=\"error\",msg=\"disk full\" 1700000000000000000\n");
}

#[test]
fn test_error_and_display_fields() {
    let error = UploadFailed { reason: "bucket \"logs\" is gone".to_owned() };
    let addr = std::net::Ipv4Addr::new(10, 0, 0, 1);

    let mut metric = Metric::new("log");
    metric
        .with_time(UNIX_EPOCH)
        .with_field("err", Value::error(&error))
        .with_field("peer", Value::display(&addr))
        .with_field("retries", Value::debug(&[1, 2]));

    assert_eq!(
        metric.field("err"),
        Some(&FieldValue::String("upload failed: bucket \"logs\" is gone".to_owned()))
    );

    let mut encoder = MetricEncoder::new().with_precision(Precision::Seconds);
    let encoded = encoder.encode_metric(&metric).unwrap();
    assert_eq!(
        encoded,
        &b"log err=\"upload failed: bucket \\\"logs\\\" is gone\",peer=\"10.0.0.1\",retries=\"[1, 2]\" 0\n"[..]
    );
}

#[test]
fn test_shared_pool_between_threads() {
    const THREADS: usize = 8;
    const RECORDS: usize = 250;

    let pool = Arc::new(MetricEncoderPool::new());
    let handles = (0..THREADS)
        .map(|thread| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let mut out = Vec::new();
                for i in 0..RECORDS {
                    let mut encoder = pool.pull();
                    encoder
                        .begin("worker")
                        .with_time(UNIX_EPOCH)
                        .with_tag("thread", &thread.to_string())
                        .with_field("i", i as i64)
                        .write(&mut out)
                        .unwrap();
                }
                (thread, out)
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let (thread, out) = handle.join().unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), RECORDS);
        for (i, line) in lines.into_iter().enumerate() {
            assert_eq!(line, format!("worker,thread={thread} i={i}i 0"));
        }
    }

    assert!(pool.created() <= THREADS);
    assert_eq!(pool.idle(), pool.created());
}

#[test]
fn test_sink_error_reaches_caller() {
    struct Closed;

    impl io::Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let pool = MetricEncoderPool::new();
    let err = pool.new_metric("log").with_field("ok", true).write(&mut Closed).unwrap_err();
    match err {
        line_metric_encoder::Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected sink error, got {other:?}"),
    }
    assert_eq!(pool.idle(), 1);
}

proptest! {
    #[test]
    fn error_fields_are_stored_as_their_description(reason in "\\PC{0,40}") {
        let error = UploadFailed { reason };
        let mut metric = Metric::new("log");
        metric.with_time(UNIX_EPOCH).with_field("err", Value::error(&error));

        let mut encoder = MetricEncoder::new();
        let encoded = encoder.encode_metric(&metric).unwrap();
        let expected = format!("log err=\"{}\" 0\n", escape_string_field(&error.to_string()));
        prop_assert_eq!(encoded, expected.as_bytes());
    }
}
