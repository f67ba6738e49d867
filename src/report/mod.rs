//! Reporting backends for test output.
//!
//! This module defines one narrow [`Reporter`] trait and two conforming
//! implementations, selected by [`ReporterKind`]:
//!
//! - [`FlatReporter`] - streaming TAP with a single global assertion sequence
//! - [`NestedReporter`] - buffered TAP where each test is an indented subtest
//!
//! The trait is the only surface the assertion facade talks to; everything a
//! test body does ends up as one of these calls.
//!
//! # Example
//!
//! ```rust
//! use asynctap::report::{Capture, ReporterKind};
//!
//! let capture = Capture::new();
//! let mut reporter = ReporterKind::Flat.build(Box::new(capture.clone()));
//! reporter.begin_test("example").unwrap();
//! reporter.comment("hello").unwrap();
//! assert!(capture.contents().contains("# hello"));
//! ```

use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Error;
use crate::fault::Fault;

mod flat;
mod nested;

pub use flat::FlatReporter;
pub use nested::NestedReporter;

/// Environment variable that selects the reporting backend.
pub const REPORTER_ENV: &str = "ASYNCTAP_REPORTER";

/// A single recorded assertion.
#[derive(Debug, Clone)]
pub struct Assertion {
    /// Whether the assertion passed.
    pub ok: bool,
    /// Operator name for diagnostics (`is`, `same`, `throws`, ...).
    pub operator: &'static str,
    /// Assertion message.
    pub message: String,
    /// Observed value, when one exists.
    pub actual: Option<Value>,
    /// Expected value, when one exists.
    pub expected: Option<Value>,
}

/// Pass/fail totals at the assertion level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Passing assertions.
    pub pass: usize,
    /// Failing assertions.
    pub fail: usize,
}

impl Counts {
    /// Total assertions recorded.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pass + self.fail
    }
}

/// The narrow reporting interface the assertion facade drives.
///
/// Implementations own the output sink and the TAP dialect; callers never
/// format output themselves.
pub trait Reporter: Send {
    /// A test with the given description is starting.
    fn begin_test(&mut self, name: &str) -> io::Result<()>;

    /// Record one assertion.
    fn assertion(&mut self, assertion: &Assertion) -> io::Result<()>;

    /// Emit a diagnostic comment.
    fn comment(&mut self, text: &str) -> io::Result<()>;

    /// The current test declared an expected assertion count.
    fn plan(&mut self, count: usize) -> io::Result<()>;

    /// A registered test was skipped without running.
    fn skip_test(&mut self, name: &str) -> io::Result<()>;

    /// The current test ended; `fault` carries a terminal failure, if any.
    fn end_test(&mut self, fault: Option<&Fault>) -> io::Result<()>;

    /// The whole run ended; emit the final plan and totals.
    fn end_run(&mut self) -> io::Result<()>;

    /// Assertion-level totals so far.
    fn counts(&self) -> Counts;
}

/// Which reporting backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReporterKind {
    /// Streaming tape-style output.
    #[default]
    Flat,
    /// Buffered subtest-style output.
    Nested,
}

impl ReporterKind {
    /// Read the kind from the [`REPORTER_ENV`] environment variable.
    ///
    /// An unset variable falls back to [`ReporterKind::Flat`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the variable is set to an
    /// unrecognized value.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var(REPORTER_ENV) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Build a reporter of this kind writing to `out`.
    #[must_use]
    pub fn build(self, out: Box<dyn Write + Send>) -> Box<dyn Reporter> {
        match self {
            Self::Flat => Box::new(FlatReporter::new(out)),
            Self::Nested => Box::new(NestedReporter::new(out)),
        }
    }
}

impl FromStr for ReporterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "nested" => Ok(Self::Nested),
            other => Err(Error::config(format!(
                "unknown reporter: {other} (expected \"flat\" or \"nested\")"
            ))),
        }
    }
}

/// Thread-safe handle sharing one reporter between the harness and contexts.
///
/// Sink write failures are sticky: the first one is kept and surfaced by
/// [`Harness::run`](crate::harness::Harness::run) after the run finishes, so
/// assertion calls themselves stay infallible.
#[derive(Clone)]
pub struct ReporterHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    reporter: Mutex<Box<dyn Reporter>>,
    io_error: Mutex<Option<io::Error>>,
}

impl ReporterHandle {
    /// Wrap a reporter in a shareable handle.
    #[must_use]
    pub fn new(reporter: Box<dyn Reporter>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                reporter: Mutex::new(reporter),
                io_error: Mutex::new(None),
            }),
        }
    }

    fn record(&self, result: io::Result<()>) {
        if let Err(err) = result {
            tracing::warn!(error = %err, "report sink write failed");
            let mut slot = self.inner.io_error.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }

    /// See [`Reporter::begin_test`].
    pub fn begin_test(&self, name: &str) {
        let result = self.inner.reporter.lock().begin_test(name);
        self.record(result);
    }

    /// See [`Reporter::assertion`].
    pub fn assertion(&self, assertion: &Assertion) {
        let result = self.inner.reporter.lock().assertion(assertion);
        self.record(result);
    }

    /// See [`Reporter::comment`].
    pub fn comment(&self, text: &str) {
        let result = self.inner.reporter.lock().comment(text);
        self.record(result);
    }

    /// See [`Reporter::plan`].
    pub fn plan(&self, count: usize) {
        let result = self.inner.reporter.lock().plan(count);
        self.record(result);
    }

    /// See [`Reporter::skip_test`].
    pub fn skip_test(&self, name: &str) {
        let result = self.inner.reporter.lock().skip_test(name);
        self.record(result);
    }

    /// See [`Reporter::end_test`].
    pub fn end_test(&self, fault: Option<&Fault>) {
        let result = self.inner.reporter.lock().end_test(fault);
        self.record(result);
    }

    /// See [`Reporter::end_run`].
    pub fn end_run(&self) {
        let result = self.inner.reporter.lock().end_run();
        self.record(result);
    }

    /// See [`Reporter::counts`].
    #[must_use]
    pub fn counts(&self) -> Counts {
        self.inner.reporter.lock().counts()
    }

    /// Take the first sink write failure, if any occurred.
    #[must_use]
    pub fn take_io_error(&self) -> Option<io::Error> {
        self.inner.io_error.lock().take()
    }
}

/// An in-memory output sink for inspecting TAP output.
///
/// Clones share the same buffer, so a clone can be handed to
/// [`Harness::pipe`](crate::harness::Harness::pipe) while the original is
/// kept for reading afterwards.
#[derive(Clone, Default)]
pub struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    /// Create an empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as a string.
    ///
    /// Reporters only ever write UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// The `ok` / `not ok` assertion lines written so far.
    #[must_use]
    pub fn assertion_lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .map(str::trim_start)
            .filter(|line| line.starts_with("ok ") || line.starts_with("not ok "))
            .map(ToOwned::to_owned)
            .collect()
    }
}

impl Write for Capture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Format one TAP assertion line. `dash` selects the `ok 1 - msg` dialect.
pub(crate) fn tap_line(ok: bool, number: usize, message: &str, dash: bool) -> String {
    let status = if ok { "ok" } else { "not ok" };
    let sep = if dash { " - " } else { " " };
    if message.is_empty() {
        format!("{status} {number}")
    } else {
        format!("{status} {number}{sep}{message}")
    }
}

/// YAML diagnostic block for a failing assertion, without indentation.
pub(crate) fn yaml_diag(assertion: &Assertion) -> Vec<String> {
    let mut lines = vec!["---".to_owned()];
    lines.push(format!("operator: {}", assertion.operator));
    if let Some(expected) = &assertion.expected {
        lines.push(format!("expected: {expected}"));
    }
    if let Some(actual) = &assertion.actual {
        lines.push(format!("actual:   {actual}"));
    }
    lines.push("...".to_owned());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_kind_from_str() {
        assert_eq!("flat".parse::<ReporterKind>().unwrap(), ReporterKind::Flat);
        assert_eq!(
            "nested".parse::<ReporterKind>().unwrap(),
            ReporterKind::Nested
        );
        assert!("xml".parse::<ReporterKind>().is_err());
    }

    #[test]
    fn test_reporter_kind_from_env() {
        std::env::set_var(REPORTER_ENV, "nested");
        assert_eq!(ReporterKind::from_env().unwrap(), ReporterKind::Nested);
        std::env::set_var(REPORTER_ENV, "xml");
        assert!(ReporterKind::from_env().is_err());
        std::env::remove_var(REPORTER_ENV);
        assert_eq!(ReporterKind::from_env().unwrap(), ReporterKind::Flat);
    }

    #[test]
    fn test_counts_total() {
        let counts = Counts { pass: 3, fail: 2 };
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn test_capture_shares_buffer_across_clones() {
        let capture = Capture::new();
        let mut writer = capture.clone();
        writer.write_all(b"ok 1 hello\n").unwrap();
        assert_eq!(capture.contents(), "ok 1 hello\n");
        assert_eq!(capture.assertion_lines(), vec!["ok 1 hello"]);
    }

    #[test]
    fn test_tap_line_dialects() {
        assert_eq!(tap_line(true, 1, "msg", false), "ok 1 msg");
        assert_eq!(tap_line(false, 2, "msg", true), "not ok 2 - msg");
        assert_eq!(tap_line(true, 3, "", true), "ok 3");
    }

    #[test]
    fn test_handle_keeps_first_io_error() {
        struct Failing;
        impl Reporter for Failing {
            fn begin_test(&mut self, _: &str) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "first"))
            }
            fn assertion(&mut self, _: &Assertion) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "second"))
            }
            fn comment(&mut self, _: &str) -> io::Result<()> {
                Ok(())
            }
            fn plan(&mut self, _: usize) -> io::Result<()> {
                Ok(())
            }
            fn skip_test(&mut self, _: &str) -> io::Result<()> {
                Ok(())
            }
            fn end_test(&mut self, _: Option<&Fault>) -> io::Result<()> {
                Ok(())
            }
            fn end_run(&mut self) -> io::Result<()> {
                Ok(())
            }
            fn counts(&self) -> Counts {
                Counts::default()
            }
        }

        let handle = ReporterHandle::new(Box::new(Failing));
        handle.begin_test("a");
        handle.assertion(&Assertion {
            ok: true,
            operator: "pass",
            message: String::new(),
            actual: None,
            expected: None,
        });
        let err = handle.take_io_error().unwrap();
        assert_eq!(err.to_string(), "first");
        assert!(handle.take_io_error().is_none());
    }
}
