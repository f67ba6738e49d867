//! Test registration and sequential execution.
//!
//! A [`Harness`] collects described async test bodies and drives them one at
//! a time on a current-thread tokio runtime. All output goes through the
//! configured [`Reporter`](crate::report::Reporter); [`Harness::pipe`] points
//! it at any writer.
//!
//! # Example
//!
//! ```rust
//! use asynctap::prelude::*;
//!
//! let mut harness = Harness::new();
//! harness.test("arithmetic", |t| async move {
//!     t.is(&(1 + 1), &2, "adds");
//!     Ok(())
//! });
//! harness.skip("network", |t| async move {
//!     t.pass("unreached");
//!     Ok(())
//! });
//! let summary = harness.run().unwrap();
//! assert_eq!(summary.exit_code(), 0);
//! ```

use std::future::Future;
use std::io::Write;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::adapter;
use crate::context::TestContext;
use crate::error::{Error, Result};
use crate::fault::Fault;
use crate::report::{ReporterHandle, ReporterKind};

type BodyFn = Box<dyn FnOnce(TestContext) -> LocalBoxFuture<'static, std::result::Result<(), Fault>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Only,
    Skip,
}

struct Entry {
    name: String,
    mode: Mode,
    body: BodyFn,
}

/// Collects async tests and runs them against one reporter.
pub struct Harness {
    reporter: ReporterKind,
    config_error: Option<Error>,
    writer: Option<Box<dyn Write + Send>>,
    entries: Vec<Entry>,
}

impl Harness {
    /// Create a harness with the reporter selected from the environment.
    ///
    /// An unrecognized reporter name is not swallowed: it is kept and
    /// surfaced as [`Error::Config`] by [`run`](Self::run).
    #[must_use]
    pub fn new() -> Self {
        match ReporterKind::from_env() {
            Ok(kind) => Self::with_reporter(kind),
            Err(err) => {
                let mut harness = Self::with_reporter(ReporterKind::default());
                harness.config_error = Some(err);
                harness
            }
        }
    }

    /// Create a harness with an explicit reporter kind.
    #[must_use]
    pub fn with_reporter(reporter: ReporterKind) -> Self {
        Self {
            reporter,
            config_error: None,
            writer: None,
            entries: Vec::new(),
        }
    }

    /// Send all TAP output to `writer` instead of stdout.
    pub fn pipe(&mut self, writer: impl Write + Send + 'static) -> &mut Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Register a test.
    pub fn test<F, Fut>(&mut self, name: impl Into<String>, body: F)
    where
        F: FnOnce(TestContext) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<(), Fault>> + 'static,
    {
        self.push(name.into(), Mode::Normal, body);
    }

    /// Register a test and run only `only`-marked tests this run.
    pub fn only<F, Fut>(&mut self, name: impl Into<String>, body: F)
    where
        F: FnOnce(TestContext) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<(), Fault>> + 'static,
    {
        self.push(name.into(), Mode::Only, body);
    }

    /// Register a test that is reported as skipped without running.
    pub fn skip<F, Fut>(&mut self, name: impl Into<String>, body: F)
    where
        F: FnOnce(TestContext) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<(), Fault>> + 'static,
    {
        self.push(name.into(), Mode::Skip, body);
    }

    fn push<F, Fut>(&mut self, name: String, mode: Mode, body: F)
    where
        F: FnOnce(TestContext) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<(), Fault>> + 'static,
    {
        self.entries.push(Entry {
            name,
            mode,
            body: Box::new(move |ctx| body(ctx).boxed_local()),
        });
    }

    /// Run every registered test in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the harness was built from an
    /// unrecognized reporter name, and [`Error::Io`] when the report sink
    /// rejected a write, after the run has finished.
    pub fn run(self) -> Result<Summary> {
        if let Some(err) = self.config_error {
            return Err(err);
        }
        let writer = self
            .writer
            .unwrap_or_else(|| Box::new(std::io::stdout()));
        let handle = ReporterHandle::new(self.reporter.build(writer));
        let has_only = self.entries.iter().any(|entry| entry.mode == Mode::Only);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let mut tests = 0;
        runtime.block_on(async {
            for entry in self.entries {
                match entry.mode {
                    Mode::Skip if has_only => {
                        tracing::debug!(test = %entry.name, "suppressed by only");
                    }
                    Mode::Skip => {
                        tracing::debug!(test = %entry.name, "skipped");
                        handle.skip_test(&entry.name);
                    }
                    Mode::Normal if has_only => {
                        tracing::debug!(test = %entry.name, "suppressed by only");
                    }
                    Mode::Normal | Mode::Only => {
                        tracing::debug!(test = %entry.name, "running");
                        tests += 1;
                        handle.begin_test(&entry.name);
                        let ctx = TestContext::new(handle.clone());
                        adapter::drive(ctx, entry.body).await;
                    }
                }
            }
        });
        handle.end_run();

        if let Some(err) = handle.take_io_error() {
            return Err(err.into());
        }
        let counts = handle.counts();
        Ok(Summary {
            tests,
            pass: counts.pass,
            fail: counts.fail,
        })
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals for one harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Tests that actually ran (skipped and only-suppressed tests excluded).
    pub tests: usize,
    /// Passing assertions.
    pub pass: usize,
    /// Failing assertions.
    pub fail: usize,
}

impl Summary {
    /// Process exit code: nonzero when anything failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.fail > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Capture;

    #[test]
    fn test_runs_in_registration_order() {
        let capture = Capture::new();
        let mut harness = Harness::with_reporter(ReporterKind::Flat);
        harness.pipe(capture.clone());
        harness.test("first", |t| async move {
            t.pass("from first");
            Ok(())
        });
        harness.test("second", |t| async move {
            t.pass("from second");
            Ok(())
        });
        let summary = harness.run().unwrap();

        assert_eq!(summary, Summary { tests: 2, pass: 2, fail: 0 });
        assert_eq!(
            capture.assertion_lines(),
            vec!["ok 1 from first", "ok 2 from second"]
        );
    }

    #[test]
    fn test_only_suppresses_other_tests() {
        let capture = Capture::new();
        let mut harness = Harness::with_reporter(ReporterKind::Flat);
        harness.pipe(capture.clone());
        harness.test("ignored", |t| async move {
            t.fail("must not run");
            Ok(())
        });
        harness.only("focused", |t| async move {
            t.pass("ran");
            Ok(())
        });
        let summary = harness.run().unwrap();

        assert_eq!(summary, Summary { tests: 1, pass: 1, fail: 0 });
        assert_eq!(capture.assertion_lines(), vec!["ok 1 ran"]);
    }

    #[test]
    fn test_only_suppresses_skip_directives_too() {
        let capture = Capture::new();
        let mut harness = Harness::with_reporter(ReporterKind::Flat);
        harness.pipe(capture.clone());
        harness.skip("postponed", |t| async move {
            t.fail("must not run");
            Ok(())
        });
        harness.only("focused", |t| async move {
            t.pass("ran");
            Ok(())
        });
        let summary = harness.run().unwrap();

        assert_eq!(summary, Summary { tests: 1, pass: 1, fail: 0 });
        assert!(!capture.contents().contains("postponed"));
    }

    #[test]
    fn test_skip_reports_directive_and_exit_code() {
        let capture = Capture::new();
        let mut harness = Harness::with_reporter(ReporterKind::Flat);
        harness.pipe(capture.clone());
        harness.skip("later", |t| async move {
            t.fail("must not run");
            Ok(())
        });
        harness.test("broken", |t| async move {
            t.fail("oops");
            Ok(())
        });
        let summary = harness.run().unwrap();

        assert_eq!(summary.tests, 1);
        assert_eq!(summary.fail, 1);
        assert_eq!(summary.exit_code(), 1);
        assert!(capture.contents().contains("ok 1 later # SKIP"));
    }

    #[test]
    fn test_broken_pipe_surfaces_as_error() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "sink closed",
                ))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut harness = Harness::with_reporter(ReporterKind::Flat);
        harness.pipe(Broken);
        harness.test("anything", |t| async move {
            t.pass("fine");
            Ok(())
        });
        let err = harness.run().unwrap_err();
        assert!(err.to_string().contains("sink closed"));
    }

    #[test]
    fn test_nested_reporter_end_to_end() {
        let capture = Capture::new();
        let mut harness = Harness::with_reporter(ReporterKind::Nested);
        harness.pipe(capture.clone());
        harness.test("outer", |t| async move {
            t.pass("inner");
            Ok(())
        });
        harness.run().unwrap();

        let output = capture.contents();
        assert!(output.contains("# Subtest: outer"));
        assert!(output.contains("    ok 1 - inner"));
        assert!(output.contains("\nok 1 - outer"));
    }
}
