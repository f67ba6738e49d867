//! Streaming flat TAP reporter.

use std::io::{self, Write};

use crate::fault::Fault;

use super::{tap_line, yaml_diag, Assertion, Counts, Reporter};

/// Emits TAP lines as they happen, with one global assertion sequence.
///
/// Output shape:
///
/// ```text
/// TAP version 13
/// # first test
/// ok 1 starts up
/// not ok 2 answers
///   ---
///   operator: is
///   expected: 42
///   actual:   41
///   ...
///
/// 1..2
/// # tests 2
/// # pass  1
/// # fail  1
/// ```
pub struct FlatReporter {
    out: Box<dyn Write + Send>,
    versioned: bool,
    count: usize,
    counts: Counts,
}

impl FlatReporter {
    /// Create a flat reporter writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            versioned: false,
            count: 0,
            counts: Counts::default(),
        }
    }

    fn version(&mut self) -> io::Result<()> {
        if !self.versioned {
            self.versioned = true;
            writeln!(self.out, "TAP version 13")?;
        }
        Ok(())
    }

    fn emit(&mut self, assertion: &Assertion) -> io::Result<()> {
        self.count += 1;
        if assertion.ok {
            self.counts.pass += 1;
        } else {
            self.counts.fail += 1;
        }
        writeln!(
            self.out,
            "{}",
            tap_line(assertion.ok, self.count, &assertion.message, false)
        )?;
        if !assertion.ok {
            for line in yaml_diag(assertion) {
                writeln!(self.out, "  {line}")?;
            }
        }
        Ok(())
    }
}

impl Reporter for FlatReporter {
    fn begin_test(&mut self, name: &str) -> io::Result<()> {
        self.version()?;
        writeln!(self.out, "# {name}")
    }

    fn assertion(&mut self, assertion: &Assertion) -> io::Result<()> {
        self.version()?;
        self.emit(assertion)
    }

    fn comment(&mut self, text: &str) -> io::Result<()> {
        self.version()?;
        writeln!(self.out, "# {text}")
    }

    fn plan(&mut self, _count: usize) -> io::Result<()> {
        // The final 1..N line covers the whole run; per-test plans are
        // enforced by the context, not printed here.
        Ok(())
    }

    fn skip_test(&mut self, name: &str) -> io::Result<()> {
        self.version()?;
        self.count += 1;
        self.counts.pass += 1;
        writeln!(self.out, "ok {} {name} # SKIP", self.count)
    }

    fn end_test(&mut self, fault: Option<&Fault>) -> io::Result<()> {
        if let Some(fault) = fault {
            self.emit(&Assertion {
                ok: false,
                operator: "error",
                message: fault.message.clone(),
                actual: Some(fault.to_value()),
                expected: None,
            })?;
        }
        Ok(())
    }

    fn end_run(&mut self) -> io::Result<()> {
        self.version()?;
        writeln!(self.out)?;
        writeln!(self.out, "1..{}", self.count)?;
        writeln!(self.out, "# tests {}", self.count)?;
        writeln!(self.out, "# pass  {}", self.counts.pass)?;
        if self.counts.fail > 0 {
            writeln!(self.out, "# fail  {}", self.counts.fail)?;
        } else {
            writeln!(self.out, "# ok")?;
        }
        self.out.flush()
    }

    fn counts(&self) -> Counts {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Capture;
    use serde_json::json;

    fn reporter(capture: &Capture) -> FlatReporter {
        FlatReporter::new(Box::new(capture.clone()))
    }

    fn passing(message: &str) -> Assertion {
        Assertion {
            ok: true,
            operator: "pass",
            message: message.to_owned(),
            actual: None,
            expected: None,
        }
    }

    #[test]
    fn test_version_line_emitted_once() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("a").unwrap();
        reporter.comment("b").unwrap();
        let output = capture.contents();
        assert_eq!(output.matches("TAP version 13").count(), 1);
    }

    #[test]
    fn test_global_numbering_across_tests() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("first").unwrap();
        reporter.assertion(&passing("one")).unwrap();
        reporter.end_test(None).unwrap();
        reporter.begin_test("second").unwrap();
        reporter.assertion(&passing("two")).unwrap();
        reporter.end_test(None).unwrap();
        reporter.end_run().unwrap();

        let output = capture.contents();
        assert!(output.contains("ok 1 one"));
        assert!(output.contains("ok 2 two"));
        assert!(output.contains("1..2"));
        assert!(output.contains("# ok"));
    }

    #[test]
    fn test_failure_diagnostics() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter
            .assertion(&Assertion {
                ok: false,
                operator: "is",
                message: "answers".to_owned(),
                actual: Some(json!(41)),
                expected: Some(json!(42)),
            })
            .unwrap();
        reporter.end_run().unwrap();

        let output = capture.contents();
        assert!(output.contains("not ok 1 answers"));
        assert!(output.contains("  operator: is"));
        assert!(output.contains("  expected: 42"));
        assert!(output.contains("  actual:   41"));
        assert!(output.contains("# fail  1"));
        assert_eq!(reporter.counts(), Counts { pass: 0, fail: 1 });
    }

    #[test]
    fn test_end_test_fault_becomes_failure() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("boom").unwrap();
        reporter.end_test(Some(&Fault::new("exploded"))).unwrap();
        assert!(capture.contents().contains("not ok 1 exploded"));
    }

    #[test]
    fn test_skip_counts_as_pass() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.skip_test("later").unwrap();
        assert!(capture.contents().contains("ok 1 later # SKIP"));
        assert_eq!(reporter.counts(), Counts { pass: 1, fail: 0 });
    }
}
