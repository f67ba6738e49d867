//! Buffered subtest TAP reporter.

use std::io::{self, Write};

use crate::fault::Fault;

use super::{tap_line, yaml_diag, Assertion, Counts, Reporter};

/// Buffers each test's assertions and flushes them as an indented subtest.
///
/// Output shape:
///
/// ```text
/// TAP version 13
/// # Subtest: first test
///     ok 1 - starts up
///     1..1
/// ok 1 - first test
///
/// 1..1
/// # tests 1
/// # pass  1
/// # ok
/// ```
pub struct NestedReporter {
    out: Box<dyn Write + Send>,
    versioned: bool,
    current: Option<Subtest>,
    tests: usize,
    counts: Counts,
}

struct Subtest {
    name: String,
    lines: Vec<String>,
    count: usize,
    failed: usize,
}

impl NestedReporter {
    /// Create a nested reporter writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            versioned: false,
            current: None,
            tests: 0,
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

    fn buffer(&mut self, assertion: &Assertion) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.count += 1;
        if assertion.ok {
            self.counts.pass += 1;
        } else {
            self.counts.fail += 1;
            current.failed += 1;
        }
        current.lines.push(tap_line(
            assertion.ok,
            current.count,
            &assertion.message,
            true,
        ));
        if !assertion.ok {
            for line in yaml_diag(assertion) {
                current.lines.push(format!("  {line}"));
            }
        }
    }

    fn flush_subtest(&mut self) -> io::Result<()> {
        let Some(current) = self.current.take() else {
            return Ok(());
        };
        self.tests += 1;
        writeln!(self.out, "# Subtest: {}", current.name)?;
        for line in &current.lines {
            writeln!(self.out, "    {line}")?;
        }
        writeln!(self.out, "    1..{}", current.count)?;
        writeln!(
            self.out,
            "{}",
            tap_line(current.failed == 0, self.tests, &current.name, true)
        )
    }
}

impl Reporter for NestedReporter {
    fn begin_test(&mut self, name: &str) -> io::Result<()> {
        self.version()?;
        self.current = Some(Subtest {
            name: name.to_owned(),
            lines: Vec::new(),
            count: 0,
            failed: 0,
        });
        Ok(())
    }

    fn assertion(&mut self, assertion: &Assertion) -> io::Result<()> {
        if self.current.is_some() {
            self.buffer(assertion);
            return Ok(());
        }
        // No open subtest: a late assertion lands at the parent level so it
        // still shows in the output and the counts.
        self.version()?;
        self.tests += 1;
        if assertion.ok {
            self.counts.pass += 1;
        } else {
            self.counts.fail += 1;
        }
        writeln!(
            self.out,
            "{}",
            tap_line(assertion.ok, self.tests, &assertion.message, true)
        )?;
        if !assertion.ok {
            for line in yaml_diag(assertion) {
                writeln!(self.out, "  {line}")?;
            }
        }
        Ok(())
    }

    fn comment(&mut self, text: &str) -> io::Result<()> {
        match self.current.as_mut() {
            Some(current) => {
                current.lines.push(format!("# {text}"));
                Ok(())
            }
            None => {
                self.version()?;
                writeln!(self.out, "# {text}")
            }
        }
    }

    fn plan(&mut self, _count: usize) -> io::Result<()> {
        // Each subtest gets its 1..N from the buffered count at flush time.
        Ok(())
    }

    fn skip_test(&mut self, name: &str) -> io::Result<()> {
        self.version()?;
        self.tests += 1;
        self.counts.pass += 1;
        writeln!(self.out, "ok {} - {name} # SKIP", self.tests)
    }

    fn end_test(&mut self, fault: Option<&Fault>) -> io::Result<()> {
        if let Some(fault) = fault {
            self.buffer(&Assertion {
                ok: false,
                operator: "error",
                message: fault.message.clone(),
                actual: Some(fault.to_value()),
                expected: None,
            });
        }
        self.flush_subtest()
    }

    fn end_run(&mut self) -> io::Result<()> {
        self.version()?;
        writeln!(self.out)?;
        writeln!(self.out, "1..{}", self.tests)?;
        writeln!(self.out, "# tests {}", self.counts.total())?;
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

    fn reporter(capture: &Capture) -> NestedReporter {
        NestedReporter::new(Box::new(capture.clone()))
    }

    #[test]
    fn test_subtest_block_layout() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("first test").unwrap();
        reporter
            .assertion(&Assertion {
                ok: true,
                operator: "pass",
                message: "starts up".to_owned(),
                actual: None,
                expected: None,
            })
            .unwrap();
        reporter.end_test(None).unwrap();
        reporter.end_run().unwrap();

        let output = capture.contents();
        assert!(output.contains("# Subtest: first test"));
        assert!(output.contains("    ok 1 - starts up"));
        assert!(output.contains("    1..1"));
        assert!(output.contains("\nok 1 - first test"));
        assert!(output.contains("# ok"));
    }

    #[test]
    fn test_child_failure_fails_parent_line() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("broken").unwrap();
        reporter
            .assertion(&Assertion {
                ok: false,
                operator: "is",
                message: "answers".to_owned(),
                actual: Some(json!(41)),
                expected: Some(json!(42)),
            })
            .unwrap();
        reporter.end_test(None).unwrap();
        reporter.end_run().unwrap();

        let output = capture.contents();
        assert!(output.contains("    not ok 1 - answers"));
        assert!(output.contains("      operator: is"));
        assert!(output.contains("\nnot ok 1 - broken"));
        assert_eq!(reporter.counts(), Counts { pass: 0, fail: 1 });
    }

    #[test]
    fn test_end_test_fault_appended_to_subtest() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("boom").unwrap();
        reporter.end_test(Some(&Fault::new("exploded"))).unwrap();
        let output = capture.contents();
        assert!(output.contains("    not ok 1 - exploded"));
        assert!(output.contains("\nnot ok 1 - boom"));
    }

    #[test]
    fn test_comment_inside_subtest_is_buffered() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("chatty").unwrap();
        reporter.comment("checking things").unwrap();
        assert!(!capture.contents().contains("checking things"));
        reporter.end_test(None).unwrap();
        assert!(capture.contents().contains("    # checking things"));
    }

    #[test]
    fn test_late_assertion_lands_at_parent_level() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.begin_test("done").unwrap();
        reporter.end_test(None).unwrap();
        reporter
            .assertion(&Assertion {
                ok: false,
                operator: "after-end",
                message: "late failure".to_owned(),
                actual: None,
                expected: None,
            })
            .unwrap();
        assert!(capture.contents().contains("not ok 2 - late failure"));
        assert_eq!(reporter.counts(), Counts { pass: 0, fail: 1 });
    }

    #[test]
    fn test_skip_emits_directive() {
        let capture = Capture::new();
        let mut reporter = reporter(&capture);
        reporter.skip_test("later").unwrap();
        assert!(capture.contents().contains("ok 1 - later # SKIP"));
    }
}
