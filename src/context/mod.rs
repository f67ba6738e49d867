//! The per-test assertion context.
//!
//! A [`TestContext`] is built for each test invocation and handed to the user
//! body. Every method translates into a call on the shared
//! [`Reporter`](crate::report::Reporter) behind a [`ReporterHandle`]; the
//! context itself holds only ephemeral per-test state (assertion count,
//! declared plan, ended flag, armed timeout) and is discarded when the test
//! ends.
//!
//! # Example
//!
//! ```rust
//! use asynctap::prelude::*;
//!
//! let mut harness = Harness::new();
//! harness.test("numbers", |t| async move {
//!     t.is(&(2 + 2), &4, "adds up");
//!     t.same(&vec![1, 2], &vec![1, 2], "deep equal");
//!     t.throws_sync(
//!         || Err::<(), _>(Fault::new("A")),
//!         Fault::new("A"),
//!         "fails with A",
//!     );
//!     Ok(())
//! });
//! ```

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;

use crate::fault::Fault;
use crate::report::{Assertion, ReporterHandle};

/// Assertion facade passed to every test body.
///
/// Cheaply cloneable; clones share the same per-test state.
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    reporter: ReporterHandle,
    state: Mutex<State>,
    timeout: TimeoutCell,
}

#[derive(Default)]
struct State {
    count: usize,
    plan: Option<usize>,
    ended: bool,
}

impl TestContext {
    /// Build a context reporting through `reporter`.
    #[must_use]
    pub fn new(reporter: ReporterHandle) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                reporter,
                state: Mutex::new(State::default()),
                timeout: TimeoutCell::new(),
            }),
        }
    }

    /// Strict equality: `actual == expected`.
    pub fn is<T: PartialEq + Debug>(&self, actual: &T, expected: &T, message: &str) {
        self.record(Assertion {
            ok: actual == expected,
            operator: "is",
            message: message.to_owned(),
            actual: Some(debug_value(actual)),
            expected: Some(debug_value(expected)),
        });
    }

    /// Strict inequality: `actual != expected`.
    pub fn is_not<T: PartialEq + Debug>(&self, actual: &T, expected: &T, message: &str) {
        self.record(Assertion {
            ok: actual != expected,
            operator: "isNot",
            message: message.to_owned(),
            actual: Some(debug_value(actual)),
            expected: Some(debug_value(expected)),
        });
    }

    /// Deep structural equality over the serialized shapes of both values.
    pub fn same<T: Serialize>(&self, actual: &T, expected: &T, message: &str) {
        match shapes(actual, expected) {
            Ok((actual, expected)) => self.record(Assertion {
                ok: actual == expected,
                operator: "same",
                message: message.to_owned(),
                actual: Some(actual),
                expected: Some(expected),
            }),
            Err(err) => self.unserializable(message, err),
        }
    }

    /// Deep structural inequality.
    pub fn different<T: Serialize>(&self, actual: &T, expected: &T, message: &str) {
        match shapes(actual, expected) {
            Ok((actual, expected)) => self.record(Assertion {
                ok: actual != expected,
                operator: "different",
                message: message.to_owned(),
                actual: Some(actual),
                expected: Some(expected),
            }),
            Err(err) => self.unserializable(message, err),
        }
    }

    /// Assert that a condition holds.
    pub fn ok(&self, value: bool, message: &str) {
        self.record(Assertion {
            ok: value,
            operator: "ok",
            message: message.to_owned(),
            actual: Some(Value::Bool(value)),
            expected: Some(Value::Bool(true)),
        });
    }

    /// Assert that a condition does not hold.
    pub fn not(&self, value: bool, message: &str) {
        self.record(Assertion {
            ok: !value,
            operator: "not",
            message: message.to_owned(),
            actual: Some(Value::Bool(value)),
            expected: Some(Value::Bool(false)),
        });
    }

    /// Record an unconditional pass.
    pub fn pass(&self, message: &str) {
        self.record(Assertion {
            ok: true,
            operator: "pass",
            message: message.to_owned(),
            actual: None,
            expected: None,
        });
    }

    /// Record an unconditional failure.
    pub fn fail(&self, message: &str) {
        self.record(Assertion {
            ok: false,
            operator: "fail",
            message: message.to_owned(),
            actual: None,
            expected: None,
        });
    }

    /// Emit a diagnostic comment.
    pub fn comment(&self, text: &str) {
        self.inner.reporter.comment(text);
    }

    /// Declare the expected assertion count.
    ///
    /// Once declared, the test ends on its own when the count is reached and
    /// the completion bridge no longer auto-ends on body resolution. Ending
    /// with a different count is a failure, and so is any assertion recorded
    /// past the declared count.
    pub fn plan(&self, count: usize) {
        {
            let mut state = self.inner.state.lock();
            if state.ended {
                return;
            }
            state.plan = Some(count);
        }
        self.inner.reporter.plan(count);
        self.check_plan_complete();
    }

    /// Arm a timeout for this test. The first armed deadline wins.
    pub fn timeout(&self, after: Duration) {
        self.inner.timeout.arm(after);
    }

    /// Assert that a synchronous candidate fails with a fault matching the
    /// descriptor (message plus any descriptor fields, partially).
    pub fn throws_sync<T, E, F>(&self, candidate: F, descriptor: impl Into<Fault>, message: &str)
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<Fault>,
    {
        let outcome = candidate().err().map(Into::into);
        self.check_throw(outcome, &descriptor.into(), message);
    }

    /// Async form of [`throws_sync`](Self::throws_sync): awaits the candidate
    /// and routes success to a "must have thrown" failure, failure to the
    /// structural match.
    pub async fn throws<T, E, F, Fut>(
        &self,
        candidate: F,
        descriptor: impl Into<Fault>,
        message: &str,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Fault>,
    {
        let outcome = candidate().await.err().map(Into::into);
        self.check_throw(outcome, &descriptor.into(), message);
    }

    /// Assert that a synchronous candidate succeeds.
    pub fn does_not_throw_sync<T, E, F>(&self, candidate: F, message: &str)
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<Fault>,
    {
        let outcome = candidate().err().map(Into::into);
        self.check_no_throw(outcome, message);
    }

    /// Async form of [`does_not_throw_sync`](Self::does_not_throw_sync).
    pub async fn does_not_throw<T, E, F, Fut>(&self, candidate: F, message: &str)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Fault>,
    {
        let outcome = candidate().await.err().map(Into::into);
        self.check_no_throw(outcome, message);
    }

    /// Signal end-of-test, optionally with a terminal fault.
    ///
    /// Idempotent: only the first call reaches the reporter. If a plan was
    /// declared and the recorded count differs, a plan mismatch failure is
    /// emitted first.
    pub fn end(&self, fault: Option<Fault>) {
        let mismatch = {
            let mut state = self.inner.state.lock();
            if state.ended {
                return;
            }
            state.ended = true;
            state
                .plan
                .filter(|plan| *plan != state.count)
                .map(|plan| (plan, state.count))
        };
        if let Some((plan, count)) = mismatch {
            self.inner.reporter.assertion(&Assertion {
                ok: false,
                operator: "plan",
                message: "plan != count".to_owned(),
                actual: Some(Value::from(count)),
                expected: Some(Value::from(plan)),
            });
        }
        self.inner.reporter.end_test(fault.as_ref());
    }

    fn check_throw(&self, outcome: Option<Fault>, descriptor: &Fault, message: &str) {
        let message = decorate(message, descriptor);
        match outcome {
            None => self.record(Assertion {
                ok: false,
                operator: "throws",
                message,
                actual: None,
                expected: Some(descriptor.to_value()),
            }),
            Some(fault) => self.record(Assertion {
                ok: descriptor.matches(&fault),
                operator: "throws",
                message,
                actual: Some(fault.to_value()),
                expected: Some(descriptor.to_value()),
            }),
        }
    }

    fn check_no_throw(&self, outcome: Option<Fault>, message: &str) {
        match outcome {
            None => self.record(Assertion {
                ok: true,
                operator: "doesNotThrow",
                message: message.to_owned(),
                actual: None,
                expected: None,
            }),
            Some(fault) => self.record(Assertion {
                ok: false,
                operator: "doesNotThrow",
                message: message.to_owned(),
                actual: Some(fault.to_value()),
                expected: None,
            }),
        }
    }

    fn record(&self, assertion: Assertion) {
        let after_end = {
            let mut state = self.inner.state.lock();
            if state.ended {
                true
            } else {
                state.count += 1;
                false
            }
        };
        if after_end {
            // The test already ended (explicitly or by satisfying its plan):
            // whatever arrives now is a failure, never a silent drop.
            tracing::warn!(message = %assertion.message, "assertion after end");
            self.inner.reporter.assertion(&Assertion {
                ok: false,
                operator: "after-end",
                message: assertion.message,
                actual: assertion.actual,
                expected: assertion.expected,
            });
            return;
        }
        self.inner.reporter.assertion(&assertion);
        self.check_plan_complete();
    }

    fn check_plan_complete(&self) {
        let done = {
            let state = self.inner.state.lock();
            !state.ended && state.plan.is_some_and(|plan| state.count >= plan)
        };
        if done {
            self.end(None);
        }
    }

    fn unserializable(&self, message: &str, err: serde_json::Error) {
        self.record(Assertion {
            ok: false,
            operator: "same",
            message: message.to_owned(),
            actual: Some(Value::String(format!("unserializable value: {err}"))),
            expected: None,
        });
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.inner.state.lock().ended
    }

    pub(crate) async fn timeout_expired(&self) -> Duration {
        self.inner.timeout.expired().await
    }
}

fn debug_value<T: Debug>(value: &T) -> Value {
    Value::String(format!("{value:?}"))
}

fn shapes<T: Serialize>(
    actual: &T,
    expected: &T,
) -> Result<(Value, Value), serde_json::Error> {
    Ok((serde_json::to_value(actual)?, serde_json::to_value(expected)?))
}

/// `"{message}: Error {descriptor}"`, matching the reported line the
/// descriptor's own message produces in the underlying throw assertion.
fn decorate(message: &str, descriptor: &Fault) -> String {
    if message.is_empty() || descriptor.message.is_empty() {
        message.to_owned()
    } else {
        format!("{message}: Error {}", descriptor.message)
    }
}

/// One-shot timeout shared between the context and the completion bridge.
pub(crate) struct TimeoutCell {
    deadline: Mutex<Option<Duration>>,
    armed: Notify,
}

impl TimeoutCell {
    pub(crate) fn new() -> Self {
        Self {
            deadline: Mutex::new(None),
            armed: Notify::new(),
        }
    }

    pub(crate) fn arm(&self, after: Duration) {
        let mut deadline = self.deadline.lock();
        if deadline.is_none() {
            *deadline = Some(after);
            // notify_one stores a permit, so arming before anyone waits
            // still wakes the first waiter.
            self.armed.notify_one();
        }
    }

    /// Resolves once an armed timeout elapses; pends forever if none is
    /// ever armed.
    pub(crate) async fn expired(&self) -> Duration {
        loop {
            let armed = *self.deadline.lock();
            match armed {
                Some(after) => {
                    tokio::time::sleep(after).await;
                    return after;
                }
                None => self.armed.notified().await,
            }
        }
    }
}
