//! Completion bridge between async test bodies and the reporter.
//!
//! The adapter invokes the user body with a fresh context and watches how the
//! returned future resolves:
//!
//! - resolves `Ok(())`: end-of-test is signaled, unless the body already
//!   ended (explicitly or by satisfying its plan);
//! - resolves `Err(fault)`: the fault becomes a failing end-of-test;
//! - panics: the payload is converted to a fault and handled the same way;
//! - an armed [`timeout`](crate::context::TestContext::timeout) expires
//!   first: the test fails with a timeout fault.
//!
//! The "body must be asynchronous" precondition is carried by the types:
//! registration only accepts closures returning a [`Future`]. The
//! `#[asynctap::test]` attribute enforces the same rule on free functions at
//! expansion time.

use std::any::Any;
use std::future::Future;

use futures::FutureExt;

use crate::context::TestContext;
use crate::fault::Fault;
use crate::report::{ReporterHandle, ReporterKind};

/// Run one body to completion against `ctx`, bridging its resolution into
/// end-of-test signaling.
pub(crate) async fn drive<F, Fut>(ctx: TestContext, body: F)
where
    F: FnOnce(TestContext) -> Fut,
    Fut: Future<Output = Result<(), Fault>>,
{
    let body = std::panic::AssertUnwindSafe(body(ctx.clone())).catch_unwind();
    tokio::select! {
        outcome = body => match outcome {
            Ok(Ok(())) => {
                if !ctx.is_ended() {
                    ctx.end(None);
                }
            }
            Ok(Err(fault)) => ctx.end(Some(fault)),
            Err(panic) => ctx.end(Some(panic_fault(panic.as_ref()))),
        },
        elapsed = ctx.timeout_expired() => {
            ctx.end(Some(Fault::new(format!("test timed out after {elapsed:?}"))));
        }
    }
}

fn panic_fault(payload: &(dyn Any + Send)) -> Fault {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "test body panicked".to_owned());
    Fault::new(message)
}

/// Run a single async body outside any [`Harness`](crate::harness::Harness),
/// panicking if an assertion fails.
///
/// This is the entry point generated by `#[asynctap::test]`: it plugs the
/// assertion facade into Rust's own test runner, with TAP written to stdout
/// for libtest to capture.
///
/// # Panics
///
/// Panics when any assertion fails, so libtest records the test as failed.
pub async fn standalone<F, Fut>(kind: ReporterKind, name: &str, body: F)
where
    F: FnOnce(TestContext) -> Fut,
    Fut: Future<Output = Result<(), Fault>>,
{
    let handle = ReporterHandle::new(kind.build(Box::new(std::io::stdout())));
    handle.begin_test(name);
    let ctx = TestContext::new(handle.clone());
    drive(ctx, body).await;
    handle.end_run();

    let counts = handle.counts();
    assert!(
        counts.fail == 0,
        "{name}: {} of {} assertions failed",
        counts.fail,
        counts.total()
    );
}
