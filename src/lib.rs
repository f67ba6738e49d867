//! # asynctap
//!
//! > Async test bodies, uniform assertions, pluggable TAP output
//!
//! **asynctap** lets tests written as async functions drive a fixed assertion
//! API (`is`, `same`, `throws`, ...) while the crate bridges their completion
//! into TAP reporting, over either of two reporting backends.
//!
//! ## Quick Start
//!
//! ```rust
//! use asynctap::prelude::*;
//!
//! let mut harness = Harness::new();
//! harness.test("lookup fails loudly", |t| async move {
//!     t.throws(
//!         || async { Err::<(), _>(Fault::new("not found").with("code", 404)) },
//!         Fault::new("not found").with("code", 404),
//!         "missing key",
//!     )
//!     .await;
//!     Ok(())
//! });
//! let summary = harness.run().unwrap();
//! assert_eq!(summary.exit_code(), 0);
//! ```
//!
//! ## Features
//!
//! - 🔁 **Completion bridge** - resolved, failed, and panicking bodies all
//!   signal end-of-test correctly
//! - 💥 **Async throws** - `throws` / `does_not_throw` await their candidate
//!   and match faults structurally (message plus any extra fields)
//! - 📋 **Two reporters** - streaming flat TAP or buffered subtests, selected
//!   by configuration
//! - 🧪 **libtest integration** - `#[asynctap::test]` plugs the same facade
//!   into Rust's own test runner

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod context;
pub mod error;
pub mod fault;
pub mod harness;
pub mod report;

/// Prelude for convenient imports
///
/// ```rust
/// use asynctap::prelude::*;
/// ```
pub mod prelude {
    pub use crate::adapter::standalone;
    pub use crate::context::TestContext;
    pub use crate::error::{Error, Result};
    pub use crate::fault::Fault;
    pub use crate::harness::{Harness, Summary};
    pub use crate::report::{Capture, Reporter, ReporterKind};
}

// Re-exports
pub use adapter::standalone;
pub use context::TestContext;
pub use error::{Error, Result};
pub use fault::Fault;
pub use harness::{Harness, Summary};

// Re-export the test macro when the macros feature is enabled
#[cfg(feature = "macros")]
pub use asynctap_macros::test;
