//! Fault values and partial structural matching.
//!
//! A [`Fault`] is the error value test bodies and `throws` candidates fail
//! with: a message plus any number of extra fields. The same type doubles as
//! the expected-error descriptor for [`throws`](crate::context::TestContext::throws),
//! where the thrown fault is compared against the descriptor by *partial*
//! structural matching: every field the descriptor names must be present and
//! match, while extra fields on the thrown fault are ignored.
//!
//! # Example
//!
//! ```rust
//! use asynctap::fault::Fault;
//!
//! let thrown = Fault::new("not found").with("code", 404).with("retried", true);
//! let descriptor = Fault::new("not found").with("code", 404);
//!
//! assert!(descriptor.matches(&thrown));
//! assert!(!Fault::new("not found").with("code", 500).matches(&thrown));
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// An error value with a message and arbitrary extra fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fault {
    /// Human-readable error message.
    pub message: String,
    /// Extra enumerable fields carried by the error.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Fault {
    /// Create a fault with the given message and no extra fields.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Attach an extra field.
    ///
    /// Values that fail to serialize are recorded as their `Debug`-less
    /// placeholder `null`; in practice any plain data type serializes.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.into(), value);
        self
    }

    /// Build a fault from any standard error.
    #[must_use]
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        Self::new(err.to_string())
    }

    /// Check whether `thrown` matches this fault treated as a descriptor.
    ///
    /// The messages must be equal and every descriptor field must be present
    /// on `thrown` and structurally match it. Extra thrown fields are
    /// ignored, and object fields are compared partially, recursively.
    #[must_use]
    pub fn matches(&self, thrown: &Fault) -> bool {
        if self.message != thrown.message {
            return false;
        }
        self.fields.iter().all(|(key, expected)| {
            thrown
                .fields
                .get(key)
                .is_some_and(|actual| value_matches(actual, expected))
        })
    }

    /// Render the fault as a JSON value for failure diagnostics.
    #[must_use]
    pub fn to_value(&self) -> Value {
        // Serialization of Fault cannot fail: it is strings and Values.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Fault {}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Partial structural comparison of JSON values.
///
/// Objects match when every expected key is present and matches recursively.
/// Arrays match elementwise and must have equal length. Scalars match by
/// equality.
#[must_use]
pub fn value_matches(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => {
            expected.iter().all(|(key, expected)| {
                actual
                    .get(key)
                    .is_some_and(|actual| value_matches(actual, expected))
            })
        }
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual
                    .iter()
                    .zip(expected)
                    .all(|(a, e)| value_matches(a, e))
        }
        (actual, expected) => actual == expected,
    }
}
