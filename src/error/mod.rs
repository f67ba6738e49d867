//! Error definitions
//!
//! This module provides error types for asynctap.
//!
//! Assertion failures are not errors: they are recorded as `not ok` TAP lines
//! and counted in the run [`Summary`](crate::harness::Summary). The variants
//! here cover the shim's own failure modes only.

use thiserror::Error;

/// Main error type for asynctap
#[derive(Error, Debug)]
pub enum Error {
    /// Writing TAP output to the configured sink failed
    #[error("Failed to write report output: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecognized configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = Error::config("unknown reporter: xml");
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown reporter: xml"
        );
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io.into();
        assert!(err.to_string().contains("pipe closed"));
    }
}
