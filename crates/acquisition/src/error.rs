//! Crate-wide error types.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Per-source read failures never surface here; they travel inside
/// [`SourceReadOutcome::Error`](crate::SourceReadOutcome::Error).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Error raised by a [`ProtocolAdapter`](crate::ProtocolAdapter) read.
///
/// The scheduler converts these into outcomes at the task boundary, so an
/// adapter error never aborts a cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The read was cancelled; reported as `SourceReadOutcome::Cancelled`.
    #[error("Read was cancelled")]
    Cancelled,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Read(String),
}

impl AdapterError {
    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::config("interval must be positive").to_string(),
            "Configuration error: interval must be positive"
        );
        assert_eq!(
            Error::Logging("no subscriber".into()).to_string(),
            "Logging error: no subscriber"
        );
    }

    #[test]
    fn test_adapter_error_cancelled() {
        assert!(AdapterError::Cancelled.is_cancelled());
        assert!(!AdapterError::read("boom").is_cancelled());
        assert_eq!(AdapterError::read("boom").to_string(), "boom");
    }
}
