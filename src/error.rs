//! Custom error types for the bench.
//!
//! Two `thiserror` enums carry every failure the library can report:
//!
//! - **`DriverError`**: anything an instrument driver surfaces through the
//!   capability traits. Transport failures, protocol replies that cannot be
//!   parsed, and an instrument that answers `*IDN?` with the wrong identity all
//!   land here. Drivers never retry; the error travels up unchanged.
//! - **`BenchError`**: the classified errors a caller sees. Session loading
//!   produces `NotFound`, `Unreachable`, `DriverNotFound` and `ConnectFailed`.
//!   Sweeps wrap driver failures as `Driver`. Procedures raise `NoMatchFound`
//!   when a carrier that must be present in a peak table is missing, which is
//!   a setup problem rather than an instrument fault.
//!
//! A sweep that detects no peaks is not an error at all: it comes back as
//! `None` so callers can tell "nothing above threshold" from a failure.

use thiserror::Error;

use crate::config::ConfigError;
use crate::instrument::InstrumentClass;

/// Convenience alias for results using the bench error type.
pub type AppResult<T> = std::result::Result<T, BenchError>;

/// Failures reported by an instrument driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Timed out after {timeout_ms} ms waiting for reply to '{command}'")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Instrument manufacturer/model mismatch: {0}")]
    IdentityMismatch(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    /// An earlier exchange was abandoned mid-reply; the connection can no
    /// longer pair commands with their answers.
    #[error("Connection to {0} is out of sync after an abandoned exchange")]
    OutOfSync(String),
}

/// Classified errors surfaced to bench callers.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Instrument {0} not found in list of instruments")]
    NotFound(String),

    #[error("Host {0} is offline")]
    Unreachable(String),

    #[error("Driver {0} could not be found")]
    DriverNotFound(String),

    #[error("Could not connect to {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: DriverError,
    },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Instrument {name} is not a {expected}")]
    CapabilityMismatch {
        name: String,
        expected: InstrumentClass,
    },

    #[error("No peak found at {frequency_hz} Hz: {hint}")]
    NoMatchFound { frequency_hz: f64, hint: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// True for failures the operator can clear without touching configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BenchError::Unreachable(_) | BenchError::ConnectFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BenchError::NotFound("SA9".to_string());
        assert_eq!(
            err.to_string(),
            "Instrument SA9 not found in list of instruments"
        );

        let err = BenchError::Unreachable("DSA-815".to_string());
        assert_eq!(err.to_string(), "Host DSA-815 is offline");
    }

    #[test]
    fn test_connect_failed_keeps_source() {
        let err = BenchError::ConnectFailed {
            address: "SDG-1032X".into(),
            source: DriverError::IdentityMismatch("Acme,Model1".into()),
        };
        assert!(err.to_string().contains("SDG-1032X"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BenchError::Unreachable("h".into()).is_retryable());
        assert!(!BenchError::DriverNotFound("x".into()).is_retryable());
        assert!(!BenchError::NoMatchFound {
            frequency_hz: 7.2e6,
            hint: "check your cabling".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_driver_error_converts() {
        let err: BenchError = DriverError::Instrument("sweep aborted".into()).into();
        assert!(matches!(err, BenchError::Driver(_)));
    }
}
