//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the campaign runner.
//! Using the `thiserror` crate, it provides a centralized and consistent way to describe
//! the things that can go wrong while driving the load and the scope, from configuration
//! problems to faults reported by the instruments themselves.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically parse or type errors in the
//!   campaign TOML file or in `PSU_SWEEP_*` environment overrides.
//! - **`Configuration`**: Semantic errors that pass parsing but are logically incorrect
//!   (a non-positive current ceiling, an empty frequency list, ...).
//! - **`Io`**: Wraps `std::io::Error` for screenshot and report files.
//! - **`Communication`**: The instrument did not answer, the connection dropped, or a
//!   transport timeout expired.
//! - **`InstrumentFault`**: The instrument answered its error-status query with anything
//!   other than "no error". Carries the offending command text.
//! - **`MalformedResponse`**: The instrument answered, but not with what was asked for
//!   (a measurement that is not a number, a broken binary block header).
//!
//! Capability traits return `anyhow::Result`; the values inside are `DaqError`s, so
//! callers that need the category can `downcast_ref::<DaqError>()`.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by the campaign runner.
#[derive(Error, Debug)]
pub enum DaqError {
    /// The configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration parsed but holds values the campaign cannot run with.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File system failure while persisting captures or reports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport to an instrument failed.
    #[error("Communication with '{instrument}' failed: {message}")]
    Communication {
        /// Instrument role name (e.g. "load", "scope")
        instrument: String,
        /// Transport-level description
        message: String,
    },

    /// The instrument reported an error after a command.
    #[error("Instrument '{instrument}' reported '{status}' after command '{command}'")]
    InstrumentFault {
        /// Instrument role name
        instrument: String,
        /// Command that preceded the error status
        command: String,
        /// Raw error-status text
        status: String,
    },

    /// The instrument answered with something that could not be interpreted.
    #[error("Malformed response from '{instrument}' to '{command}': '{response}'")]
    MalformedResponse {
        /// Instrument role name
        instrument: String,
        /// Command that was sent
        command: String,
        /// What came back
        response: String,
    },

    /// A report backend could not write its output.
    #[error("Report error: {0}")]
    Report(String),

    /// Functionality compiled out through feature flags.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl DaqError {
    /// Build a communication error for an instrument role.
    pub fn communication(instrument: impl Into<String>, message: impl Into<String>) -> Self {
        DaqError::Communication {
            instrument: instrument.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_fault_names_the_command() {
        let err = DaqError::InstrumentFault {
            instrument: "scope".into(),
            command: ":MEASure:VMIN? CHANnel2".into(),
            status: "-113,\"Undefined header\"".into(),
        };
        let text = err.to_string();
        assert!(text.contains(":MEASure:VMIN? CHANnel2"));
        assert!(text.contains("Undefined header"));
    }

    #[test]
    fn test_survives_anyhow_round_trip() {
        let err: anyhow::Error = DaqError::communication("load", "connection reset").into();
        match err.downcast_ref::<DaqError>() {
            Some(DaqError::Communication { instrument, .. }) => assert_eq!(instrument, "load"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
