//! Error types for opptrace-core

use thiserror::Error;

/// Error code the mock backend uses for commands nobody registered.
pub const COMMAND_NOT_MOCKED: &str = "command_not_mocked";

/// Main error type for the opptrace-core library
#[derive(Error, Debug)]
pub enum Error {
    /// A trace path could not be walked through the run's config
    #[error("cannot resolve path {path:?} at segment {segment:?}: {reason}")]
    Resolution {
        path: String,
        segment: String,
        reason: String,
    },

    /// A path string is not a valid address
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A trace violates one of its own invariants
    #[error("trace integrity error in run {run_id}: {message}")]
    Integrity { run_id: String, message: String },

    /// Network or socket failure talking to the backend
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a structured error
    #[error("backend error ({code}): {message}")]
    Backend { code: String, message: String },

    /// A requested run is not present in the run list
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build the rejection the mock backend returns for unregistered commands.
    pub fn not_mocked(message: impl Into<String>) -> Self {
        Error::Backend {
            code: COMMAND_NOT_MOCKED.to_string(),
            message: message.into(),
        }
    }

    /// True for the mock backend's "missing fixture" rejection.
    pub fn is_not_mocked(&self) -> bool {
        matches!(self, Error::Backend { code, .. } if code == COMMAND_NOT_MOCKED)
    }

    /// True when the trace and the config it is rendered against disagree.
    pub fn is_config_mismatch(&self) -> bool {
        matches!(self, Error::Resolution { .. } | Error::Integrity { .. })
    }

    /// Message suitable for showing to the person looking at the trace.
    pub fn user_message(&self) -> String {
        match self {
            Error::Resolution { path, .. } => format!(
                "Trace does not match current configuration (no config at \"{}\")",
                path
            ),
            Error::Integrity { message, .. } => {
                format!("Trace does not match current configuration ({})", message)
            }
            Error::RunNotFound(run_id) => format!(
                "The selected run ({}) is no longer available. It may have been purged.",
                run_id
            ),
            other => other.to_string(),
        }
    }
}

/// Result type alias for opptrace-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_mocked_code() {
        let err = Error::not_mocked("trace/get");
        assert!(err.is_not_mocked());
        assert_eq!(err.to_string(), "backend error (command_not_mocked): trace/get");
        assert!(!Error::Transport("down".into()).is_not_mocked());
    }

    #[test]
    fn test_resolution_user_message() {
        let err = Error::Resolution {
            path: "action/3".to_string(),
            segment: "3".to_string(),
            reason: "index out of range".to_string(),
        };
        assert!(err.is_config_mismatch());
        assert!(err
            .user_message()
            .starts_with("Trace does not match current configuration"));
        assert!(err.user_message().contains("action/3"));
    }
}
