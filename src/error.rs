//! Error taxonomy for the upload pipeline.
//!
//! Errors fall into two groups. Setup failures (`Configuration`,
//! `Connectivity`) abort the run before any data is shipped. Flush failures
//! (`Network`, `Remote`) are contained by the retry sender and never crash
//! the host test run. `Internal` and `InvalidState` indicate a bug in the
//! caller or in request construction and are always propagated.

use thiserror::Error;

/// Errors produced by the uploader and its collaborators.
#[derive(Debug, Error)]
pub enum UploaderError {
    /// Missing credentials or an invalid option.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store could not be reached, or rejected authentication, at startup.
    #[error("cannot reach InfluxDB: {0}")]
    Connectivity(String),

    /// Transient transport failure: I/O, DNS, TLS, timeout, connection reset.
    #[error("network problem: {0}")]
    Network(String),

    /// The store answered but refused the write.
    #[error("InfluxDB rejected write (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// Malformed request or encoding failure. Never retried.
    #[error("internal error: {0}")]
    Internal(String),

    /// A lifecycle operation was invoked in the wrong state.
    #[error("cannot {operation} while uploader is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

impl UploaderError {
    /// Whether this failure is retryable under the send policy.
    pub fn is_network_problem(&self) -> bool {
        matches!(self, UploaderError::Network(_))
    }

    /// Classify a transport-level `reqwest` failure.
    ///
    /// Builder errors mean we produced an invalid request, so they are
    /// internal. Everything else that fails before a response is read is a
    /// network problem.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_builder() {
            UploaderError::Internal(err.to_string())
        } else {
            UploaderError::Network(describe_transport(&err))
        }
    }
}

fn describe_transport(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "transfer interrupted"
    } else {
        "request failed"
    };
    format!("{}: {}", kind, err)
}

pub type Result<T> = std::result::Result<T, UploaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_is_retryable() {
        assert!(UploaderError::Network("reset".into()).is_network_problem());
        assert!(!UploaderError::Remote {
            status: 400,
            message: "bad".into()
        }
        .is_network_problem());
        assert!(!UploaderError::Internal("x".into()).is_network_problem());
        assert!(!UploaderError::Configuration("x".into()).is_network_problem());
        assert!(!UploaderError::Connectivity("x".into()).is_network_problem());
    }

    #[test]
    fn test_display_messages() {
        let err = UploaderError::Remote {
            status: 400,
            message: "partial write".into(),
        };
        assert_eq!(
            err.to_string(),
            "InfluxDB rejected write (HTTP 400): partial write"
        );

        let err = UploaderError::InvalidState {
            operation: "check",
            state: "Stopped",
        };
        assert_eq!(err.to_string(), "cannot check while uploader is Stopped");
    }
}
