//! Unified error types for the Plaza client
//!
//! Every fallible operation in the client returns [`ClientError`]. The
//! taxonomy is intentionally small:
//!
//! - **Validation**: a precondition was not met (not signed in, blank input,
//!   bad configuration value)
//! - **Network**: an HTTP or broker call failed, or the backend answered with
//!   a non-success status
//! - **Parse**: a response or inbound realtime payload could not be decoded
//! - **Storage**: durable key-value storage could not be read or written
//! - **Config**: configuration could not be loaded

use thiserror::Error;

pub mod http;
pub mod validation;

pub use http::BackendErrorBody;
pub use validation::{FieldError, ValidationError};

/// Boxed error used as a transport-agnostic source
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Distinguishes between retryable and permanent errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retryable,
    Permanent,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Precondition not met
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// HTTP or broker call failed
    #[error("Network error during {operation}{}", status_suffix(.status))]
    Network {
        operation: String,
        status: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    /// Payload could not be decoded
    #[error("Failed to parse {context}")]
    Parse {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Local storage failure
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// The caller has no authenticated session
    pub fn not_authenticated(action: &str) -> Self {
        Self::Validation(ValidationError::new(format!(
            "User must be logged in to {action}"
        )))
    }

    /// Generic validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message))
    }

    /// Transport failure with no HTTP status
    pub fn network<E: Into<BoxError>>(operation: impl Into<String>, source: E) -> Self {
        Self::Network {
            operation: operation.into(),
            status: None,
            source: Some(source.into()),
        }
    }

    /// Backend answered with a non-success status
    pub fn http_status(operation: impl Into<String>, status: u16, body: Option<BackendErrorBody>) -> Self {
        Self::Network {
            operation: operation.into(),
            status: Some(status),
            source: body.map(|b| Box::new(b) as BoxError),
        }
    }

    pub fn parse<E: Into<BoxError>>(context: impl Into<String>, source: E) -> Self {
        Self::Parse {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn storage(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Self::Storage {
            message: message.into(),
            source,
        }
    }

    /// HTTP status attached to a network error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns whether retrying the same call could succeed
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { status: None, .. } => ErrorKind::Retryable,
            Self::Network {
                status: Some(status),
                ..
            } if *status >= 500 || *status == 429 => ErrorKind::Retryable,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::storage(e.to_string(), Some(e))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" (status {status})"),
        None => String::new(),
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_authenticated_is_validation() {
        let error = ClientError::not_authenticated("like posts");
        assert!(matches!(error, ClientError::Validation(_)));
        assert_eq!(error.to_string(), "Validation failed: User must be logged in to like posts");
    }

    #[test]
    fn test_network_status_in_message() {
        let error = ClientError::http_status("get feed page", 503, None);
        assert_eq!(error.status(), Some(503));
        assert_eq!(error.to_string(), "Network error during get feed page (status 503)");
    }

    #[test]
    fn test_retry_classification() {
        assert!(ClientError::http_status("like post", 502, None).is_retryable());
        assert!(ClientError::http_status("like post", 429, None).is_retryable());
        assert!(!ClientError::http_status("like post", 404, None).is_retryable());
        assert!(ClientError::network("like post", "connection reset").is_retryable());
        assert!(!ClientError::validation("blank").is_retryable());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error: ClientError = io.into();
        assert!(matches!(error, ClientError::Storage { source: Some(_), .. }));
    }
}
