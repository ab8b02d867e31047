//! HTTP error body handling
//!
//! The backend answers failures with a JSON body shaped like
//! `{"timestamp": ..., "status": 404, "error": "Not Found", "message": ..., "path": ...}`.
//! Any of the fields may be missing; bodies that are not JSON are kept as
//! plain text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error body returned by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendErrorBody {
    #[serde(default)]
    pub status: Option<u16>,

    /// Short reason phrase
    #[serde(default)]
    pub error: Option<String>,

    /// Human-readable detail
    #[serde(default)]
    pub message: Option<String>,

    /// Request path the error refers to
    #[serde(default)]
    pub path: Option<String>,
}

impl BackendErrorBody {
    /// Decode a response body, falling back to the raw text as the message
    pub fn from_body(body: &str) -> Option<Self> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_str::<BackendErrorBody>(trimmed) {
            Ok(parsed) => Some(parsed),
            Err(_) => Some(BackendErrorBody {
                message: Some(trimmed.to_string()),
                ..Default::default()
            }),
        }
    }

    /// Best single-line description of the failure
    pub fn summary(&self) -> String {
        match (&self.error, &self.message) {
            (Some(error), Some(message)) if !message.is_empty() => format!("{error}: {message}"),
            (_, Some(message)) => message.clone(),
            (Some(error), None) => error.clone(),
            (None, None) => "unknown backend error".to_string(),
        }
    }
}

impl fmt::Display for BackendErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({})", self.summary(), path),
            None => write!(f, "{}", self.summary()),
        }
    }
}

impl std::error::Error for BackendErrorBody {}
