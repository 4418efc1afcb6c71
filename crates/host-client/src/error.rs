//! Host control plane client errors

use thiserror::Error;

/// Errors that can occur when interacting with the host control plane
#[derive(Debug, Error)]
pub enum HostError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The control plane answered with a non-success status
    #[error("{method} {path} failed: {status} - {message}")]
    Api {
        method: &'static str,
        path: String,
        status: u16,
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The control plane could not be reached
    #[error("Host control plane unavailable: {0}")]
    Unavailable(String),

    /// Invalid client configuration (base URL, header value)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HostError {
    /// Whether the failure means the control plane could not be reached at all
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            HostError::Unavailable(_) => true,
            HostError::Http(e) => e.is_connect() || e.is_timeout(),
            HostError::Api { status, .. } => *status == 503,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = HostError::Api {
            method: "POST",
            path: "/v1/reboot".to_string(),
            status: 409,
            message: "reboot already in progress".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "POST /v1/reboot failed: 409 - reboot already in progress"
        );
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(HostError::Unavailable("socket missing".to_string()).is_unavailable());
        let err = HostError::Api {
            method: "GET",
            path: "/v1/block/disks".to_string(),
            status: 503,
            message: String::new(),
        };
        assert!(err.is_unavailable());
    }
}
