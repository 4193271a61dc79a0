//! Gateway error types.

use thiserror::Error;

/// Errors returned by a [`GatewayClient`](crate::GatewayClient).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested resource does not exist on the gateway.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The gateway rejected the request because of a uniqueness conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The gateway answered with an unexpected HTTP status.
    #[error("Gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response (connect, timeout, decode).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Returns true if the error means the resource is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    /// Returns true if retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Status { status, .. } => *status >= 500 || *status == 429,
            GatewayError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Convenience type alias for gateway results.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(GatewayError::NotFound("repo".into()).is_not_found());
        assert!(!GatewayError::Conflict("repo".into()).is_not_found());
    }

    #[test]
    fn test_transient_classification() {
        let unavailable = GatewayError::Status {
            status: 503,
            body: "down".into(),
        };
        let bad_request = GatewayError::Status {
            status: 400,
            body: "bad".into(),
        };
        assert!(unavailable.is_transient());
        assert!(!bad_request.is_transient());
        assert!(!GatewayError::NotFound("x".into()).is_transient());
    }
}
