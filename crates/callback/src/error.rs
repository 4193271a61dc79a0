//! Callback error types.

use thiserror::Error;

use crate::dispatcher::CallbackResult;

/// Errors that can occur while building or delivering callbacks.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The event could not be converted to JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HMAC key was rejected.
    #[error("Signature error: {0}")]
    Signature(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Every attempt failed.
    #[error("Callback to {url} failed after {attempts} attempt(s): {}", describe(.result))]
    DeliveryFailed {
        url: String,
        attempts: u32,
        result: Box<CallbackResult>,
    },

    /// Delivery was cancelled before it succeeded.
    #[error("Callback to {url} cancelled: {}", describe(.result))]
    Cancelled {
        url: String,
        result: Box<CallbackResult>,
    },
}

impl CallbackError {
    /// The last attempt's result, for delivery failures.
    pub fn last_result(&self) -> Option<&CallbackResult> {
        match self {
            CallbackError::DeliveryFailed { result, .. } | CallbackError::Cancelled { result, .. } => {
                Some(result)
            }
            _ => None,
        }
    }
}

fn describe(result: &CallbackResult) -> String {
    match (&result.error, result.status_code) {
        (Some(error), _) => error.clone(),
        (None, Some(status)) => format!("status {status}"),
        (None, None) => "unknown error".to_string(),
    }
}

/// Convenience type alias for callback results.
pub type Result<T> = std::result::Result<T, CallbackError>;
