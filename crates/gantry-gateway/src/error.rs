//! Gateway error taxonomy

use thiserror::Error;

/// Errors surfaced by gateway backends
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The addressed remote entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A search expected zero-or-one match but got several
    #[error("ambiguous match: {0}")]
    Ambiguous(String),

    /// Management API rejected the call
    #[error("gateway API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connect, timeout, TLS)
    #[error("gateway transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload could not be encoded or decoded
    #[error("gateway payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Backend rejected the configuration it was built from
    #[error("gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    /// Whether the error means the remote object is already in the
    /// requested state: already started, already stopped, already closed,
    /// or already gone. Lifecycle and cleanup paths tolerate these
    /// uniformly; everything else fails the pass.
    pub fn is_already_done(&self) -> bool {
        match self {
            GatewayError::NotFound(_) => true,
            GatewayError::Api { status: 400, message } => {
                message.to_ascii_lowercase().contains("already")
            }
            _ => false,
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_already_done() {
        assert!(GatewayError::NotFound("api x".into()).is_already_done());
        assert!(GatewayError::NotFound("api x".into()).is_not_found());
    }

    #[test]
    fn test_lifecycle_conflict_is_already_done() {
        let err = GatewayError::Api {
            status: 400,
            message: "API is already started".into(),
        };
        assert!(err.is_already_done());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_other_api_errors_are_fatal() {
        let err = GatewayError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert!(!err.is_already_done());

        let err = GatewayError::Api {
            status: 400,
            message: "context path taken".into(),
        };
        assert!(!err.is_already_done());
    }
}
