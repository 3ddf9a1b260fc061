//! Errors returned by backend operations.

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Failure talking to the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response (connection, TLS, DNS...).
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("failed to decode backend response: {0}")]
    Decode(String),

    /// The log subscription delivered an error event.
    #[error("job log subscription failed: {0}")]
    Subscription(String),
}

impl BackendError {
    /// Returns true for failures a user could reasonably retry.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport { .. } => true,
            BackendError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = BackendError::Status {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = BackendError::Status {
            status: 422,
            message: "bad input".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!BackendError::NotFound("workspace a/b".to_string()).is_transient());
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = BackendError::NotFound("workspace team/prod".to_string());
        assert_eq!(err.to_string(), "workspace team/prod not found");
    }
}
