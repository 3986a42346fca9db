use std::time::Duration;

use thiserror::Error;

/// Errors returned by container runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The container (or other object) no longer exists.
    #[error("not found: {0}")]
    NotFound(String),
    /// The connect handshake did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The event feed ended or broke.
    #[error("event feed disconnected: {0}")]
    Disconnected(String),
    /// Any other runtime API failure.
    #[error("runtime error: {0}")]
    Transport(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => Self::NotFound(message),
            other => Self::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RuntimeError;

    #[test]
    fn docker_404_maps_to_not_found() {
        let err = RuntimeError::from(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".into(),
        });
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: No such container: abc");
    }

    #[test]
    fn other_docker_errors_are_transport_errors() {
        let err = RuntimeError::from(bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".into(),
        });
        assert!(matches!(err, RuntimeError::Transport(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn timeout_message_names_the_duration() {
        assert_eq!(
            RuntimeError::Timeout(Duration::from_secs(5)).to_string(),
            "timed out after 5s"
        );
    }
}
