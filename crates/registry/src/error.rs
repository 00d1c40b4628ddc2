//! Registry error type.

use thiserror::Error;
use uuid::Uuid;

use delta_core::ValidationError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid job definition: {0}")]
    Validation(#[from] ValidationError),

    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("invalid capture state: {0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored job {id} could not be decoded: {reason}")]
    Decode { id: Uuid, reason: String },

    #[error("registry transport error: {0}")]
    Transport(String),
}

impl RegistryError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidState(_) => 400,
            Self::NotFound(_) => 404,
            Self::Transport(_) => 502,
            Self::Database(_) | Self::Decode { .. } => 500,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let id = Uuid::new_v4();
        let err = RegistryError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let err = RegistryError::from(ValidationError::MissingField("capture.table"));
        assert!(err.to_string().contains("capture.table"));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_invalid_state_is_bad_request() {
        let err = RegistryError::InvalidState("payload must include 'state'".into());
        assert_eq!(err.status_code(), 400);
    }
}
