use thiserror::Error;

/// Failure reported by (or while talking to) a transmission service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service answered with an explicit error code
    #[error("{code}: {message}")]
    Api {
        code: String,
        message: String,
        request_id: Option<String>,
        status: Option<u16>,
    },

    /// The request never produced a classifiable answer
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request could not be assembled for the service
    #[error("Unable to build request: {0}")]
    Build(String),
}

impl ServiceError {
    /// An API error with only a code and message, as test doubles report them
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
            request_id: None,
            status: None,
        }
    }

    /// The service-reported error code, if any
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::Transport(_) | Self::Build(_) => None,
        }
    }

    /// The service-assigned request id, if any
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Api { request_id, .. } => request_id.as_deref(),
            Self::Transport(_) | Self::Build(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let err = ServiceError::Api {
            code: "Throttling".to_string(),
            message: "Maximum sending rate exceeded.".to_string(),
            request_id: Some("4f1c-a1".to_string()),
            status: Some(400),
        };
        assert_eq!(err.code(), Some("Throttling"));
        assert_eq!(err.request_id(), Some("4f1c-a1"));
        assert_eq!(err.to_string(), "Throttling: Maximum sending rate exceeded.");

        let err = ServiceError::Transport("connection reset".to_string());
        assert_eq!(err.code(), None);
        assert_eq!(err.request_id(), None);
    }
}
