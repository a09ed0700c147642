//! Error types for the mailrail-queue crate.

use std::io;

use thiserror::Error;

use crate::{JobName, JobStage};

/// Top-level queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    /// I/O operation failed (directory scan, attribute read/write, rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The job has no attribute with this key.
    #[error("Attribute {key} not found on job {job}")]
    AttributeNotFound { job: JobName, key: String },

    /// No job with this name exists in any stage.
    #[error("Job not found: {0}")]
    JobNotFound(JobName),

    /// The job is not in a stage that permits the requested transition.
    #[error("Job {job} cannot move from {from} to {to}")]
    InvalidTransition {
        job: JobName,
        from: JobStage,
        to: JobStage,
    },

    /// An attribute key or job prefix contains characters that are not allowed.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Queue directory validation failed.
    #[error("Invalid queue path: {0}")]
    InvalidPath(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns `true` if the error only reports an absent attribute.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::AttributeNotFound { .. })
    }
}

/// Specialized `Result` type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let queue_err: QueueError = io_err.into();
        assert!(matches!(queue_err, QueueError::Io(_)));
        assert!(queue_err.to_string().contains("access denied"));
        assert!(!queue_err.is_not_found());
    }

    #[test]
    fn test_not_found_classification() {
        let job = JobName::generate("newsletter").expect("valid prefix");
        let err = QueueError::AttributeNotFound {
            job: job.clone(),
            key: "recipients_sent".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            format!("Attribute recipients_sent not found on job {job}")
        );
    }
}
