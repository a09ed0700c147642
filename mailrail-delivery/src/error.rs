//! Typed error handling for job processing.
//!
//! Every failure while processing a job maps to exactly one [`Disposition`]:
//! - Throttling and unavailability are retried in place after a backoff
//! - A failed send-rate query resubmits the job for later
//! - Everything else fails the job

use std::fmt;

use mailrail_queue::QueueError;
use mailrail_ses::ServiceError;
use thiserror::Error;

/// Which of a job's two bodies an error concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Body {
    Text,
    Html,
}

impl Body {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A defect in a job's content. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFault {
    /// The job carries no spec attribute.
    #[error("Job has no spec")]
    MissingSpec,

    /// The spec is not valid JSON of the expected shape.
    #[error("Malformed spec: {0}")]
    MalformedSpec(String),

    /// The spec lists no recipients.
    #[error("Spec has no recipients")]
    EmptyRecipients,

    /// Neither a text nor an HTML template was given.
    #[error("Spec has neither a text nor an html body")]
    NoBody,

    /// A recipient has an empty address.
    #[error("Recipient {recipient} has no address")]
    MissingAddress { recipient: usize },

    /// An address does not parse as a single mailbox.
    #[error("Invalid address {addr:?} for {}", scope(.recipient))]
    InvalidAddress {
        recipient: Option<usize>,
        addr: String,
    },

    /// A template failed to compile.
    #[error("Syntax error in {body} template: {message}")]
    TemplateSyntax { body: Body, message: String },

    /// A template failed to render for one recipient, usually a missing key.
    #[error("Unable to render {body} body for recipient {recipient}: {message}")]
    Render {
        recipient: usize,
        body: Body,
        message: String,
    },

    /// The stored checkpoint cannot be decoded.
    #[error("Malformed checkpoint: {0}")]
    MalformedCheckpoint(String),

    /// A resolved request cannot be sent as-is.
    #[error("Invalid request for recipient {recipient}: {message}")]
    InvalidRequest { recipient: usize, message: String },
}

#[allow(clippy::ref_option, reason = "Called from the derived Display impl")]
fn scope(recipient: &Option<usize>) -> String {
    recipient.map_or_else(|| "the job".to_string(), |index| format!("recipient {index}"))
}

/// What happens to a job after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back off and retry the same recipient
    Retry,
    /// Mark the job failed
    Fail,
    /// Put the job back on the queue for a later attempt
    Resubmit,
}

/// Top-level job processing error type.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFault),

    /// The service reported throttling or unavailability.
    #[error("Transient service error for recipient {recipient}: {source}")]
    TransientService {
        recipient: usize,
        source: ServiceError,
    },

    /// The service rejected the request, or the transport failed.
    #[error("Service error for recipient {recipient}: {source}")]
    FatalService {
        recipient: usize,
        source: ServiceError,
    },

    /// The send rate could not be discovered before sending began.
    #[error("Unable to query send rate: {0}")]
    RateQuery(#[source] ServiceError),

    /// A confirmed send could not be recorded.
    #[error("Unable to record {confirmed} confirmed recipients: {source}")]
    CheckpointPersist {
        confirmed: usize,
        source: QueueError,
    },

    /// Reading job state failed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// The disposition of a job that hit this error
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::TransientService { .. } => Disposition::Retry,
            Self::Validation(_)
            | Self::FatalService { .. }
            | Self::CheckpointPersist { .. }
            | Self::Queue(_)
            | Self::Internal(_) => Disposition::Fail,
            Self::RateQuery(_) => Disposition::Resubmit,
        }
    }

    /// Returns `true` if the same recipient should be retried after a backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.disposition(), Disposition::Retry)
    }

    /// Returns `true` if the job should be marked failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.disposition(), Disposition::Fail)
    }

    /// The recipient index the error concerns, if any
    #[must_use]
    pub const fn recipient(&self) -> Option<usize> {
        match self {
            Self::TransientService { recipient, .. }
            | Self::FatalService { recipient, .. }
            | Self::Validation(
                ValidationFault::MissingAddress { recipient }
                | ValidationFault::Render { recipient, .. }
                | ValidationFault::InvalidRequest { recipient, .. }
                | ValidationFault::InvalidAddress {
                    recipient: Some(recipient),
                    ..
                },
            ) => Some(*recipient),
            _ => None,
        }
    }

    /// The service error behind this error, if any
    #[must_use]
    pub const fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::TransientService { source, .. }
            | Self::FatalService { source, .. }
            | Self::RateQuery(source) => Some(source),
            _ => None,
        }
    }
}
