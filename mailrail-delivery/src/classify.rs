use ahash::AHashSet;
use mailrail_ses::ServiceError;

use crate::{JobError, ValidationFault};

/// Error codes reported by SES when it is throttling or briefly unavailable
pub const DEFAULT_TRANSIENT_CODES: [&str; 5] = [
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
];

/// Sorts service errors into transient and fatal by their reported code
///
/// Only an explicit code in the transient set is transient. Transport
/// failures carry no code and are therefore always fatal.
#[derive(Debug, Clone)]
pub struct Classifier {
    transient: AHashSet<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_CODES)
    }
}

impl Classifier {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transient: codes.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_transient(&self, err: &ServiceError) -> bool {
        err.code().is_some_and(|code| self.transient.contains(code))
    }

    /// Wrap a failed send of `recipient` in the matching job error
    #[must_use]
    pub fn classify(&self, recipient: usize, err: ServiceError) -> JobError {
        if self.is_transient(&err) {
            return JobError::TransientService {
                recipient,
                source: err,
            };
        }

        match err {
            ServiceError::Build(message) => {
                ValidationFault::InvalidRequest { recipient, message }.into()
            }
            source => JobError::FatalService { recipient, source },
        }
    }
}
