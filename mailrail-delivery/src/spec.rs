use std::collections::BTreeMap;

use mailparse::MailAddr;
use mailrail_queue::Job;
use serde::{Deserialize, Serialize};

use crate::{JobError, ValidationFault};

/// Job attribute holding the JSON-encoded [`Spec`]
pub const SPEC_ATTRIBUTE: &str = "spec";

/// A mail-merge job as submitted
///
/// Absent fields default to empty. Recipient order is significant: the
/// checkpoint counts confirmed recipients from the front of this list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spec {
    pub from_name: String,
    pub from_addr: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub recipients: Vec<Recipient>,
}

/// One recipient, with optional overrides of the job-level fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipient {
    pub name: String,
    pub addr: String,
    pub from_name: String,
    pub from_addr: String,
    pub subject: String,
    /// Substitution values for the templates
    pub context: BTreeMap<String, String>,
}

impl Spec {
    /// Decode a spec from its JSON wire format
    pub fn parse(bytes: &[u8]) -> Result<Self, ValidationFault> {
        serde_json::from_slice(bytes).map_err(|e| ValidationFault::MalformedSpec(e.to_string()))
    }

    /// Read and decode the spec stored on a job
    pub async fn load(job: &dyn Job) -> Result<Self, JobError> {
        match job.get(SPEC_ATTRIBUTE).await {
            Ok(bytes) => Ok(Self::parse(&bytes)?),
            Err(e) if e.is_not_found() => Err(ValidationFault::MissingSpec.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Encode the spec in its JSON wire format
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationFault> {
        serde_json::to_vec(self).map_err(|e| ValidationFault::MalformedSpec(e.to_string()))
    }

    /// Check the structural rules a spec must satisfy before compiling
    ///
    /// - at least one recipient
    /// - at least one non-empty body
    /// - every recipient has an address
    /// - every address given (recipient, sender, or sender override) is a
    ///   single mailbox
    pub fn validate(&self) -> Result<(), ValidationFault> {
        if self.recipients.is_empty() {
            return Err(ValidationFault::EmptyRecipients);
        }

        if self.text.is_empty() && self.html.is_empty() {
            return Err(ValidationFault::NoBody);
        }

        if !self.from_addr.is_empty() {
            check_mailbox(&self.from_addr, None)?;
        }

        for (index, recipient) in self.recipients.iter().enumerate() {
            if recipient.addr.is_empty() {
                return Err(ValidationFault::MissingAddress { recipient: index });
            }
            check_mailbox(&recipient.addr, Some(index))?;

            if !recipient.from_addr.is_empty() {
                check_mailbox(&recipient.from_addr, Some(index))?;
            }
        }

        Ok(())
    }
}

/// Ensure `addr` is exactly one bare mailbox
fn check_mailbox(addr: &str, recipient: Option<usize>) -> Result<(), ValidationFault> {
    let invalid = || ValidationFault::InvalidAddress {
        recipient,
        addr: addr.to_string(),
    };

    let list = mailparse::addrparse(addr).map_err(|_| invalid())?;
    match list.iter().as_slice() {
        [MailAddr::Single(info)] if info.addr.contains('@') && info.display_name.is_none() => {
            Ok(())
        }
        _ => Err(invalid()),
    }
}
