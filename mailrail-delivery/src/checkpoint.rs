use mailrail_queue::Job;
use serde::{Deserialize, Serialize};

use crate::{JobError, ValidationFault};

/// Job attribute holding the confirmed-recipient count
pub const CHECKPOINT_ATTRIBUTE: &str = "recipients_sent";

#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    recipients_sent: usize,
}

/// Durable count of recipients confirmed by the transmission service
///
/// The stored value only ever moves forward, one confirmed send at a time.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointStore<'a> {
    job: &'a dyn Job,
}

impl<'a> CheckpointStore<'a> {
    #[must_use]
    pub const fn new(job: &'a dyn Job) -> Self {
        Self { job }
    }

    /// The number of confirmed recipients, 0 if none have been recorded
    ///
    /// # Errors
    /// `MalformedCheckpoint` if the stored value cannot be decoded, or the
    /// queue error if it cannot be read
    pub async fn get(&self) -> Result<usize, JobError> {
        let bytes = match self.job.get(CHECKPOINT_ATTRIBUTE).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice::<Checkpoint>(&bytes)
            .map(|checkpoint| checkpoint.recipients_sent)
            .map_err(|e| ValidationFault::MalformedCheckpoint(e.to_string()).into())
    }

    /// Record `confirmed` as the number of confirmed recipients
    ///
    /// # Errors
    /// `CheckpointPersist` if the value cannot be durably written
    pub async fn set(&self, confirmed: usize) -> Result<(), JobError> {
        let bytes = serde_json::to_vec(&Checkpoint {
            recipients_sent: confirmed,
        })
        .map_err(|e| JobError::Internal(format!("Unable to encode checkpoint: {e}")))?;

        self.job
            .set(CHECKPOINT_ATTRIBUTE, &bytes)
            .await
            .map_err(|source| JobError::CheckpointPersist { confirmed, source })
    }
}

#[cfg(test)]
mod tests {
    use mailrail_queue::{MemoryQueue, Queue, TestQueue};

    use super::*;

    #[tokio::test]
    async fn test_get_missing_then_set() {
        let queue = MemoryQueue::new();
        let job = queue.create_job("checkpoint").await.expect("create");
        let store = CheckpointStore::new(job.as_ref());

        assert_eq!(store.get().await.expect("get"), 0);

        store.set(42).await.expect("set");
        assert_eq!(store.get().await.expect("get"), 42);
        assert_eq!(
            queue.attribute(job.name(), CHECKPOINT_ATTRIBUTE).as_deref(),
            Some(&br#"{"recipients_sent":42}"#[..])
        );
    }

    #[tokio::test]
    async fn test_malformed_checkpoint() {
        let queue = MemoryQueue::new();
        let job = queue.create_job("checkpoint").await.expect("create");
        let store = CheckpointStore::new(job.as_ref());

        for bad in [&b"42"[..], &br#"{"recipients_sent":-1}"#[..], &b"garbage"[..]] {
            job.set(CHECKPOINT_ATTRIBUTE, bad).await.expect("set");
            assert!(matches!(
                store.get().await,
                Err(JobError::Validation(ValidationFault::MalformedCheckpoint(_)))
            ));
        }
    }

    #[tokio::test]
    async fn test_persist_failure() {
        let queue = TestQueue::new();
        let job = queue.create_job("checkpoint").await.expect("create");
        let store = CheckpointStore::new(job.as_ref());

        queue.fail_writes(CHECKPOINT_ATTRIBUTE);
        assert!(matches!(
            store.set(1).await,
            Err(JobError::CheckpointPersist { confirmed: 1, .. })
        ));
        assert_eq!(store.get().await.expect("get"), 0);
    }
}
