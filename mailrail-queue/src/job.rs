use async_trait::async_trait;

use crate::{JobName, Result};

/// A handle to one job in a queue
///
/// Attribute values are opaque bytes. Once a terminal transition (`finish`,
/// `fail`) or a resubmission has been made, the handle must not be used to
/// write attributes again.
#[async_trait]
pub trait Job: Send + Sync + std::fmt::Debug {
    /// The job's identifying name
    fn name(&self) -> &JobName;

    /// Read an attribute
    ///
    /// # Errors
    /// `QueueError::AttributeNotFound` if the attribute was never set, or any
    /// storage error.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Durably replace an attribute
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Place the job (back) on the queue
    async fn submit(&self) -> Result<()>;

    /// Mark the job as successfully completed
    async fn finish(&self) -> Result<()>;

    /// Mark the job as permanently failed
    async fn fail(&self) -> Result<()>;
}

/// A persistent queue of jobs
#[async_trait]
pub trait Queue: Send + Sync + std::fmt::Debug {
    /// Create a new, unsubmitted job
    async fn create_job(&self, prefix: &str) -> Result<Box<dyn Job>>;

    /// Take the oldest queued job, if any, marking it as running
    async fn take(&self) -> Result<Option<Box<dyn Job>>>;

    /// Return jobs left running by dead workers to the queue
    ///
    /// Returns the number of jobs reclaimed.
    async fn rescue_dead_jobs(&self) -> Result<usize>;

    /// Open an existing job in any stage, for inspection
    async fn open_job(&self, name: &JobName) -> Result<Box<dyn Job>>;
}
