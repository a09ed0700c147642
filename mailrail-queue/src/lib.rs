//! Persistent job queue consumed by the mailrail worker
//!
//! A job is a named bag of attributes (`spec`, `recipients_sent`, ...) that
//! moves through the stages `Created -> Queued -> Running -> Done | Failed`.
//! Workers `take` queued jobs, and on startup reclaim jobs left running by a
//! process that no longer exists.

pub mod backends;
pub mod config;
pub mod error;
pub mod job;
pub mod types;

pub use backends::{FileQueue, MemoryQueue, TestQueue};
pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use job::{Job, Queue};
pub use types::{JobName, JobStage};
