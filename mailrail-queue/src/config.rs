use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

use crate::{FileQueue, MemoryQueue, Queue, Result};

/// Configuration for the job queue
///
/// # Examples
///
/// Directory-backed queue in RON config:
/// ```ron
/// (
///     queue: (
///         type: "File",
///         path: "/var/spool/mailrail",
///     ),
/// )
/// ```
///
/// Memory-backed queue for testing:
/// ```ron
/// (
///     queue: (type: "Memory"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum QueueConfig {
    /// Directory-backed queue (production)
    File { path: PathBuf },
    /// Memory-backed queue (testing/development)
    Memory,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/spool/mailrail"),
        }
    }
}

impl QueueConfig {
    /// The queue directory for file-backed queues
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }

    /// Open the configured queue
    ///
    /// # Errors
    /// If a file-backed queue cannot be opened
    pub async fn into_queue(self) -> Result<Arc<dyn Queue>> {
        match self {
            Self::File { path } => Ok(Arc::new(FileQueue::open(path).await?)),
            Self::Memory => Ok(Arc::new(MemoryQueue::new())),
        }
    }
}
