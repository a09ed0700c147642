use std::{fmt, sync::LazyLock};

use parking_lot::Mutex;

use crate::QueueError;

/// Names generated within one millisecond must still sort in creation order
static GENERATOR: LazyLock<Mutex<ulid::Generator>> =
    LazyLock::new(|| Mutex::new(ulid::Generator::new()));

/// Identifier for a queued job
///
/// Rendered as `{ulid}-{prefix}`. The ULID comes first so that lexicographic
/// order of names is creation order, which is what makes `take` FIFO.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobName {
    id: ulid::Ulid,
    prefix: String,
}

impl JobName {
    /// Generate a fresh name with the given human-readable prefix
    ///
    /// # Errors
    /// If the prefix is empty or contains anything other than ASCII
    /// alphanumerics, `-` and `_`.
    pub fn generate(prefix: &str) -> Result<Self, QueueError> {
        validate_component(prefix)?;
        let id = GENERATOR
            .lock()
            .generate()
            .map_err(|e| QueueError::Internal(format!("Unable to generate job name: {e}")))?;

        Ok(Self {
            id,
            prefix: prefix.to_string(),
        })
    }

    /// Parse a name from a job directory name
    ///
    /// Rejects path separators, traversal patterns and anything that is not
    /// `{ulid}-{prefix}`.
    pub fn from_dirname(dirname: &str) -> Option<Self> {
        if dirname.contains('/') || dirname.contains('\\') || dirname.contains("..") {
            return None;
        }

        let (id, prefix) = dirname.split_once('-')?;
        let id = ulid::Ulid::from_string(id).ok()?;
        validate_component(prefix).ok()?;

        Some(Self {
            id,
            prefix: prefix.to_string(),
        })
    }

    /// The prefix given when the job was created
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Milliseconds since the Unix epoch at which the job was created
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.id, self.prefix)
    }
}

impl std::str::FromStr for JobName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_dirname(s).ok_or_else(|| QueueError::InvalidName(s.to_string()))
    }
}

/// Lifecycle stage of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStage {
    /// Created but not yet submitted
    Created,
    /// Waiting to be taken by a worker
    Queued,
    /// Taken by a worker
    Running,
    /// Finished successfully
    Done,
    /// Failed permanently
    Failed,
}

impl JobStage {
    pub const ALL: [Self; 5] = [
        Self::Created,
        Self::Queued,
        Self::Running,
        Self::Done,
        Self::Failed,
    ];

    /// Directory holding jobs in this stage, for file-backed queues
    #[must_use]
    pub const fn dirname(self) -> &'static str {
        match self {
            Self::Created => "tmp",
            Self::Queued => "queue",
            Self::Running => "cur",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether a job may move from this stage to `to`
    #[must_use]
    pub const fn can_move_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created | Self::Running, Self::Queued)
                | (Self::Queued, Self::Running)
                | (Self::Running, Self::Done | Self::Failed)
        )
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dirname())
    }
}

/// Validate an attribute key or job prefix
///
/// # Errors
/// If the value is empty, starts with `.` or contains characters other than
/// ASCII alphanumerics, `-` and `_`.
pub fn validate_component(value: &str) -> Result<(), QueueError> {
    let valid = !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(QueueError::InvalidName(value.to_string()))
    }
}
