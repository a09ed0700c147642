use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use mailrail_common::internal;
use parking_lot::Mutex;
use tokio::fs;

use crate::{
    Job, JobName, JobStage, Queue, QueueError, Result,
    types::validate_component,
};

/// Name of the file recording which process is running a job
const OWNER_FILE: &str = ".owner";

/// Directory-backed queue
///
/// Every job is a directory named `{ulid}-{prefix}` and every attribute is a
/// file inside it. The stage of a job is the subdirectory it lives in:
///
/// ```text
/// {root}/tmp/      created, not yet submitted
/// {root}/queue/    waiting to be taken
/// {root}/cur/      taken by a worker (`.owner` holds its pid)
/// {root}/done/     finished
/// {root}/failed/   failed
/// ```
///
/// # Atomicity
/// Stage transitions are single directory renames, and attribute writes go
/// to `.{key}.tmp` before being renamed over `{key}`. A reader never sees a
/// partially written attribute and a job is never in two stages at once.
///
/// # Concurrency
/// Several workers may share one queue directory. When two race to take the
/// same job only one rename succeeds; the loser moves on to the next job.
#[derive(Debug, Clone)]
pub struct FileQueue {
    root: PathBuf,
}

impl FileQueue {
    /// Open (creating if needed) a queue rooted at `path`
    ///
    /// # Errors
    /// - If the path fails validation
    /// - If the path exists but is not a directory
    /// - If a stage directory cannot be created
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        Self::validate_path(&root)?;

        if fs::try_exists(&root).await? && !fs::metadata(&root).await?.is_dir() {
            return Err(QueueError::InvalidPath(format!(
                "Expected {} to be a directory, but it is not",
                root.display()
            )));
        }

        for stage in JobStage::ALL {
            fs::create_dir_all(root.join(stage.dirname())).await?;
        }

        internal!(level = DEBUG, "Opened queue at {}", root.display());

        Ok(Self { root })
    }

    /// Validate a queue path
    ///
    /// Rejects paths containing `..` components and paths inside sensitive
    /// system directories.
    fn validate_path(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(QueueError::InvalidPath("Queue path is empty".to_string()));
        }

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(QueueError::InvalidPath(format!(
                "Queue path cannot contain '..' components: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes.iter().find(|p| path.starts_with(p)) {
            return Err(QueueError::InvalidPath(format!(
                "Queue path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// The queue's root directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn stage_dir(&self, stage: JobStage) -> PathBuf {
        self.root.join(stage.dirname())
    }

    fn handle(&self, name: JobName, stage: JobStage) -> FileJob {
        FileJob {
            root: self.root.clone(),
            name,
            stage: Mutex::new(stage),
        }
    }

    /// Names of all jobs in a stage, oldest first
    ///
    /// Entries that are not valid job names are ignored.
    ///
    /// # Errors
    /// If the stage directory cannot be read
    pub async fn jobs_in(&self, stage: JobStage) -> Result<Vec<JobName>> {
        let mut entries = fs::read_dir(self.stage_dir(stage)).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = JobName::from_dirname(&entry.file_name().to_string_lossy()) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Whether the process that took a running job is gone
    async fn is_abandoned(&self, name: &JobName) -> Result<bool> {
        let owner = self
            .stage_dir(JobStage::Running)
            .join(name.to_string())
            .join(OWNER_FILE);

        match fs::read_to_string(&owner).await {
            Ok(pid) => Ok(!pid.trim().parse::<u32>().is_ok_and(process_alive)),
            // A job renamed into cur/ by a worker that died before recording itself
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether a process with this pid exists
///
/// `EPERM` means the process exists but belongs to someone else.
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid == 0 {
        return false;
    }

    // SAFETY: signal 0 performs only the existence and permission checks
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Write a file by way of a temporary sibling and a rename
async fn write_atomic(dir: &Path, key: &str, value: &[u8]) -> Result<()> {
    let temp = dir.join(format!(".{key}.tmp"));
    fs::write(&temp, value).await?;
    fs::rename(&temp, dir.join(key)).await?;
    Ok(())
}

#[async_trait]
impl Queue for FileQueue {
    async fn create_job(&self, prefix: &str) -> Result<Box<dyn Job>> {
        let name = JobName::generate(prefix)?;
        fs::create_dir(self.stage_dir(JobStage::Created).join(name.to_string())).await?;

        internal!(level = DEBUG, "Created job {name}");
        Ok(Box::new(self.handle(name, JobStage::Created)))
    }

    async fn take(&self) -> Result<Option<Box<dyn Job>>> {
        let queued = self.stage_dir(JobStage::Queued);
        let running = self.stage_dir(JobStage::Running);

        for name in self.jobs_in(JobStage::Queued).await? {
            let dirname = name.to_string();
            match fs::rename(queued.join(&dirname), running.join(&dirname)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    internal!(level = DEBUG, "Job {name} was taken by another worker");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            write_atomic(
                &running.join(&dirname),
                OWNER_FILE,
                std::process::id().to_string().as_bytes(),
            )
            .await?;

            internal!(level = DEBUG, "Took job {name}");
            return Ok(Some(Box::new(self.handle(name, JobStage::Running))));
        }

        Ok(None)
    }

    async fn rescue_dead_jobs(&self) -> Result<usize> {
        let queued = self.stage_dir(JobStage::Queued);
        let running = self.stage_dir(JobStage::Running);
        let mut rescued = 0;

        for name in self.jobs_in(JobStage::Running).await? {
            if !self.is_abandoned(&name).await? {
                continue;
            }

            let dirname = name.to_string();
            if let Err(e) = fs::remove_file(running.join(&dirname).join(OWNER_FILE)).await
                && e.kind() != ErrorKind::NotFound
            {
                return Err(e.into());
            }

            match fs::rename(running.join(&dirname), queued.join(&dirname)).await {
                Ok(()) => {
                    internal!(level = INFO, "Rescued abandoned job {name}");
                    rescued += 1;
                }
                // Another worker rescued it first
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(rescued)
    }

    async fn open_job(&self, name: &JobName) -> Result<Box<dyn Job>> {
        let dirname = name.to_string();

        for stage in JobStage::ALL {
            if fs::try_exists(self.stage_dir(stage).join(&dirname)).await? {
                return Ok(Box::new(self.handle(name.clone(), stage)));
            }
        }

        Err(QueueError::JobNotFound(name.clone()))
    }
}

/// Handle to a job in a [`FileQueue`]
#[derive(Debug)]
pub struct FileJob {
    root: PathBuf,
    name: JobName,
    stage: Mutex<JobStage>,
}

impl FileJob {
    fn dir_in(&self, stage: JobStage) -> PathBuf {
        self.root.join(stage.dirname()).join(self.name.to_string())
    }

    fn dir(&self) -> PathBuf {
        self.dir_in(*self.stage.lock())
    }

    async fn transition(&self, to: JobStage) -> Result<()> {
        let from = *self.stage.lock();
        if !from.can_move_to(to) {
            return Err(QueueError::InvalidTransition {
                job: self.name.clone(),
                from,
                to,
            });
        }

        if from == JobStage::Running
            && let Err(e) = fs::remove_file(self.dir_in(from).join(OWNER_FILE)).await
            && e.kind() != ErrorKind::NotFound
        {
            return Err(e.into());
        }

        fs::rename(self.dir_in(from), self.dir_in(to)).await?;
        *self.stage.lock() = to;

        internal!(level = DEBUG, "Moved job {} from {from} to {to}", self.name);
        Ok(())
    }
}

#[async_trait]
impl Job for FileJob {
    fn name(&self) -> &JobName {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        validate_component(key)?;

        match fs::read(self.dir().join(key)).await {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(QueueError::AttributeNotFound {
                job: self.name.clone(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_component(key)?;
        write_atomic(&self.dir(), key, value).await
    }

    async fn submit(&self) -> Result<()> {
        self.transition(JobStage::Queued).await
    }

    async fn finish(&self) -> Result<()> {
        self.transition(JobStage::Done).await
    }

    async fn fail(&self) -> Result<()> {
        self.transition(JobStage::Failed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(FileQueue::validate_path(Path::new("/var/spool/mailrail")).is_ok());
        assert!(FileQueue::validate_path(Path::new("queue")).is_ok());

        assert!(FileQueue::validate_path(Path::new("")).is_err());
        assert!(FileQueue::validate_path(Path::new("/var/spool/../../etc")).is_err());
        assert!(FileQueue::validate_path(Path::new("/etc/mailrail")).is_err());
        assert!(FileQueue::validate_path(Path::new("/proc/self")).is_err());
    }

    #[test]
    fn test_process_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(0));
        assert!(!process_alive(u32::MAX));
    }
}
