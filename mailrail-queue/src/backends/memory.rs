use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    Job, JobName, JobStage, Queue, QueueError, Result,
    types::validate_component,
};

#[derive(Debug)]
struct Record {
    stage: JobStage,
    owner: Option<u64>,
    attributes: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct Storage {
    jobs: BTreeMap<JobName, Record>,
    next_owner: u64,
}

impl Storage {
    fn record_mut(&mut self, name: &JobName) -> Result<&mut Record> {
        self.jobs
            .get_mut(name)
            .ok_or_else(|| QueueError::JobNotFound(name.clone()))
    }
}

/// In-memory queue implementation
///
/// Jobs live in a `BTreeMap` keyed by name, so iteration order is creation
/// order. It is intended for tests and dry runs; nothing survives the process.
///
/// Each handle carries an owner token standing in for a worker process id.
/// [`MemoryQueue::restart`] produces a handle with a fresh token over the same
/// storage, which is how a crashed-and-restarted worker is simulated: jobs
/// still running under an older token count as abandoned.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    storage: Arc<Mutex<Storage>>,
    owner: u64,
}

impl MemoryQueue {
    /// Create a new empty memory-backed queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(Mutex::new(Storage {
                jobs: BTreeMap::new(),
                next_owner: 1,
            })),
            owner: 0,
        }
    }

    /// A handle over the same storage that behaves like a newly started worker
    #[must_use]
    pub fn restart(&self) -> Self {
        let mut storage = self.storage.lock();
        let owner = storage.next_owner;
        storage.next_owner += 1;

        Self {
            storage: Arc::clone(&self.storage),
            owner,
        }
    }

    /// Create a job, returning the concrete handle
    ///
    /// # Errors
    /// If the prefix is not a valid name component
    pub fn create_memory_job(&self, prefix: &str) -> Result<MemoryJob> {
        let name = JobName::generate(prefix)?;
        self.storage.lock().jobs.insert(
            name.clone(),
            Record {
                stage: JobStage::Created,
                owner: None,
                attributes: HashMap::new(),
            },
        );

        Ok(self.handle(name))
    }

    /// Take the oldest queued job, returning the concrete handle
    pub fn take_memory_job(&self) -> Option<MemoryJob> {
        let mut storage = self.storage.lock();
        let (name, record) = storage
            .jobs
            .iter_mut()
            .find(|(_, record)| record.stage == JobStage::Queued)?;

        record.stage = JobStage::Running;
        record.owner = Some(self.owner);
        let name = name.clone();
        drop(storage);

        Some(self.handle(name))
    }

    /// Open an existing job, returning the concrete handle
    ///
    /// # Errors
    /// If no such job exists
    pub fn open_memory_job(&self, name: &JobName) -> Result<MemoryJob> {
        if self.storage.lock().jobs.contains_key(name) {
            Ok(self.handle(name.clone()))
        } else {
            Err(QueueError::JobNotFound(name.clone()))
        }
    }

    fn handle(&self, name: JobName) -> MemoryJob {
        MemoryJob {
            name,
            storage: Arc::clone(&self.storage),
        }
    }

    /// Current stage of a job
    #[must_use]
    pub fn stage(&self, name: &JobName) -> Option<JobStage> {
        self.storage.lock().jobs.get(name).map(|record| record.stage)
    }

    /// Current value of a job attribute
    #[must_use]
    pub fn attribute(&self, name: &JobName, key: &str) -> Option<Vec<u8>> {
        self.storage
            .lock()
            .jobs
            .get(name)
            .and_then(|record| record.attributes.get(key).cloned())
    }

    /// Names of all jobs in a stage, oldest first
    #[must_use]
    pub fn jobs_in(&self, stage: JobStage) -> Vec<JobName> {
        self.storage
            .lock()
            .jobs
            .iter()
            .filter(|(_, record)| record.stage == stage)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Total number of jobs in all stages
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.lock().jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn create_job(&self, prefix: &str) -> Result<Box<dyn Job>> {
        Ok(Box::new(self.create_memory_job(prefix)?))
    }

    async fn take(&self) -> Result<Option<Box<dyn Job>>> {
        Ok(self
            .take_memory_job()
            .map(|job| Box::new(job) as Box<dyn Job>))
    }

    async fn rescue_dead_jobs(&self) -> Result<usize> {
        let mut storage = self.storage.lock();
        let mut rescued = 0;

        for record in storage.jobs.values_mut() {
            if record.stage == JobStage::Running && record.owner != Some(self.owner) {
                record.stage = JobStage::Queued;
                record.owner = None;
                rescued += 1;
            }
        }

        Ok(rescued)
    }

    async fn open_job(&self, name: &JobName) -> Result<Box<dyn Job>> {
        Ok(Box::new(self.open_memory_job(name)?))
    }
}

/// Handle to a job in a [`MemoryQueue`]
#[derive(Debug, Clone)]
pub struct MemoryJob {
    name: JobName,
    storage: Arc<Mutex<Storage>>,
}

impl MemoryJob {
    fn transition(&self, to: JobStage) -> Result<()> {
        let mut storage = self.storage.lock();
        let record = storage.record_mut(&self.name)?;

        if !record.stage.can_move_to(to) {
            return Err(QueueError::InvalidTransition {
                job: self.name.clone(),
                from: record.stage,
                to,
            });
        }

        record.stage = to;
        record.owner = None;
        Ok(())
    }
}

#[async_trait]
impl Job for MemoryJob {
    fn name(&self) -> &JobName {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut storage = self.storage.lock();
        storage
            .record_mut(&self.name)?
            .attributes
            .get(key)
            .cloned()
            .ok_or_else(|| QueueError::AttributeNotFound {
                job: self.name.clone(),
                key: key.to_string(),
            })
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_component(key)?;

        let mut storage = self.storage.lock();
        storage
            .record_mut(&self.name)?
            .attributes
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn submit(&self) -> Result<()> {
        self.transition(JobStage::Queued)
    }

    async fn finish(&self) -> Result<()> {
        self.transition(JobStage::Done)
    }

    async fn fail(&self) -> Result<()> {
        self.transition(JobStage::Failed)
    }
}
