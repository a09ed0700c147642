use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use ahash::AHashSet;
use mailrail_common::{Signal, internal};
use mailrail_queue::{Job, JobName, Queue, QueueError};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{JobProcessor, Outcome};

/// How many jobs a [`Driver`] run takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    /// At most one job, then stop
    One,
    /// Every job currently queued, then stop
    ///
    /// A job resubmitted during the run is not attempted a second time.
    All,
    /// Keep taking jobs, polling while the queue is empty, until shutdown
    #[default]
    Forever,
}

impl FromStr for ProcessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one" => Ok(Self::One),
            "all" => Ok(Self::All),
            "forever" => Ok(Self::Forever),
            other => Err(format!(
                "unknown mode {other:?}, expected one of: forever, all, one"
            )),
        }
    }
}

impl fmt::Display for ProcessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::One => "one",
            Self::All => "all",
            Self::Forever => "forever",
        })
    }
}

/// Counts of what a run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub finished: usize,
    pub failed: usize,
    pub resubmitted: usize,
    /// Jobs whose terminal queue transition failed
    pub errors: usize,
    /// Jobs reclaimed from dead workers before the first take
    pub rescued: usize,
}

impl DriverStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Finished => self.finished += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Resubmitted => self.resubmitted += 1,
        }
    }

    /// Number of jobs taken from the queue
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.finished + self.failed + self.resubmitted + self.errors
    }
}

impl fmt::Display for DriverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} finished, {} failed, {} resubmitted, {} errors, {} rescued",
            self.finished, self.failed, self.resubmitted, self.errors, self.rescued
        )
    }
}

/// Feeds jobs from a queue to a [`JobProcessor`]
#[derive(Debug, Clone)]
pub struct Driver {
    queue: Arc<dyn Queue>,
    processor: JobProcessor,
    poll_interval: Duration,
}

/// Whether a shutdown has been signalled, without waiting
///
/// A closed channel means nobody is left to ask us to keep running.
fn shutdown_requested(shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    loop {
        match shutdown.try_recv() {
            Ok(Signal::Shutdown | Signal::Finalised) | Err(TryRecvError::Closed) => return true,
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) => return false,
        }
    }
}

impl Driver {
    #[must_use]
    pub fn new(queue: Arc<dyn Queue>, processor: JobProcessor, poll_interval: Duration) -> Self {
        Self {
            queue,
            processor,
            poll_interval,
        }
    }

    /// Take and process jobs according to `mode`
    ///
    /// Jobs abandoned by dead workers are returned to the queue before the
    /// first take. After a job is resubmitted the driver waits one poll
    /// interval before taking another. Shutdown is honoured between jobs,
    /// never in the middle of one.
    ///
    /// # Errors
    /// If reclaiming or taking jobs fails
    pub async fn run(
        &self,
        mode: ProcessMode,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<DriverStats, QueueError> {
        let mut stats = DriverStats {
            rescued: self.queue.rescue_dead_jobs().await?,
            ..DriverStats::default()
        };

        if stats.rescued > 0 {
            internal!(level = INFO, "Rescued {} abandoned jobs", stats.rescued);
        }

        internal!(level = INFO, "Processing jobs in {mode} mode");

        let mut held = Vec::new();
        let result = self
            .take_and_process(mode, &mut shutdown, &mut stats, &mut held)
            .await;

        for job in held {
            job.submit().await?;
            internal!(level = DEBUG, "Returned job {} to the queue", job.name());
        }

        result?;

        internal!(level = INFO, "Stopped: {stats}");
        Ok(stats)
    }

    /// The take loop of [`Driver::run`]
    ///
    /// In [`ProcessMode::All`] a job resubmitted earlier in the run is not
    /// attempted again: it is moved to `held` until the queue runs dry.
    async fn take_and_process(
        &self,
        mode: ProcessMode,
        shutdown: &mut broadcast::Receiver<Signal>,
        stats: &mut DriverStats,
        held: &mut Vec<Box<dyn Job>>,
    ) -> Result<(), QueueError> {
        let mut resubmitted: AHashSet<JobName> = AHashSet::new();

        while !shutdown_requested(shutdown) {
            let Some(job) = self.queue.take().await? else {
                if mode != ProcessMode::Forever {
                    break;
                }

                tokio::select! {
                    () = tokio::time::sleep(self.poll_interval) => continue,
                    _ = shutdown.recv() => break,
                }
            };

            if mode == ProcessMode::All && resubmitted.contains(job.name()) {
                held.push(job);
                continue;
            }

            let outcome = match self.processor.process(job.as_ref()).await {
                Ok(outcome) => {
                    stats.record(outcome);
                    Some(outcome)
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::error!(job = %job.name(), error = %e, "Unable to move job to its final state");
                    None
                }
            };

            if mode == ProcessMode::One {
                break;
            }

            if outcome == Some(Outcome::Resubmitted) {
                resubmitted.insert(job.name().clone());

                tokio::select! {
                    () = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.recv() => break,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("one".parse(), Ok(ProcessMode::One));
        assert_eq!("all".parse(), Ok(ProcessMode::All));
        assert_eq!("forever".parse(), Ok(ProcessMode::Forever));
        assert!("sometimes".parse::<ProcessMode>().is_err());
        assert_eq!(ProcessMode::default().to_string(), "forever");
    }

    #[test]
    fn test_shutdown_requested() {
        let (tx, mut rx) = broadcast::channel(4);
        assert!(!shutdown_requested(&mut rx));

        tx.send(Signal::Shutdown).expect("send");
        assert!(shutdown_requested(&mut rx));

        drop(tx);
        assert!(shutdown_requested(&mut rx));
    }
}
