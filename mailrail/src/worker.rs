use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use mailrail_common::{Signal, internal};
use mailrail_delivery::{Driver, DriverStats, JobProcessor, Mangler, ProcessMode};
use mailrail_queue::{FileQueue, Queue};
use mailrail_ses::{SesService, TransmissionService};
use tokio::sync::broadcast;

use crate::Config;

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for SIGINT or SIGTERM, then ask the driver to stop
///
/// Returns once a second CTRL+C forces the shutdown.
#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, finishing the current job");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// A queue, a processor, and how to drive one over the other
#[derive(Debug)]
pub struct Worker {
    queue: Arc<dyn Queue>,
    processor: JobProcessor,
    config: Config,
}

impl Worker {
    /// Wire up a worker from configuration
    ///
    /// `queue_dir` overrides the configured queue. The transmission service
    /// is Amazon SES in the configured region, unless the mangler supplies
    /// its own service.
    ///
    /// # Errors
    /// If the queue cannot be opened, or no region is configured when one is
    /// needed
    pub async fn from_config(
        config: Config,
        mangler: Mangler,
        queue_dir: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let queue: Arc<dyn Queue> = match queue_dir {
            Some(path) => Arc::new(FileQueue::open(path).await?),
            None => config.queue.clone().into_queue().await?,
        };

        let service: Arc<dyn TransmissionService> = match mangler.service() {
            Some(service) => Arc::clone(service),
            None => Arc::new(SesService::from_region(config.region()?).await),
        };

        Ok(Self::new(queue, service, mangler, config))
    }

    #[must_use]
    pub fn new(
        queue: Arc<dyn Queue>,
        service: Arc<dyn TransmissionService>,
        mangler: Mangler,
        config: Config,
    ) -> Self {
        let processor = JobProcessor::new(service, mangler, &config.delivery);
        Self {
            queue,
            processor,
            config,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    /// Drive the queue until `mode` is satisfied or a shutdown is requested
    ///
    /// # Errors
    /// If the queue fails, signal handlers cannot be installed, or a second
    /// CTRL+C forces shutdown in the middle of a job
    #[tracing::instrument(level = "trace", skip(self), err)]
    pub async fn run(self, mode: ProcessMode) -> anyhow::Result<DriverStats> {
        internal!(level = INFO, "Worker running");

        let driver = Driver::new(
            self.queue,
            self.processor,
            self.config.delivery.poll_interval(),
        );

        let stats = tokio::select! {
            r = driver.run(mode, SHUTDOWN_BROADCAST.subscribe()) => r?,
            r = shutdown() => {
                r?;
                anyhow::bail!("Shutdown forced before the current job completed");
            }
        };

        internal!(level = INFO, "Shutting down...");

        Ok(stats)
    }
}
