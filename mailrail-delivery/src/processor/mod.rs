//! Job processing orchestration
//!
//! A [`JobProcessor`] carries one job through its phases:
//!
//! ```text
//! Building -> DryRunning -> RateQuerying -> Sending(i) -> Checkpointing(i) -> ... -> Finishing
//! ```
//!
//! and then makes exactly one terminal call on the job: `finish`, `fail`, or
//! `submit` for a later attempt.

mod send;

use std::{fmt, sync::Arc};

use mailrail_queue::{Job, QueueError};
use mailrail_ses::TransmissionService;

use crate::{Classifier, DeliveryConfig, Disposition, JobError, Mangler, config::RateConfig};

/// How a job left the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every recipient was confirmed
    Finished,
    /// The job was marked failed
    Failed,
    /// The job was put back on the queue
    Resubmitted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Resubmitted => "resubmitted",
        })
    }
}

/// Processes one job at a time, end to end
#[derive(Debug, Clone)]
pub struct JobProcessor {
    service: Arc<dyn TransmissionService>,
    mangler: Mangler,
    classifier: Classifier,
    rate: RateConfig,
}

impl JobProcessor {
    /// A processor sending through `service` unless the mangler overrides it
    #[must_use]
    pub fn new(
        service: Arc<dyn TransmissionService>,
        mangler: Mangler,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            service,
            mangler,
            classifier: config.classifier(),
            rate: config.rate,
        }
    }

    #[must_use]
    pub const fn mangler(&self) -> &Mangler {
        &self.mangler
    }

    /// The service messages actually go through
    fn service(&self) -> &dyn TransmissionService {
        self.mangler.service().unwrap_or(&self.service).as_ref()
    }

    /// Process `job` and move it to its terminal state
    ///
    /// # Errors
    /// Only if the terminal queue transition itself fails. Processing
    /// failures are reflected in the returned [`Outcome`].
    #[tracing::instrument(level = "debug", skip_all, fields(job = %job.name()))]
    pub async fn process(&self, job: &dyn Job) -> Result<Outcome, QueueError> {
        let name = job.name();

        let Err(err) = self.run(job).await else {
            job.finish().await?;
            tracing::info!(job = %name, "Job finished");
            return Ok(Outcome::Finished);
        };

        let code = err.service_error().and_then(|e| e.code());
        let request_id = err.service_error().and_then(|e| e.request_id());

        match err.disposition() {
            Disposition::Resubmit => {
                tracing::warn!(
                    job = %name,
                    code,
                    request_id,
                    error = %err,
                    "Job resubmitted"
                );
                job.submit().await?;
                Ok(Outcome::Resubmitted)
            }
            // Transient errors are retried inside the send loop and never escape it
            Disposition::Fail | Disposition::Retry => {
                tracing::error!(
                    job = %name,
                    recipient = err.recipient(),
                    code,
                    request_id,
                    error = %err,
                    "Job failed"
                );
                job.fail().await?;
                Ok(Outcome::Failed)
            }
        }
    }

    async fn run(&self, job: &dyn Job) -> Result<(), JobError> {
        let mailing = self.build(job).await?;
        self.dry_run(job, &mailing)?;
        let ceiling = self.query_rate(job).await?;
        self.send_all(job, &mailing, ceiling).await
    }
}
