use mailrail_queue::Job;
use mailrail_ses::ServiceError;

use super::JobProcessor;
use crate::{AimdTokenBucket, CheckpointStore, JobError, Mailing, Spec};

impl JobProcessor {
    /// Building: parse, validate and compile the job's spec
    pub(super) async fn build(&self, job: &dyn Job) -> Result<Mailing, JobError> {
        let spec = Spec::load(job).await?;
        spec.validate()?;

        let mailing = Mailing::compile(spec)?;
        tracing::debug!(
            job = %job.name(),
            recipients = mailing.len(),
            "Compiled mailing"
        );

        Ok(mailing)
    }

    /// DryRunning: resolve every recipient before anything is sent
    pub(super) fn dry_run(&self, job: &dyn Job, mailing: &Mailing) -> Result<(), JobError> {
        mailing.dry_run(&self.mangler)?;
        tracing::debug!(job = %job.name(), "Dry run passed");
        Ok(())
    }

    /// RateQuerying: discover the ceiling for this job's send rate
    pub(super) async fn query_rate(&self, job: &dyn Job) -> Result<f64, JobError> {
        let rate = self
            .service()
            .max_send_rate()
            .await
            .map_err(JobError::RateQuery)?;

        if !rate.is_finite() || rate <= 0.0 {
            return Err(JobError::RateQuery(ServiceError::Transport(format!(
                "unusable maximum send rate {rate}"
            ))));
        }

        tracing::debug!(job = %job.name(), rate, "Discovered maximum send rate");
        Ok(rate)
    }

    /// Sending and Checkpointing: the rate-limited loop over recipients
    ///
    /// Starts at the stored checkpoint. Each recipient is retried until it
    /// is confirmed or fails fatally, and is checkpointed as soon as it is
    /// confirmed.
    pub(super) async fn send_all(
        &self,
        job: &dyn Job,
        mailing: &Mailing,
        ceiling: f64,
    ) -> Result<(), JobError> {
        let name = job.name();
        let checkpoint = CheckpointStore::new(job);

        // Dropped on every return path, which stops the pacer
        let mut bucket = AimdTokenBucket::start(self.rate.settings(ceiling));

        let resume = checkpoint.get().await?;
        if resume > mailing.len() {
            tracing::warn!(
                job = %name,
                checkpoint = resume,
                recipients = mailing.len(),
                "Checkpoint is past the end of the recipient list"
            );
        } else if resume > 0 {
            tracing::info!(job = %name, checkpoint = resume, "Resuming job");
        }

        for index in resume..mailing.len() {
            let (message_id, rate) = loop {
                let Some(rate) = bucket.next_token().await else {
                    return Err(JobError::Internal("send rate pacer stopped".to_string()));
                };

                let request = mailing.resolve(index, &self.mangler)?;
                match self.mangler.send(self.service(), &request).await {
                    Ok(message_id) => break (message_id, rate),
                    Err(err) if self.classifier.is_transient(&err) => {
                        let rate = bucket.backoff();
                        tracing::warn!(
                            job = %name,
                            recipient = index,
                            code = err.code(),
                            request_id = err.request_id(),
                            rate,
                            "Transmission throttled, backing off"
                        );
                    }
                    Err(err) => return Err(self.classifier.classify(index, err)),
                }
            };

            tracing::debug!(
                job = %name,
                recipient = index,
                message_id = %message_id,
                rate,
                "Transmission confirmed"
            );

            checkpoint.set(index + 1).await?;
        }

        Ok(())
    }
}
