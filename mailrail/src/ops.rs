//! Operator actions on a queue, shared by `mailrailctl` and the tests

use mailrail_delivery::{CheckpointStore, JobError, Mailing, Mangler, SPEC_ATTRIBUTE, Spec};
use mailrail_queue::{JobName, Queue};

/// Create a job holding `spec` and submit it, returning its name
///
/// The spec is checked to be well-formed before anything is written.
///
/// # Errors
/// If the spec does not parse, or the queue rejects the job
pub async fn submit(queue: &dyn Queue, spec: &[u8]) -> Result<JobName, JobError> {
    Spec::parse(spec)?;

    let job = queue.create_job("mailing").await?;
    job.set(SPEC_ATTRIBUTE, spec).await?;
    job.submit().await?;

    tracing::info!(job = %job.name(), "Job submitted");
    Ok(job.name().clone())
}

/// Fully check a spec offline: parse, validate, compile, and resolve every
/// recipient through `mangler`
///
/// Returns the compiled mailing.
///
/// # Errors
/// The first fault found
pub fn validate(spec: &[u8], mangler: &Mangler) -> Result<Mailing, JobError> {
    let spec = Spec::parse(spec)?;
    spec.validate()?;

    let mailing = Mailing::compile(spec)?;
    for index in 0..mailing.len() {
        let request = mailing.resolve(index, mangler)?;
        tracing::debug!(
            recipient = index,
            source = %request.source,
            destination = %request.destination,
            subject = %request.subject,
            text = request.text.as_deref(),
            html = request.html.as_deref(),
            "Resolved request"
        );
    }

    Ok(mailing)
}

/// The number of recipients confirmed for job `name`
///
/// # Errors
/// If the job does not exist, or its checkpoint cannot be read
pub async fn checkpoint(queue: &dyn Queue, name: &JobName) -> Result<usize, JobError> {
    let job = queue.open_job(name).await?;
    CheckpointStore::new(job.as_ref()).get().await
}
