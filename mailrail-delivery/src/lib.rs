//! Mail-merge job processing
//!
//! A job's `spec` attribute describes one message template and a list of
//! recipients. The [`JobProcessor`] renders and sends one message per
//! recipient, paced by an [`AimdTokenBucket`] and checkpointed after every
//! confirmed send so that an interrupted job resumes where it stopped. The
//! [`Driver`] feeds jobs from a queue to the processor.

mod address;
mod checkpoint;
pub(crate) mod classify;
pub mod config;
mod driver;
mod error;
mod mailing;
mod mangler;
mod processor;
mod rate_limiter;
mod spec;

pub use address::format_source;
pub use checkpoint::{CHECKPOINT_ATTRIBUTE, CheckpointStore};
pub use classify::{Classifier, DEFAULT_TRANSIENT_CODES};
pub use config::{DeliveryConfig, RateConfig};
pub use driver::{Driver, DriverStats, ProcessMode};
pub use error::{Body, Disposition, JobError, ValidationFault};
pub use mailing::Mailing;
pub use mangler::{Mangler, NULL_MESSAGE_ID, SIMULATOR_ADDRESS};
pub use processor::{JobProcessor, Outcome};
pub use rate_limiter::{AimdSettings, AimdTokenBucket};
pub use spec::{Recipient, SPEC_ATTRIBUTE, Spec};
