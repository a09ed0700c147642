//! Transmission service seam for mailrail
//!
//! [`TransmissionService`] is the interface the send loop talks to. The
//! production implementation is [`SesService`], backed by the Amazon SES v2
//! API. [`MockService`] records every request and replays scripted outcomes
//! for tests.

mod error;
mod mock;
mod request;
mod service;
mod ses;

pub use error::ServiceError;
pub use mock::MockService;
pub use request::{CHARSET, TransmissionRequest};
pub use service::TransmissionService;
pub use ses::SesService;
