use async_trait::async_trait;

use crate::{ServiceError, TransmissionRequest};

/// A bulk email transmission service
#[async_trait]
pub trait TransmissionService: Send + Sync + std::fmt::Debug {
    /// Transmit one message, returning the service-assigned message id
    async fn send_email(&self, request: &TransmissionRequest) -> Result<String, ServiceError>;

    /// The account's current maximum send rate, in messages per second
    async fn max_send_rate(&self) -> Result<f64, ServiceError>;
}
