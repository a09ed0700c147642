use std::sync::Arc;

use mailrail_ses::{ServiceError, TransmissionRequest, TransmissionService};

/// Message id reported for a send that was suppressed
pub const NULL_MESSAGE_ID: &str = "NullMangler";

/// SES mailbox simulator address that accepts and discards every message
pub const SIMULATOR_ADDRESS: &str = "success@simulator.amazonses.com";

/// Indirection over where messages go and whether they go at all
///
/// Used by tests and operators to exercise a job without mailing its real
/// recipients. Values are immutable once built.
#[derive(Debug, Clone, Default)]
pub enum Mangler {
    /// Send to the recipient's own address
    #[default]
    PassThrough,
    /// Resolve every request but transmit nothing
    SuppressSend,
    /// Send every message to one fixed address
    RedirectTo(String),
    /// Send every message to the SES mailbox simulator
    RedirectToSimulator,
    /// Send through a different transmission service
    WithService(Arc<dyn TransmissionService>),
}

impl Mangler {
    pub fn redirect_to(addr: impl Into<String>) -> Self {
        Self::RedirectTo(addr.into())
    }

    pub fn with_service(service: Arc<dyn TransmissionService>) -> Self {
        Self::WithService(service)
    }

    #[must_use]
    pub const fn should_send(&self) -> bool {
        !matches!(self, Self::SuppressSend)
    }

    /// The destination a message for `addr` is actually sent to
    #[must_use]
    pub fn mangle_address<'a>(&'a self, addr: &'a str) -> &'a str {
        match self {
            Self::RedirectTo(to) => to.as_str(),
            Self::RedirectToSimulator => SIMULATOR_ADDRESS,
            Self::PassThrough | Self::SuppressSend | Self::WithService(_) => addr,
        }
    }

    /// The service override, if any
    #[must_use]
    pub fn service(&self) -> Option<&Arc<dyn TransmissionService>> {
        match self {
            Self::WithService(service) => Some(service),
            _ => None,
        }
    }

    /// Send through `service` unless sending is suppressed
    ///
    /// Returns the service's message id, or [`NULL_MESSAGE_ID`] when nothing
    /// was sent.
    pub async fn send(
        &self,
        service: &dyn TransmissionService,
        request: &TransmissionRequest,
    ) -> Result<String, ServiceError> {
        if self.should_send() {
            service.send_email(request).await
        } else {
            Ok(NULL_MESSAGE_ID.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use mailrail_ses::MockService;

    use super::*;

    #[test]
    fn test_address_mangling() {
        let original = "jane@example.com";

        assert_eq!(Mangler::PassThrough.mangle_address(original), original);
        assert_eq!(Mangler::SuppressSend.mangle_address(original), original);
        assert_eq!(
            Mangler::redirect_to("qa@example.com").mangle_address(original),
            "qa@example.com"
        );
        assert_eq!(
            Mangler::RedirectToSimulator.mangle_address(original),
            SIMULATOR_ADDRESS
        );

        let service: Arc<dyn TransmissionService> = Arc::new(MockService::new());
        assert_eq!(
            Mangler::with_service(service).mangle_address(original),
            original
        );
    }

    #[test]
    fn test_should_send() {
        assert!(Mangler::PassThrough.should_send());
        assert!(!Mangler::SuppressSend.should_send());
        assert!(Mangler::redirect_to("qa@example.com").should_send());
        assert!(Mangler::RedirectToSimulator.should_send());
        assert!(Mangler::PassThrough.service().is_none());
    }

    #[tokio::test]
    async fn test_suppressed_send_never_reaches_service() {
        let service = MockService::new();
        let request = TransmissionRequest::default();

        let id = Mangler::SuppressSend
            .send(&service, &request)
            .await
            .expect("suppressed send succeeds");
        assert_eq!(id, NULL_MESSAGE_ID);
        assert!(service.attempts().is_empty());

        let id = Mangler::PassThrough
            .send(&service, &request)
            .await
            .expect("send succeeds");
        assert_eq!(id, "mock-1");
        assert_eq!(service.sent_count(), 1);
    }
}
