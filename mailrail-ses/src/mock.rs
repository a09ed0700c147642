use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{ServiceError, TransmissionRequest, TransmissionService};

#[derive(Debug)]
struct State {
    quota: Result<f64, ServiceError>,
    quota_queries: usize,
    script: VecDeque<Option<ServiceError>>,
    attempts: Vec<TransmissionRequest>,
    sent: Vec<(String, TransmissionRequest)>,
}

/// Recording transmission service for tests
///
/// Every `send_email` call is recorded. Outcomes are scripted per attempt:
/// queued errors are returned in order, and once the script runs dry every
/// attempt succeeds with a message id of the form `mock-{n}`.
#[derive(Debug)]
pub struct MockService {
    state: Mutex<State>,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                quota: Ok(1000.0),
                quota_queries: 0,
                script: VecDeque::new(),
                attempts: Vec::new(),
                sent: Vec::new(),
            }),
        }
    }
}

impl MockService {
    /// A service with a quota of 1000 messages per second that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this maximum send rate
    #[must_use]
    pub fn with_quota(self, rate: f64) -> Self {
        self.state.lock().quota = Ok(rate);
        self
    }

    /// Fail every quota query with `err`
    #[must_use]
    pub fn with_quota_error(self, err: ServiceError) -> Self {
        self.state.lock().quota = Err(err);
        self
    }

    /// Let the next queued attempt succeed
    pub fn then_succeed(&self) {
        self.state.lock().script.push_back(None);
    }

    /// Fail the next queued attempt with `err`
    pub fn then_fail(&self, err: ServiceError) {
        self.state.lock().script.push_back(Some(err));
    }

    /// Fail the next `times` queued attempts with `err`
    pub fn then_fail_times(&self, err: &ServiceError, times: usize) {
        let mut state = self.state.lock();
        for _ in 0..times {
            state.script.push_back(Some(err.clone()));
        }
    }

    /// Every request passed to `send_email`, including failed attempts
    #[must_use]
    pub fn attempts(&self) -> Vec<TransmissionRequest> {
        self.state.lock().attempts.clone()
    }

    /// Requests that were accepted, in order
    #[must_use]
    pub fn sent(&self) -> Vec<TransmissionRequest> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Message ids handed out, in order
    #[must_use]
    pub fn message_ids(&self) -> Vec<String> {
        self.state.lock().sent.iter().map(|(id, _)| id.clone()).collect()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    #[must_use]
    pub fn last_sent(&self) -> Option<TransmissionRequest> {
        self.state.lock().sent.last().map(|(_, request)| request.clone())
    }

    #[must_use]
    pub fn quota_queries(&self) -> usize {
        self.state.lock().quota_queries
    }
}

#[async_trait]
impl TransmissionService for MockService {
    async fn send_email(&self, request: &TransmissionRequest) -> Result<String, ServiceError> {
        let mut state = self.state.lock();
        state.attempts.push(request.clone());

        if let Some(err) = state.script.pop_front().flatten() {
            return Err(err);
        }

        let id = format!("mock-{}", state.sent.len() + 1);
        state.sent.push((id.clone(), request.clone()));
        Ok(id)
    }

    async fn max_send_rate(&self) -> Result<f64, ServiceError> {
        let mut state = self.state.lock();
        state.quota_queries += 1;
        state.quota.clone()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let service = MockService::new().with_quota(14.0);
        assert_eq!(service.max_send_rate().await, Ok(14.0));

        service.then_fail(ServiceError::api("Throttling", "slow down"));
        service.then_succeed();
        service.then_fail(ServiceError::api("MessageRejected", "no"));

        let request = TransmissionRequest::default();
        assert!(service.send_email(&request).await.is_err());
        assert_eq!(service.send_email(&request).await, Ok("mock-1".to_string()));
        assert!(service.send_email(&request).await.is_err());
        assert_eq!(service.send_email(&request).await, Ok("mock-2".to_string()));

        assert_eq!(service.attempts().len(), 4);
        assert_eq!(service.sent_count(), 2);
        assert_eq!(service.message_ids(), vec!["mock-1", "mock-2"]);
        assert_eq!(service.quota_queries(), 1);
    }

    #[tokio::test]
    async fn test_quota_error() {
        let service =
            MockService::new().with_quota_error(ServiceError::Transport("timed out".to_string()));
        assert!(service.max_send_rate().await.is_err());
    }
}
