//! Adaptive send-rate pacing
//!
//! An additive-increase / multiplicative-decrease token source. A background
//! task hands out tokens on request, at most one every `1 / rate` seconds,
//! with the rate read when the request arrives. Each backoff halves the rate
//! (never below the floor), and the rate climbs linearly back to the ceiling
//! over the recovery window once backoffs stop.
//!
//! # Example
//!
//! ```text
//! ceiling: 14/sec, floor: 1/sec, recovery: 300s
//! - Tokens flow at 14/sec
//! - Throttled: 14 -> 7/sec
//! - Throttled again: 7 -> 3.5/sec
//! - 150s without throttling: 3.5 + 13 * 0.5 = 10/sec
//! - 300s without throttling: back at 14/sec
//! ```

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, sleep},
};

/// Bounds and recovery speed of an [`AimdTokenBucket`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimdSettings {
    /// Highest rate, in tokens per second
    pub ceiling: f64,
    /// Lowest rate backoff can reach
    pub floor: f64,
    /// Time to climb from the floor back to the ceiling
    pub recovery: Duration,
}

#[derive(Debug)]
struct State {
    rate: f64,
    last_update: Instant,
    settings: AimdSettings,
}

impl State {
    /// Apply additive recovery up to `now` and return the current rate
    fn recover(&mut self, now: Instant) -> f64 {
        let AimdSettings {
            ceiling,
            floor,
            recovery,
        } = self.settings;

        if recovery.is_zero() {
            self.rate = ceiling;
        } else {
            let elapsed = now.saturating_duration_since(self.last_update);
            let increase = (ceiling - floor) * elapsed.as_secs_f64() / recovery.as_secs_f64();
            self.rate = (self.rate + increase).min(ceiling);
        }

        self.last_update = now;
        self.rate
    }

    fn backoff(&mut self, now: Instant) -> f64 {
        self.recover(now);
        self.rate = (self.rate / 2.0).max(self.settings.floor);
        self.rate
    }
}

/// Token source whose rate adapts to backoff signals
///
/// Dropping the bucket stops its background task.
#[derive(Debug)]
pub struct AimdTokenBucket {
    requests: mpsc::Sender<oneshot::Sender<f64>>,
    state: Arc<Mutex<State>>,
    pacer: JoinHandle<()>,
}

impl AimdTokenBucket {
    /// Start pacing at the ceiling
    ///
    /// Must be called from within a tokio runtime. A floor above the ceiling
    /// is lowered to the ceiling.
    #[must_use]
    pub fn start(settings: AimdSettings) -> Self {
        let settings = AimdSettings {
            floor: settings.floor.min(settings.ceiling),
            ..settings
        };

        let state = Arc::new(Mutex::new(State {
            rate: settings.ceiling,
            last_update: Instant::now(),
            settings,
        }));

        let (requests, rx) = mpsc::channel(1);
        let pacer = tokio::spawn(pace(rx, Arc::clone(&state)));

        Self {
            requests,
            state,
            pacer,
        }
    }

    /// Wait for the next token
    ///
    /// Returns the rate the token was paced at, or `None` if the pacer has
    /// stopped.
    pub async fn next_token(&mut self) -> Option<f64> {
        let (reply, token) = oneshot::channel();
        self.requests.send(reply).await.ok()?;
        token.await.ok()
    }

    /// Signal that the service pushed back, halving the rate
    ///
    /// Returns the new rate.
    pub fn backoff(&self) -> f64 {
        self.state.lock().backoff(Instant::now())
    }

    /// The rate currently in force
    #[must_use]
    pub fn current_rate(&self) -> f64 {
        self.state.lock().recover(Instant::now())
    }

    /// Whether the background pacer is still alive
    #[must_use]
    pub fn is_pacing(&self) -> bool {
        !self.pacer.is_finished()
    }
}

impl Drop for AimdTokenBucket {
    fn drop(&mut self) {
        self.pacer.abort();
    }
}

/// Answer token requests, spacing each one from the last by the rate in
/// force when it was asked for
async fn pace(mut requests: mpsc::Receiver<oneshot::Sender<f64>>, state: Arc<Mutex<State>>) {
    let mut last_issued: Option<Instant> = None;

    while let Some(reply) = requests.recv().await {
        let rate = state.lock().recover(Instant::now());

        if let Some(last) = last_issued {
            let interval = Duration::try_from_secs_f64(rate.recip()).unwrap_or(Duration::MAX);
            sleep(interval.saturating_sub(last.elapsed())).await;
        }

        last_issued = Some(Instant::now());
        // The requester may have given up waiting
        let _ = reply.send(rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(ceiling: f64) -> AimdSettings {
        AimdSettings {
            ceiling,
            floor: 1.0,
            recovery: Duration::from_secs(300),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_are_paced_at_the_ceiling() {
        let mut bucket = AimdTokenBucket::start(settings(10.0));

        let start = Instant::now();
        for _ in 0..11 {
            assert!(bucket.next_token().await.is_some());
        }
        let elapsed = start.elapsed();

        // The first token is immediate, the next ten are 100ms apart
        assert!(elapsed >= Duration::from_millis(990), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1010), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_halves_down_to_floor() {
        let bucket = AimdTokenBucket::start(settings(10.0));

        assert_close(bucket.backoff(), 5.0);
        assert_close(bucket.backoff(), 2.5);
        assert_close(bucket.backoff(), 1.25);
        assert_close(bucket.backoff(), 1.0);
        assert_close(bucket.backoff(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_additive_recovery() {
        let bucket = AimdTokenBucket::start(settings(11.0));
        for _ in 0..10 {
            bucket.backoff();
        }
        assert_close(bucket.current_rate(), 1.0);

        tokio::time::advance(Duration::from_secs(150)).await;
        assert_close(bucket.current_rate(), 6.0);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_close(bucket.current_rate(), 11.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_slows_tokens() {
        let mut bucket = AimdTokenBucket::start(settings(100.0));
        bucket.next_token().await;
        bucket.next_token().await;

        // 100/sec -> 3.125/sec, roughly 320ms between tokens
        for _ in 0..5 {
            bucket.backoff();
        }

        let start = Instant::now();
        let rate = bucket.next_token().await.expect("token");
        let elapsed = start.elapsed();

        assert!(rate < 4.0, "{rate}");
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_applies_to_the_very_next_token() {
        let mut bucket = AimdTokenBucket::start(settings(10.0));
        bucket.next_token().await;

        bucket.backoff();
        let start = Instant::now();
        let rate = bucket.next_token().await.expect("token");
        let elapsed = start.elapsed();

        // 5/sec rather than the 10/sec in force when the previous token went out
        assert_close(rate, 5.0);
        assert!(elapsed >= Duration::from_millis(195), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_the_pacer() {
        let mut bucket = AimdTokenBucket::start(settings(10.0));
        bucket.next_token().await;
        assert!(bucket.is_pacing());

        let metrics = tokio::runtime::Handle::current().metrics();
        assert_eq!(metrics.num_alive_tasks(), 1);

        drop(bucket);
        for _ in 0..10 {
            if metrics.num_alive_tasks() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(metrics.num_alive_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_floor_is_capped_at_ceiling() {
        let bucket = AimdTokenBucket::start(AimdSettings {
            ceiling: 0.5,
            floor: 1.0,
            recovery: Duration::from_secs(300),
        });

        assert_close(bucket.current_rate(), 0.5);
        assert_close(bucket.backoff(), 0.5);
    }
}
