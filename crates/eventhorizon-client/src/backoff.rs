use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Exponential delay with full jitter.
///
/// Starts at zero so the first attempt is immediate. Each failure doubles
/// the delay up to `max`; each recovery halves it and drops back to zero
/// once it would fall below `min`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(Duration::from_millis(1));
        Self {
            min,
            max: max.max(min),
            current: Duration::ZERO,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn backoff(&mut self) {
        self.current = if self.current.is_zero() {
            self.min
        } else {
            self.current.saturating_mul(2).min(self.max)
        };
    }

    pub fn recover(&mut self) {
        let halved = self.current / 2;
        self.current = if halved < self.min {
            Duration::ZERO
        } else {
            halved
        };
    }

    /// Uniform in `[0, current)`.
    pub fn jitter(&self) -> Duration {
        if self.current.is_zero() {
            return Duration::ZERO;
        }
        let upper = self.current.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rand::thread_rng().gen_range(0..upper))
    }

    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        self.wait_at_least(cancel, Duration::ZERO).await
    }

    /// Sleeps for the larger of the jittered delay and `floor`.
    pub async fn wait_at_least(&self, cancel: &CancellationToken, floor: Duration) -> Result<()> {
        let delay = self.jitter().max(floor);
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
