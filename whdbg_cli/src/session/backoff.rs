//! Reconnection backoff for the listener stream

use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt
    pub initial_backoff: Duration,
    /// Upper bound for the delay
    pub max_backoff: Duration,
    /// Growth factor applied after each attempt
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random (0.0 disables)
    pub jitter: f64,
    /// Maximum number of consecutive attempts (None = unlimited)
    pub max_attempts: Option<usize>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackoffError {
    #[error("Gave up after {0} reconnection attempts")]
    MaxAttemptsReached(usize),
}

/// Exponential backoff between reconnection attempts
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
    attempt: usize,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current: config.initial_backoff,
            config,
            attempt: 0,
        }
    }

    /// Sleep before the next attempt and grow the delay
    pub async fn wait(&mut self) -> Result<(), BackoffError> {
        self.attempt += 1;

        if let Some(max) = self.config.max_attempts {
            if self.attempt > max {
                return Err(BackoffError::MaxAttemptsReached(max));
            }
        }

        let delay = self.jittered(self.current);
        tracing::debug!(
            "Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            self.attempt
        );
        sleep(delay).await;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.config.multiplier);
        self.current = next.min(self.config.max_backoff);

        Ok(())
    }

    /// Call after a connection was established
    pub fn reset(&mut self) {
        self.current = self.config.initial_backoff;
        self.attempt = 0;
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return delay;
        }
        let spread = self.config.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }
}
