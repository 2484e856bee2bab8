//! Reconnect pacing for callers.
//!
//! The session never reconnects by itself; a caller that sees
//! [`AgentEvent::Disconnected`](crate::types::AgentEvent::Disconnected)
//! and wants to run `start` again uses this to space out the attempts.

use std::time::Duration;

/// Jittered exponential back-off between `start` attempts.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    pub initial_delay: Duration,
    /// Cap applied before jitter.
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Consecutive failures before giving up; `0` retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectBackoff {
    /// Delay before attempt `attempt` (0-indexed): exponential, capped,
    /// plus up to 25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exp = attempt.min(i32::MAX as u32) as i32;
        let capped_ms = (base_ms * self.backoff_factor.powi(exp))
            .min(self.max_delay.as_millis() as f64);
        let jitter_ms = capped_ms * 0.25 * jitter_fraction(attempt);
        Duration::from_millis((capped_ms + jitter_ms) as u64)
    }

    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    /// Start a fresh schedule under this policy.
    pub fn schedule(&self) -> ReconnectSchedule {
        ReconnectSchedule {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// Attempt counter over a [`ReconnectBackoff`].
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    policy: ReconnectBackoff,
    attempt: u32,
}

impl ReconnectSchedule {
    /// Delay before the next attempt, or `None` once the policy gives up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.policy.should_give_up(self.attempt) {
            return None;
        }
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Call once a connection has been acknowledged by the agent.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Deterministic fraction in [0, 1) derived from the attempt number.
fn jitter_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_mul(2_654_435_761);
    f64::from(hash) / (f64::from(u32::MAX) + 1.0)
}
