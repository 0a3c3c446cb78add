//! Per-package retry bookkeeping

use std::time::Duration;

/// Attempts left for one package and the pause between them
///
/// Exhaustion ends delivery of that package only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    remaining: u32,
    backoff: Duration,
    attempts: u32,
}

impl RetryState {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            remaining: max_retries,
            backoff,
            attempts: 0,
        }
    }

    /// Record a failed attempt; returns the pause before the next one, or
    /// `None` when no retries remain
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.backoff)
    }

    /// Record a successful attempt
    pub fn record_success(&mut self) {
        self.attempts += 1;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
