//! Bounded retry with a fixed backoff.

use embassy_time::Duration;
use log::warn;

use crate::clock::Clock;
use crate::watchdog::Watchdog;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. 0 behaves like 1.
    pub max_attempts: u8,
    /// Pause between two attempts
    pub backoff: Duration,
}

/// Returned when every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: u8,
    pub last: E,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u8, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A single attempt, no backoff
    pub const fn once() -> Self {
        Self::new(1, Duration::from_ticks(0))
    }

    pub const fn attempts(&self) -> u8 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` gets the 1-based attempt number. The watchdog is fed before each
    /// attempt and after each backoff.
    pub async fn run<T, E, C, W, F>(
        &self,
        clock: &mut C,
        watchdog: &mut W,
        mut op: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        C: Clock,
        W: Watchdog,
        E: core::fmt::Display,
        F: AsyncFnMut(u8) -> Result<T, E>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;

        loop {
            watchdog.feed();
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                    clock.delay(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
