//! Low-power waiting between cycles.

use core::future::Future;

use embassy_time::Duration;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::watchdog::Watchdog;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    #[error("low-power mode not supported")]
    Unsupported,
    #[error("suspend failed: {0}")]
    Failed(&'static str),
}

/// Port for the platform's sleep modes.
pub trait LowPower {
    /// Enter the platform's light-sleep state for `duration`
    fn suspend(&mut self, duration: Duration) -> impl Future<Output = Result<(), PowerError>>;

    /// Plain busy-or-idle wait, used when `suspend` is unavailable
    fn idle(&mut self, duration: Duration) -> impl Future<Output = ()>;

    /// Release whatever can be released before a long sleep
    fn reclaim(&mut self) {}
}

/// Splits long sleeps into watchdog-sized chunks.
pub struct PowerScheduler<P: LowPower> {
    power: P,
    chunk: Duration,
}

impl<P: LowPower> PowerScheduler<P> {
    /// `chunk` is the longest single suspend. A zero chunk is raised to 1 ms.
    pub fn new(power: P, chunk: Duration) -> Self {
        Self {
            power,
            chunk: chunk.max(Duration::from_millis(1)),
        }
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn power_mut(&mut self) -> &mut P {
        &mut self.power
    }

    pub fn chunk(&self) -> Duration {
        self.chunk
    }

    /// Sleep for `duration`, feeding the watchdog after every chunk.
    ///
    /// Returns how many chunks fell back to [`LowPower::idle`].
    pub async fn sleep_for<W: Watchdog>(&mut self, duration: Duration, watchdog: &mut W) -> u32 {
        watchdog.feed();
        self.power.reclaim();

        let mut remaining = duration;
        let mut fallbacks = 0;

        while remaining.as_ticks() > 0 {
            let chunk = remaining.min(self.chunk);
            if let Err(e) = self.power.suspend(chunk).await {
                debug!("Suspend unavailable ({}), idling {} ms", e, chunk.as_millis());
                self.power.idle(chunk).await;
                fallbacks += 1;
            }
            watchdog.feed();
            remaining = remaining - chunk;
        }

        if fallbacks > 0 {
            warn!("Low-power suspend failed for {} chunks", fallbacks);
        }
        fallbacks
    }

    /// Sleep out the rest of a cycle.
    ///
    /// The cycle period is `read_interval`; `active` is the time already
    /// spent sampling and delivering. Returns the time slept.
    pub async fn cycle_sleep<W: Watchdog>(
        &mut self,
        read_interval: Duration,
        active: Duration,
        watchdog: &mut W,
    ) -> Duration {
        let sleep = remaining_sleep(read_interval, active);
        info!("Sleeping for {} s", sleep.as_secs());
        self.sleep_for(sleep, watchdog).await;
        sleep
    }
}

/// `read_interval - active`, saturating at zero.
pub fn remaining_sleep(read_interval: Duration, active: Duration) -> Duration {
    read_interval
        .checked_sub(active)
        .unwrap_or(Duration::from_ticks(0))
}
