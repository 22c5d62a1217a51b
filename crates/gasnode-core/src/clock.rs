//! Time source used by every timed step of the duty cycle.

use core::future::Future;

use embassy_time::{Duration, Instant};

use crate::watchdog::Watchdog;

/// Monotonic clock plus a short, non-sleeping delay.
///
/// `delay` is for sub-second pacing (sample spacing, backoff, inter-send
/// pauses) and keeps the CPU in its normal run mode. Long low-power waits go
/// through [`crate::power::LowPower`] instead.
pub trait Clock {
    /// Monotonic time since boot
    fn now(&self) -> Instant;

    /// Timestamp attached to readings, in seconds
    ///
    /// Defaults to seconds since boot. Boards with a synced RTC override this
    /// to return wall-clock time.
    fn timestamp(&self) -> u64 {
        self.now().as_secs()
    }

    /// Wait for `duration` without entering a low-power state
    fn delay(&mut self, duration: Duration) -> impl Future<Output = ()>;
}

/// Time elapsed since `since`, saturating at zero if the clock went backwards.
pub fn elapsed_since<C: Clock>(clock: &C, since: Instant) -> Duration {
    clock
        .now()
        .checked_duration_since(since)
        .unwrap_or(Duration::from_ticks(0))
}

/// Wait for `total` in `step`-sized delays, feeding the watchdog before each.
///
/// Used for waits that are too long for one watchdog period but too short to
/// be worth a low-power suspend, such as sensor warmup and the pause after a
/// failed cycle.
pub async fn wait_fed<C: Clock, W: Watchdog>(
    clock: &mut C,
    watchdog: &mut W,
    total: Duration,
    step: Duration,
) {
    let step = if step.as_ticks() == 0 { total } else { step };
    let mut remaining = total;

    while remaining.as_ticks() > 0 {
        watchdog.feed();
        let chunk = remaining.min(step);
        clock.delay(chunk).await;
        remaining = remaining - chunk;
    }
    watchdog.feed();
}
