//! Host stand-ins for the board: clock, low-power modes and watchdog.
//!
//! All three share one time scale. At a scale of 60 a 5 minute cycle takes
//! 5 real seconds, and the watchdog's 8 s timeout shrinks to match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration as StdDuration, Instant as StdInstant, SystemTime, UNIX_EPOCH};

use embassy_time::{Duration, Instant};
use gasnode_core::{Clock, LowPower, PowerError, Watchdog};
use log::{debug, error};

/// Slowest accepted scale: one simulated millisecond per real second
pub const MIN_TIME_SCALE: f64 = 1e-3;
/// Fastest accepted scale
pub const MAX_TIME_SCALE: f64 = 1e6;

/// Converts between simulated and real time.
#[derive(Debug, Clone, Copy)]
pub struct TimeScale(f64);

impl TimeScale {
    /// Non-positive or NaN scales fall back to real time; others are clamped
    /// to [`MIN_TIME_SCALE`]..=[`MAX_TIME_SCALE`].
    pub fn new(scale: f64) -> Self {
        if scale > 0.0 {
            Self(scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE))
        } else {
            Self(1.0)
        }
    }

    /// Real time that passes while `simulated` elapses
    pub fn to_real(self, simulated: Duration) -> StdDuration {
        let secs = simulated.as_micros() as f64 / 1e6 / self.0;
        StdDuration::try_from_secs_f64(secs).unwrap_or(StdDuration::MAX)
    }

    pub fn to_simulated(self, real: StdDuration) -> Duration {
        Duration::from_micros((real.as_secs_f64() * self.0 * 1e6) as u64)
    }
}

/// Monotonic simulated clock anchored to the wall clock at start-up.
pub struct SimClock {
    started: StdInstant,
    boot_unix_secs: u64,
    scale: TimeScale,
}

impl SimClock {
    pub fn new(scale: TimeScale) -> Self {
        let boot_unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            started: StdInstant::now(),
            boot_unix_secs,
            scale,
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        let simulated = self.scale.to_simulated(self.started.elapsed());
        Instant::from_micros(simulated.as_micros())
    }

    /// Unix seconds, as if the board had a synced RTC
    fn timestamp(&self) -> u64 {
        self.boot_unix_secs + self.now().as_secs()
    }

    async fn delay(&mut self, duration: Duration) {
        thread::sleep(self.scale.to_real(duration));
    }
}

/// Light sleep is a scaled thread sleep. It can be switched off to exercise
/// the idle fallback.
pub struct SimPower {
    scale: TimeScale,
    light_sleep: bool,
}

impl SimPower {
    pub fn new(scale: TimeScale, light_sleep: bool) -> Self {
        Self { scale, light_sleep }
    }
}

impl LowPower for SimPower {
    async fn suspend(&mut self, duration: Duration) -> Result<(), PowerError> {
        if !self.light_sleep {
            return Err(PowerError::Unsupported);
        }
        thread::sleep(self.scale.to_real(duration));
        Ok(())
    }

    async fn idle(&mut self, duration: Duration) {
        thread::sleep(self.scale.to_real(duration));
    }

    fn reclaim(&mut self) {
        debug!("Reclaiming memory before sleep");
    }
}

struct WatchdogState {
    last_feed: StdInstant,
    /// Real-time timeout; `None` until configured
    timeout: Option<StdDuration>,
}

/// Watchdog backed by a monitor thread.
///
/// Once configured, the monitor calls the starvation handler if the
/// watchdog goes unfed for longer than the (scaled) timeout. The default
/// handler exits the process, which is what a board reset looks like from
/// the outside: the next run starts from a fresh boot with the buffer file
/// intact.
pub struct SoftWatchdog {
    state: Arc<Mutex<WatchdogState>>,
    stop: Arc<AtomicBool>,
    scale: TimeScale,
}

/// Exit code used when the watchdog fires
pub const WATCHDOG_EXIT_CODE: i32 = 3;

/// How often the monitor thread checks the last feed
const POLL_INTERVAL: StdDuration = StdDuration::from_millis(10);

impl SoftWatchdog {
    pub fn spawn(scale: TimeScale) -> Self {
        Self::spawn_with(scale, || {
            error!("Watchdog starved, resetting");
            std::process::exit(WATCHDOG_EXIT_CODE);
        })
    }

    pub fn spawn_with<F>(scale: TimeScale, on_starve: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let state = Arc::new(Mutex::new(WatchdogState {
            last_feed: StdInstant::now(),
            timeout: None,
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let monitor_state = Arc::clone(&state);
        let monitor_stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !monitor_stop.load(Ordering::Relaxed) {
                thread::sleep(POLL_INTERVAL);
                let starved = match monitor_state.lock() {
                    Ok(state) => state
                        .timeout
                        .is_some_and(|timeout| state.last_feed.elapsed() > timeout),
                    Err(_) => false,
                };
                if starved {
                    on_starve();
                    return;
                }
            }
        });

        Self { state, stop, scale }
    }

    fn with_state(&self, f: impl FnOnce(&mut WatchdogState)) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

impl Watchdog for SoftWatchdog {
    fn configure(&mut self, timeout: Duration) {
        let real = self.scale.to_real(timeout);
        self.with_state(|state| {
            state.timeout = Some(real);
            state.last_feed = StdInstant::now();
        });
    }

    fn feed(&mut self) {
        self.with_state(|state| state.last_feed = StdInstant::now());
    }
}

impl Drop for SoftWatchdog {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
