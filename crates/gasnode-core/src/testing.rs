//! Test doubles for the hardware ports.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;

use embassy_time::{Duration, Instant};

use crate::clock::Clock;
use crate::power::{LowPower, PowerError};
use crate::reading::Reading;
use crate::relay::{NoteBody, RelayRequest, RelayResponse, RelayTransport, TransportError};
use crate::sensors::{AnalogInput, SensorError};
use crate::watchdog::Watchdog;

pub(crate) fn reading_at(timestamp: u64) -> Reading {
    Reading::new(timestamp, 1.5, 45.45)
}

/// Clock that only moves when something waits on it.
///
/// Clones share the same time, so a [`RecordingPower`] can advance it.
#[derive(Debug, Clone)]
pub(crate) struct ManualClock {
    now: Rc<Cell<Instant>>,
    start: Instant,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::at(0)
    }

    pub fn at(secs: u64) -> Self {
        let start = Instant::from_secs(secs);
        Self {
            now: Rc::new(Cell::new(start)),
            start,
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.start
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    async fn delay(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

/// ADC returning a fixed script of results.
pub(crate) struct ScriptedAdc {
    script: Vec<Result<u16, SensorError>>,
    repeat: bool,
    reads: usize,
}

impl ScriptedAdc {
    /// Play `script` once, then report not ready
    pub fn new(script: &[Result<u16, SensorError>]) -> Self {
        Self {
            script: script.to_vec(),
            repeat: false,
            reads: 0,
        }
    }

    /// Play `script` in a loop
    pub fn cycle(script: &[Result<u16, SensorError>]) -> Self {
        Self {
            repeat: true,
            ..Self::new(script)
        }
    }

    /// ADC reading `volts` on every read, assuming a 3.3 V reference
    pub fn steady(volts: f32) -> Self {
        let raw = (volts / 3.3 * u16::MAX as f32) as u16;
        Self::cycle(&[Ok(raw)])
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl AnalogInput for ScriptedAdc {
    async fn read_raw(&mut self) -> Result<u16, SensorError> {
        let index = self.reads;
        self.reads += 1;

        let step = if self.repeat && !self.script.is_empty() {
            self.script.get(index % self.script.len())
        } else {
            self.script.get(index)
        };
        step.copied()
            .unwrap_or(Err(SensorError::NotReady { sensor: "scripted" }))
    }
}

/// Relay that records every request and answers from a script.
#[derive(Default)]
pub(crate) struct ScriptedRelay {
    /// Number of `open` calls that fail before one succeeds
    pub open_failures: u8,
    pub opens: u8,
    /// Every request received, accepted or not
    pub requests: Vec<RelayRequest>,
    /// Bodies of accepted `note.add` requests
    pub delivered: Vec<NoteBody>,
    /// Outcomes for upcoming `note.add` requests; accepted once exhausted
    note_outcomes: VecDeque<Result<(), TransportError>>,
}

impl ScriptedRelay {
    pub fn online() -> Self {
        Self::default()
    }

    /// Relay whose first `failures` opens fail
    pub fn failing_opens(failures: u8) -> Self {
        Self {
            open_failures: failures,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::failing_opens(u8::MAX)
    }

    pub fn script_notes(&mut self, outcomes: &[Result<(), TransportError>]) {
        self.note_outcomes.extend(outcomes.iter().cloned());
    }

    /// Names of every request, in order
    pub fn request_names(&self) -> Vec<&'static str> {
        self.requests.iter().map(RelayRequest::name).collect()
    }
}

impl RelayTransport for ScriptedRelay {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.opens = self.opens.saturating_add(1);
        if self.opens <= self.open_failures {
            Err(TransportError::NotResponding)
        } else {
            Ok(())
        }
    }

    async fn transact(&mut self, request: &RelayRequest) -> Result<RelayResponse, TransportError> {
        self.requests.push(request.clone());

        let RelayRequest::NoteAdd { body, .. } = request else {
            return Ok(RelayResponse::ok());
        };
        self.note_outcomes.pop_front().unwrap_or(Ok(()))?;
        self.delivered.push(*body);
        Ok(RelayResponse::ok())
    }
}

/// Watchdog that counts feeds and, given a clock, stamps each one.
#[derive(Debug, Default)]
pub(crate) struct CountingWatchdog {
    pub feeds: u32,
    pub timeout: Option<Duration>,
    /// Time of `configure` followed by every feed after it
    pub fed_at: Vec<Instant>,
    clock: Option<ManualClock>,
}

impl CountingWatchdog {
    pub fn with_clock(clock: &ManualClock) -> Self {
        Self {
            clock: Some(clock.clone()),
            ..Self::default()
        }
    }

    /// Longest stretch without a feed between arming and `now`
    pub fn longest_gap(&self, now: Instant) -> Duration {
        let mut longest = Duration::from_ticks(0);
        let mut previous: Option<Instant> = None;
        for at in self.fed_at.iter().copied().chain(core::iter::once(now)) {
            if let Some(previous) = previous {
                longest = longest.max(at - previous);
            }
            previous = Some(at);
        }
        longest
    }

    fn stamp(&mut self) {
        if let Some(clock) = &self.clock {
            self.fed_at.push(clock.now());
        }
    }
}

impl Watchdog for CountingWatchdog {
    fn configure(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
        self.stamp();
    }

    fn feed(&mut self) {
        self.feeds += 1;
        self.stamp();
    }
}

/// Low-power port that records each request and optionally advances a clock.
#[derive(Default)]
pub(crate) struct RecordingPower {
    pub suspends: Vec<Duration>,
    pub idles: Vec<Duration>,
    pub reclaims: u32,
    pub fail_suspend: bool,
    clock: Option<ManualClock>,
}

impl RecordingPower {
    pub fn with_clock(clock: &ManualClock) -> Self {
        Self {
            clock: Some(clock.clone()),
            ..Self::default()
        }
    }

    fn pass(&self, duration: Duration) {
        if let Some(clock) = &self.clock {
            clock.advance(duration);
        }
    }
}

impl LowPower for RecordingPower {
    async fn suspend(&mut self, duration: Duration) -> Result<(), PowerError> {
        if self.fail_suspend {
            return Err(PowerError::Unsupported);
        }
        self.suspends.push(duration);
        self.pass(duration);
        Ok(())
    }

    async fn idle(&mut self, duration: Duration) {
        self.idles.push(duration);
        self.pass(duration);
    }

    fn reclaim(&mut self) {
        self.reclaims += 1;
    }
}
