//! The node's control loop.
//!
//! ```text
//! Booting -> Warmup -> Sampling -> Delivering -> Sleeping
//!                         ^                          |
//!                         +--------------------------+
//! ```
//!
//! Everything runs on one task and in that order; sampling and delivery never
//! overlap. A cycle that faults is logged, recovered per [`Fault::recovery`]
//! and followed by the next one. The loop itself never ends.

use embassy_time::Duration;
use log::{debug, error, info, warn};

use crate::clock::{Clock, elapsed_since, wait_fed};
use crate::config::NodeConfig;
use crate::error::{Fault, Recovery};
use crate::power::{LowPower, PowerScheduler};
use crate::reading::Reading;
use crate::relay::{DeliveryEngine, DeliveryResult, DeviceSession, RelayTransport};
use crate::sensors::{AnalogInput, Sampler};
use crate::storage::{DurableBuffer, LineStore};
use crate::watchdog::Watchdog;

/// Step used for watchdog-fed waits that are not worth a low-power suspend
const FED_WAIT_STEP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Booting,
    Warmup,
    Sampling,
    Delivering,
    Sleeping,
}

/// The platform adapters a node is assembled from.
pub struct NodeParts<A, C, P, S, T, W> {
    pub sensor: A,
    pub clock: C,
    pub power: P,
    pub store: S,
    pub transport: T,
    pub watchdog: W,
}

/// What one successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub reading: Reading,
    pub delivery: DeliveryResult,
    /// Readings left in the buffer after delivery
    pub pending: usize,
    pub slept: Duration,
}

/// Totals over a bounded run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u32,
    pub sent: u32,
    pub buffered: u32,
    pub dropped: u32,
    pub faults: u32,
}

impl RunSummary {
    fn record(&mut self, outcome: &Result<CycleReport, Fault>) {
        self.cycles += 1;
        match outcome {
            Ok(report) => match report.delivery {
                DeliveryResult::Sent => self.sent += 1,
                DeliveryResult::Buffered => self.buffered += 1,
                DeliveryResult::Dropped => self.dropped += 1,
            },
            Err(_) => self.faults += 1,
        }
    }
}

pub struct Supervisor<A, C, P, S, T, W>
where
    A: AnalogInput,
    C: Clock,
    P: LowPower,
    S: LineStore,
    T: RelayTransport,
    W: Watchdog,
{
    session: DeviceSession<T, W>,
    sensor: A,
    clock: C,
    scheduler: PowerScheduler<P>,
    buffer: DurableBuffer<S>,
    sampler: Sampler,
    delivery: DeliveryEngine,
    state: SupervisorState,
    cycles: u32,
}

impl<A, C, P, S, T, W> Supervisor<A, C, P, S, T, W>
where
    A: AnalogInput,
    C: Clock,
    P: LowPower,
    S: LineStore,
    T: RelayTransport,
    W: Watchdog,
{
    /// Bring the node up: arm the watchdog, connect to the relay (or go
    /// offline) and warm the sensor up.
    pub async fn boot(config: NodeConfig, parts: NodeParts<A, C, P, S, T, W>) -> Self {
        let NodeParts {
            sensor,
            mut clock,
            power,
            store,
            transport,
            watchdog,
        } = parts;

        info!("Booting H2S sensor node");
        let session = DeviceSession::establish(config, transport, watchdog, &mut clock).await;
        let config = session.config();
        let sampler = Sampler::new(config.sampler_config());
        let delivery = DeliveryEngine::from_config(config);
        let scheduler = PowerScheduler::new(power, config.sleep_chunk());
        let buffer = DurableBuffer::new(store, config.buffer.max_buffer_size);

        let mut supervisor = Self {
            session,
            sampler,
            delivery,
            scheduler,
            buffer,
            sensor,
            clock,
            state: SupervisorState::Booting,
            cycles: 0,
        };

        let pending = supervisor.buffer.len();
        if pending > 0 {
            info!("Found {} buffered readings from a previous run", pending);
        }

        supervisor.warm_up().await;
        supervisor
    }

    async fn warm_up(&mut self) {
        self.state = SupervisorState::Warmup;
        let warmup = self.session.config.warmup();
        info!("Warming up sensor for {} s", warmup.as_secs());

        wait_fed(
            &mut self.clock,
            &mut self.session.watchdog,
            warmup,
            FED_WAIT_STEP,
        )
        .await;
        info!("Sensor warmup complete");
    }

    /// Sample, deliver, then sleep out the rest of the read interval.
    ///
    /// A fault is handled before it is returned; the caller only needs to
    /// start the next cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, Fault> {
        self.cycles += 1;
        let started = self.clock.now();
        self.session.watchdog.feed();

        self.state = SupervisorState::Sampling;
        debug!("Cycle {}: sampling", self.cycles);

        let watchdog = &mut self.session.watchdog;
        let sampled = self
            .sampler
            .sample(&mut self.sensor, &mut self.clock, || watchdog.feed())
            .await;
        let reading = match sampled {
            Ok(reading) => reading,
            Err(fault) => {
                let fault = Fault::from(fault);
                self.recover(&fault).await;
                return Err(fault);
            }
        };
        info!(
            "Reading -> Voltage: {:.3} V | H2S: {:.2} ppm",
            reading.voltage, reading.concentration
        );

        self.state = SupervisorState::Delivering;
        let delivery = self
            .delivery
            .deliver(
                &mut self.session.relay,
                &mut self.buffer,
                &mut self.clock,
                &mut self.session.watchdog,
                reading,
            )
            .await;
        let pending = self.buffer.len();

        self.state = SupervisorState::Sleeping;
        let active = elapsed_since(&self.clock, started);
        let slept = self
            .scheduler
            .cycle_sleep(
                self.session.config.read_interval(),
                active,
                &mut self.session.watchdog,
            )
            .await;

        Ok(CycleReport {
            reading,
            delivery,
            pending,
            slept,
        })
    }

    /// Handle a fault that ended the cycle early. Faults met while
    /// delivering are settled by [`DeliveryEngine`] and never reach here.
    async fn recover(&mut self, fault: &Fault) {
        match fault.recovery() {
            Recovery::RetryCycle => {
                let pause = self.session.config.fault_pause();
                error!(
                    "Cycle {} failed: {}. Retrying in {} s",
                    self.cycles,
                    fault,
                    pause.as_secs()
                );
                wait_fed(
                    &mut self.clock,
                    &mut self.session.watchdog,
                    pause,
                    FED_WAIT_STEP,
                )
                .await;
            }
            recovery => warn!("Cycle {} fault: {} ({:?})", self.cycles, fault, recovery),
        }
    }

    /// Run cycles until the device resets.
    pub async fn run(&mut self) -> ! {
        info!("Starting main loop");
        loop {
            if let Err(fault) = self.run_cycle().await {
                debug!("Cycle {} ended early: {}", self.cycles, fault);
            }
        }
    }

    /// Run exactly `cycles` cycles.
    pub async fn run_cycles(&mut self, cycles: u32) -> RunSummary {
        let mut summary = RunSummary::default();
        for _ in 0..cycles {
            let outcome = self.run_cycle().await;
            summary.record(&outcome);
        }
        summary
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn session(&self) -> &DeviceSession<T, W> {
        &self.session
    }

    pub fn buffer_mut(&mut self) -> &mut DurableBuffer<S> {
        &mut self.buffer
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn power(&self) -> &P {
        self.scheduler.power()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorFault;
    use crate::relay::{RelayConnection, TransportError};
    use crate::sensors::SensorError;
    use crate::storage::{LineStore, MemoryLineStore};
    use crate::testing::{
        CountingWatchdog, ManualClock, RecordingPower, ScriptedAdc, ScriptedRelay, reading_at,
    };
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use embassy_futures::block_on;

    type TestNode = Supervisor<
        ScriptedAdc,
        ManualClock,
        RecordingPower,
        MemoryLineStore,
        ScriptedRelay,
        CountingWatchdog,
    >;

    fn boot(sensor: ScriptedAdc, store: MemoryLineStore, transport: ScriptedRelay) -> TestNode {
        let clock = ManualClock::at(1000);
        let parts = NodeParts {
            sensor,
            power: RecordingPower::with_clock(&clock),
            watchdog: CountingWatchdog::with_clock(&clock),
            clock,
            store,
            transport,
        };
        block_on(Supervisor::boot(NodeConfig::default(), parts))
    }

    fn relay(node: &TestNode) -> &ScriptedRelay {
        match node.session().relay() {
            RelayConnection::Available(transport) => transport,
            RelayConnection::Unavailable(_) => panic!("relay unavailable"),
        }
    }

    fn assert_watchdog_never_starved(node: &TestNode) {
        let watchdog = node.session().watchdog();
        let timeout = watchdog.timeout.unwrap();
        assert!(!watchdog.fed_at.is_empty());
        let gap = watchdog.longest_gap(node.clock().now());
        assert!(gap < timeout, "unfed for {gap:?} (timeout {timeout:?})");
    }

    #[test]
    fn test_offline_boot_buffers_reading() {
        let mut node = boot(
            ScriptedAdc::steady(2.0),
            MemoryLineStore::new(),
            ScriptedRelay::unreachable(),
        );

        assert!(!node.session().is_online());
        assert!(node.session().init_fault().is_some());
        assert_eq!(node.state(), SupervisorState::Warmup);
        // Two retry backoffs, then warmup.
        assert_eq!(node.clock().elapsed(), Duration::from_secs(34));

        let report = block_on(node.run_cycle()).unwrap();

        assert_eq!(report.delivery, DeliveryResult::Buffered);
        assert_eq!(report.pending, 1);
        assert_eq!(report.reading.timestamp, 1054);
        assert_eq!(report.slept, Duration::from_secs(280));
        assert_eq!(node.state(), SupervisorState::Sleeping);

        let entries = node.buffer_mut().entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].buffered);
        assert!((entries[0].reading.voltage - 2.0).abs() < 1e-3);
        assert!((entries[0].reading.concentration - 60.61).abs() < 0.011);
    }

    #[test]
    fn test_reconnect_flushes_pending_readings() {
        let mut store = MemoryLineStore::new();
        for ts in [100, 400, 700] {
            store.append_line(&reading_at(ts).to_string()).unwrap();
        }
        let mut node = boot(ScriptedAdc::steady(1.5), store, ScriptedRelay::online());

        let report = block_on(node.run_cycle()).unwrap();

        assert_eq!(report.delivery, DeliveryResult::Sent);
        assert_eq!(report.pending, 0);
        assert!(node.buffer_mut().is_empty());

        let relay = relay(&node);
        assert_eq!(
            relay.request_names(),
            ["hub.set", "note.template", "card.power", "note.add", "note.add", "note.add", "note.add"]
        );
        let fresh = &relay.delivered[0];
        assert_eq!(fresh.buffered, None);
        let backlog: Vec<_> = relay.delivered[1..]
            .iter()
            .map(|body| (body.buffered, body.original_time))
            .collect();
        assert_eq!(
            backlog,
            [(Some(true), Some(100)), (Some(true), Some(400)), (Some(true), Some(700))]
        );
    }

    #[test]
    fn test_sensor_fault_pauses_and_skips_sleep() {
        let err = SensorError::NotReady { sensor: "test" };
        let mut node = boot(
            ScriptedAdc::cycle(&[Err(err)]),
            MemoryLineStore::new(),
            ScriptedRelay::online(),
        );
        let booted = node.clock().elapsed();

        let result = block_on(node.run_cycle());

        assert_eq!(
            result,
            Err(Fault::Sensor(SensorFault::NoValidReadings { failed: 40 }))
        );
        assert_eq!(node.clock().elapsed() - booted, Duration::from_secs(25));
        assert!(node.power().suspends.is_empty());
        assert_eq!(relay(&node).delivered.len(), 0);
    }

    #[test]
    fn test_run_cycles_keeps_period() {
        let mut node = boot(
            ScriptedAdc::steady(1.0),
            MemoryLineStore::new(),
            ScriptedRelay::online(),
        );
        let booted = node.clock().elapsed();

        let summary = block_on(node.run_cycles(3));

        assert_eq!(
            summary,
            RunSummary {
                cycles: 3,
                sent: 3,
                ..RunSummary::default()
            }
        );
        assert_eq!(node.cycles(), 3);
        assert_eq!(node.clock().elapsed() - booted, Duration::from_secs(900));
        assert!(node.power().suspends.iter().all(|c| *c <= Duration::from_secs(5)));
    }

    #[test]
    fn test_relay_outage_mid_run_buffers_then_recovers() {
        let mut transport = ScriptedRelay::online();
        transport.script_notes(&[Err(TransportError::NotResponding), Err(TransportError::NotResponding)]);
        let mut node = boot(ScriptedAdc::steady(1.0), MemoryLineStore::new(), transport);

        let summary = block_on(node.run_cycles(3));

        assert_eq!(summary.buffered, 2);
        assert_eq!(summary.sent, 1);
        assert!(node.buffer_mut().is_empty());
        let relay = relay(&node);
        assert_eq!(relay.delivered.len(), 3);
        assert_eq!(relay.delivered[1].buffered, Some(true));
    }

    #[test]
    fn test_watchdog_fed_through_offline_run() {
        let mut node = boot(
            ScriptedAdc::steady(1.0),
            MemoryLineStore::new(),
            ScriptedRelay::unreachable(),
        );
        assert_watchdog_never_starved(&node);

        let summary = block_on(node.run_cycles(3));

        assert_eq!(summary.buffered, 3);
        assert_watchdog_never_starved(&node);
    }

    #[test]
    fn test_watchdog_fed_through_full_backlog_flush() {
        let mut store = MemoryLineStore::new();
        for ts in 0..100 {
            store.append_line(&reading_at(ts).to_string()).unwrap();
        }
        let mut node = boot(ScriptedAdc::steady(1.0), store, ScriptedRelay::online());

        let summary = block_on(node.run_cycles(3));

        assert_eq!(summary.sent, 3);
        assert_eq!(relay(&node).delivered.len(), 103);
        assert!(node.buffer_mut().is_empty());
        assert_watchdog_never_starved(&node);
    }
}
