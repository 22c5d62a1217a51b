use alloc::string::String;

use embassy_time::Duration;
use log::{debug, error, info, warn};

use super::{RelayConnection, RelayRequest, RelayTransport};
use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::error::{Fault, Recovery, TransportFault};
use crate::reading::{BufferEntry, Reading};
use crate::retry::RetryPolicy;
use crate::storage::{DurableBuffer, LineStore};
use crate::watchdog::Watchdog;

/// Where a fresh reading ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Accepted by the relay
    Sent,
    /// Kept in the durable buffer for a later cycle
    Buffered,
    /// Neither sent nor stored
    Dropped,
}

/// Outcome of re-sending the buffer backlog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    /// Entries that went back into the buffer after a failed send
    pub rebuffered: usize,
}

/// Sends readings to the relay and falls back to the durable buffer.
///
/// A reading is always in exactly one place: handed to the relay, in the
/// buffer, or (after a storage failure) logged and dropped.
#[derive(Debug, Clone)]
pub struct DeliveryEngine {
    note_file: String,
    flush_policy: RetryPolicy,
    flush_pause: Duration,
}

impl DeliveryEngine {
    pub fn new(note_file: &str, flush_policy: RetryPolicy, flush_pause: Duration) -> Self {
        Self {
            note_file: String::from(note_file),
            flush_policy,
            flush_pause,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(
            &config.relay.note_file,
            config.flush_retry_policy(),
            config.flush_pause(),
        )
    }

    /// Send one fresh reading.
    ///
    /// Once the relay has accepted it, the backlog is flushed as well. If the
    /// relay is unavailable or refuses the reading, the fault's
    /// [`Recovery`] decides its fate: normally it goes into the buffer and the
    /// result is [`DeliveryResult::Buffered`]. A reading the buffer cannot
    /// store either is logged and reported as [`DeliveryResult::Dropped`], so
    /// callers must handle three outcomes, not two.
    pub async fn deliver<T, S, C, W>(
        &self,
        relay: &mut RelayConnection<T>,
        buffer: &mut DurableBuffer<S>,
        clock: &mut C,
        watchdog: &mut W,
        reading: Reading,
    ) -> DeliveryResult
    where
        T: RelayTransport,
        S: LineStore,
        C: Clock,
        W: Watchdog,
    {
        let transport = match relay {
            RelayConnection::Available(transport) => transport,
            RelayConnection::Unavailable(fault) => {
                info!("Relay not available, saving to buffer");
                let fault = Fault::from(fault.clone());
                return settle(buffer, &reading, fault.recovery());
            }
        };

        watchdog.feed();
        let request = RelayRequest::note_add(&self.note_file, &BufferEntry::stored(reading));
        if let Err(e) = transport.request(&request).await {
            let fault = Fault::from(TransportFault(e));
            warn!("Failed to send reading: {}", fault);
            return settle(buffer, &reading, fault.recovery());
        }

        info!(
            "Sent -> Voltage: {:.3} V | H2S: {:.2} ppm",
            reading.voltage, reading.concentration
        );

        let report = self.flush_backlog(transport, buffer, clock, watchdog).await;
        if report.sent > 0 || report.rebuffered > 0 {
            info!(
                "Backlog flush: {} sent, {} re-buffered",
                report.sent, report.rebuffered
            );
        }
        DeliveryResult::Sent
    }

    /// Re-send every buffered reading, oldest first.
    ///
    /// The buffer is cleared before the first send, so an entry is never both
    /// in flight and stored. The first entry that fails (after the flush
    /// retry policy) stops the flush; it and everything after it go back
    /// into the buffer in their original order.
    pub async fn flush_backlog<T, S, C, W>(
        &self,
        transport: &mut T,
        buffer: &mut DurableBuffer<S>,
        clock: &mut C,
        watchdog: &mut W,
    ) -> FlushReport
    where
        T: RelayTransport,
        S: LineStore,
        C: Clock,
        W: Watchdog,
    {
        let mut report = FlushReport::default();
        if buffer.is_empty() {
            return report;
        }

        let entries = match buffer.drain().commit() {
            Ok(entries) => entries,
            Err(fault) => {
                error!("Failed to clear buffer, keeping backlog for later: {}", fault);
                return report;
            }
        };
        if entries.is_empty() {
            return report;
        }
        info!("Sending {} buffered readings", entries.len());

        for (index, entry) in entries.iter().enumerate() {
            if index > 0 {
                clock.delay(self.flush_pause).await;
            }

            let request = RelayRequest::note_add(&self.note_file, &entry.retransmit());
            let sent = self
                .flush_policy
                .run(clock, watchdog, async |_| transport.request(&request).await)
                .await;

            if let Err(exhausted) = sent {
                warn!(
                    "Failed to send buffered reading from {}: {}",
                    entry.reading.timestamp, exhausted.last
                );
                let remainder = &entries[index..];
                match buffer.rebuffer(remainder) {
                    Ok(()) => report.rebuffered = remainder.len(),
                    Err(fault) => error!(
                        "Lost {} buffered readings while re-buffering: {}",
                        remainder.len(),
                        fault
                    ),
                }
                break;
            }

            debug!("Sent buffered reading from {}", entry.reading.timestamp);
            report.sent += 1;
        }

        report
    }
}

/// Apply `recovery` to a reading the relay did not take.
fn settle<S: LineStore>(
    buffer: &mut DurableBuffer<S>,
    reading: &Reading,
    recovery: Recovery,
) -> DeliveryResult {
    match recovery {
        Recovery::DropAndContinue => {
            warn!("Reading from {} dropped", reading.timestamp);
            DeliveryResult::Dropped
        }
        Recovery::BufferAndContinue | Recovery::DegradeAndContinue | Recovery::RetryCycle => {
            match buffer.append(reading) {
                Ok(()) => DeliveryResult::Buffered,
                Err(e) => {
                    let fault = Fault::from(e);
                    error!("Failed to save to buffer: {}", fault);
                    // Persistence faults never map back to buffering.
                    settle(buffer, reading, fault.recovery())
                }
            }
        }
    }
}
