//! Fault taxonomy and the recovery policy applied to each fault kind.
//!
//! Port errors ([`SensorError`](crate::sensors::SensorError),
//! [`TransportError`](crate::relay::TransportError),
//! [`StorageError`](crate::storage::StorageError)) describe what a single
//! primitive did. Faults describe what that means for the duty cycle, and
//! [`Fault::recovery`] decides what happens next. The supervisor applies it
//! to sensor faults; the delivery engine applies it to init, transport and
//! persistence faults for the reading in hand.
//! Nothing in this table stops the node; the only way out of the main loop
//! is a watchdog reset.

use thiserror_no_std::Error;

use crate::relay::TransportError;
use crate::storage::StorageError;

/// No usable sensor data came out of a sample window.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    #[error("no valid ADC readings obtained ({failed} failed reads)")]
    NoValidReadings { failed: u32 },
}

/// A relay transaction failed after the node was up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("relay transaction failed: {0}")]
pub struct TransportFault(#[from] pub TransportError);

/// The buffer store could not be read or written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("buffer persistence failed: {0}")]
pub struct PersistenceFault(#[from] pub StorageError);

/// The relay could not be brought up while booting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("relay initialization failed after {attempts} attempts: {last}")]
pub struct InitFault {
    pub attempts: u8,
    pub last: TransportError,
}

/// Every fault the duty cycle knows how to recover from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error(transparent)]
    Sensor(#[from] SensorFault),
    #[error(transparent)]
    Transport(#[from] TransportFault),
    #[error(transparent)]
    Persistence(#[from] PersistenceFault),
    #[error(transparent)]
    Init(#[from] InitFault),
}

/// What the node does after a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Abandon this cycle, pause briefly, then start the next one
    RetryCycle,
    /// Keep the reading in the durable buffer and carry on
    BufferAndContinue,
    /// Log it, lose the reading, carry on
    DropAndContinue,
    /// Keep running without the relay
    DegradeAndContinue,
}

impl Fault {
    pub const fn recovery(&self) -> Recovery {
        match self {
            Self::Sensor(_) => Recovery::RetryCycle,
            Self::Transport(_) => Recovery::BufferAndContinue,
            Self::Persistence(_) => Recovery::DropAndContinue,
            Self::Init(_) => Recovery::DegradeAndContinue,
        }
    }
}

/// Fixed-capacity copy of an error detail, cut at a char boundary if needed.
pub(crate) fn detail<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
