//! Hardware-independent core of the gas sensor node
//!
//! This crate holds the node's duty cycle and everything it needs that does
//! not touch hardware: sampling and calibration, the durable reading buffer,
//! relay requests and delivery, the retry and fault policies, and the
//! low-power scheduler. Hardware is reached through small port traits
//! ([`AnalogInput`], [`RelayTransport`], [`LineStore`], [`Watchdog`],
//! [`LowPower`], [`Clock`]) implemented by each platform crate.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod error;
pub mod power;
pub mod reading;
pub mod relay;
pub mod retry;
pub mod sensors;
pub mod storage;
pub mod supervisor;
pub mod watchdog;

#[cfg(test)]
mod testing;

pub use clock::Clock;
pub use config::{ConfigError, NodeConfig};
pub use error::{Fault, Recovery};
pub use power::{LowPower, PowerError, PowerScheduler};
pub use reading::{BufferEntry, Reading};
pub use relay::{RelayConnection, RelayTransport, TransportError};
pub use sensors::{AnalogInput, SensorError};
pub use storage::{DurableBuffer, LineStore, StorageError};
pub use supervisor::{CycleReport, NodeParts, RunSummary, Supervisor, SupervisorState};
pub use watchdog::Watchdog;
