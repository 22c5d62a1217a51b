//! Static node configuration.
//!
//! Everything here is fixed at boot. Defaults reproduce the deployed
//! firmware: a 20 s sample window every 5 minutes, relay syncs every 6 hours
//! outbound and daily inbound, an 8 s watchdog.

use alloc::string::String;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::retry::RetryPolicy;
use crate::sensors::{DEFAULT_FULL_SCALE_PPM, DEFAULT_VREF, LinearCalibration, SamplerConfig};

/// Default cloud project the relay attaches to
pub const DEFAULT_PRODUCT_UID: &str = "com.outlook.jcforsythe1:h2s";

/// Default note file readings are queued in
pub const DEFAULT_NOTE_FILE: &str = "h2s.qo";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub relay: RelayConfig,
    pub sampling: SamplingConfig,
    pub buffer: BufferConfig,
    pub schedule: ScheduleConfig,
}

/// Relay destination, sync cadence and boot-time retry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub product_uid: String,
    pub note_file: String,
    pub outbound_minutes: u32,
    pub inbound_minutes: u32,
    /// Period of the relay's own battery reports
    pub power_report_minutes: u32,
    /// Attempts at opening the relay while booting
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            product_uid: String::from(DEFAULT_PRODUCT_UID),
            note_file: String::from(DEFAULT_NOTE_FILE),
            outbound_minutes: 360,
            inbound_minutes: 1440,
            power_report_minutes: 60,
            max_retries: 3,
            retry_backoff_ms: 2000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub sample_duration_secs: u64,
    pub sample_interval_ms: u64,
    pub warmup_secs: u64,
    /// ADC reference voltage (V)
    pub vref: f32,
    /// Concentration at `vref` (ppm)
    pub full_scale_ppm: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_duration_secs: 20,
            sample_interval_ms: 500,
            warmup_secs: 30,
            vref: DEFAULT_VREF,
            full_scale_ppm: DEFAULT_FULL_SCALE_PPM,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    pub max_buffer_size: usize,
    /// Attempts per buffered reading when flushing
    pub flush_attempts: u8,
    /// Pause between two buffered sends
    pub flush_pause_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 100,
            flush_attempts: 1,
            flush_pause_ms: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Period of one full cycle
    pub read_interval_secs: u64,
    pub watchdog_timeout_ms: u64,
    /// Longest single low-power suspend before the watchdog is fed
    pub sleep_chunk_ms: u64,
    /// Pause after a failed cycle
    pub fault_pause_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            read_interval_secs: 300,
            watchdog_timeout_ms: 8000,
            sleep_chunk_ms: 5000,
            fault_pause_ms: 5000,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("product UID must not be empty")]
    MissingProductUid,
    #[error("note file must not be empty")]
    MissingNoteFile,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{step} ({step_ms} ms) must be shorter than the watchdog timeout ({timeout_ms} ms)")]
    StarvesWatchdog {
        step: &'static str,
        step_ms: u64,
        timeout_ms: u64,
    },
    #[error("calibration vref and full scale must be positive")]
    Calibration,
}

impl NodeConfig {
    /// Check that the configuration can run without starving the watchdog.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.product_uid.trim().is_empty() {
            return Err(ConfigError::MissingProductUid);
        }
        if self.relay.note_file.trim().is_empty() {
            return Err(ConfigError::MissingNoteFile);
        }

        let non_zero = [
            ("sample duration", self.sampling.sample_duration_secs),
            ("sample interval", self.sampling.sample_interval_ms),
            ("read interval", self.schedule.read_interval_secs),
            ("watchdog timeout", self.schedule.watchdog_timeout_ms),
            ("sleep chunk", self.schedule.sleep_chunk_ms),
            ("max retries", self.relay.max_retries as u64),
            ("max buffer size", self.buffer.max_buffer_size as u64),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        if !(self.sampling.vref > 0.0 && self.sampling.full_scale_ppm > 0.0) {
            return Err(ConfigError::Calibration);
        }

        let timeout_ms = self.schedule.watchdog_timeout_ms;
        let fed_steps = [
            ("sample interval", self.sampling.sample_interval_ms),
            ("retry backoff", self.relay.retry_backoff_ms),
            ("flush pause", self.buffer.flush_pause_ms),
            ("sleep chunk", self.schedule.sleep_chunk_ms),
        ];
        for (step, step_ms) in fed_steps {
            if step_ms >= timeout_ms {
                return Err(ConfigError::StarvesWatchdog {
                    step,
                    step_ms,
                    timeout_ms,
                });
            }
        }

        Ok(())
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            duration: Duration::from_secs(self.sampling.sample_duration_secs),
            interval: Duration::from_millis(self.sampling.sample_interval_ms),
            calibration: LinearCalibration::new(
                self.sampling.vref,
                self.sampling.full_scale_ppm,
            ),
        }
    }

    /// Retry policy for opening the relay at boot
    pub fn init_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.relay.max_retries,
            Duration::from_millis(self.relay.retry_backoff_ms),
        )
    }

    /// Retry policy for each buffered reading during a flush
    pub fn flush_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.buffer.flush_attempts,
            Duration::from_millis(self.relay.retry_backoff_ms),
        )
    }

    pub fn flush_pause(&self) -> Duration {
        Duration::from_millis(self.buffer.flush_pause_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.sampling.warmup_secs)
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.read_interval_secs)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.schedule.watchdog_timeout_ms)
    }

    pub fn sleep_chunk(&self) -> Duration {
        Duration::from_millis(self.schedule.sleep_chunk_ms)
    }

    pub fn fault_pause(&self) -> Duration {
        Duration::from_millis(self.schedule.fault_pause_ms)
    }
}
