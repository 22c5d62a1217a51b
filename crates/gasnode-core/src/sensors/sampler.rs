use embassy_time::Duration;
use log::{debug, warn};

use super::{AnalogInput, LinearCalibration};
use crate::clock::{Clock, elapsed_since};
use crate::error::SensorFault;
use crate::reading::Reading;

/// Sampling window configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// How long one averaged sample runs
    pub duration: Duration,
    /// Spacing between individual ADC reads
    pub interval: Duration,
    pub calibration: LinearCalibration,
}

/// Produces one averaged [`Reading`] per call.
///
/// Holds no state between calls; everything it needs comes in through the
/// config and the borrowed ports.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    pub const fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Read the sensor every `interval` until `duration` has elapsed and
    /// average the successful reads.
    ///
    /// Failed reads are logged and skipped. `feed` is called on every pass
    /// through the loop because the window is longer than the watchdog
    /// timeout.
    pub async fn sample<A, C, F>(
        &self,
        sensor: &mut A,
        clock: &mut C,
        mut feed: F,
    ) -> Result<Reading, SensorFault>
    where
        A: AnalogInput,
        C: Clock,
        F: FnMut(),
    {
        let full_scale = sensor.full_scale();
        let started = clock.now();

        let mut sum = 0.0_f64;
        let mut good: u32 = 0;
        let mut failed: u32 = 0;

        while elapsed_since(clock, started) < self.config.duration {
            feed();

            match sensor.read_raw().await {
                Ok(raw) => {
                    let volts = self.config.calibration.raw_to_volts(raw, full_scale);
                    sum += volts as f64;
                    good += 1;
                }
                Err(e) => {
                    warn!("ADC read error: {}", e);
                    failed += 1;
                }
            }

            clock.delay(self.config.interval).await;
        }

        if good == 0 {
            return Err(SensorFault::NoValidReadings { failed });
        }

        let voltage = (sum / good as f64) as f32;
        let concentration = self.config.calibration.to_concentration(voltage);
        debug!(
            "Sample window closed: {} good / {} failed reads, {:.3} V",
            good, failed, voltage
        );

        Ok(Reading::new(clock.timestamp(), voltage, concentration))
    }
}
