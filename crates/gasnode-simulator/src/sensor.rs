//! Synthetic electrochemical H2S sensor behind a 16-bit ADC.

use gasnode_core::sensors::DEFAULT_VREF;
use gasnode_core::{AnalogInput, SensorError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SENSOR: &str = "sim-adc";

/// Produces a slowly wandering voltage with read noise.
///
/// The baseline does a bounded random walk between readings, so consecutive
/// samples look like a real gas level drifting rather than white noise.
pub struct SimulatedSensor {
    rng: ChaCha8Rng,
    /// Current sensor output (V)
    level: f32,
    /// Peak-to-peak noise of a single read (V)
    noise: f32,
    /// Largest change of `level` per read (V)
    drift: f32,
    failure_rate: f64,
}

impl SimulatedSensor {
    pub fn new(seed: u64, failure_rate: f64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            level: 0.35,
            noise: 0.02,
            drift: 0.002,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    fn next_volts(&mut self) -> f32 {
        let step = self.rng.random_range(-self.drift..=self.drift);
        self.level = (self.level + step).clamp(0.0, DEFAULT_VREF);

        let half = self.noise / 2.0;
        let read = self.level + self.rng.random_range(-half..=half);
        read.clamp(0.0, DEFAULT_VREF)
    }
}

impl AnalogInput for SimulatedSensor {
    async fn read_raw(&mut self) -> Result<u16, SensorError> {
        if self.rng.random_bool(self.failure_rate) {
            return Err(SensorError::ReadFailed {
                sensor: SENSOR,
                details: "injected read failure",
            });
        }

        let volts = self.next_volts();
        let raw = (volts / DEFAULT_VREF * self.full_scale() as f32).round();
        Ok(raw as u16)
    }
}
