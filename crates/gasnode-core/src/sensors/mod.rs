//! Analog gas sensor port, voltage-to-concentration calibration and the
//! windowed sampler.

mod sampler;

pub use sampler::{Sampler, SamplerConfig};

use core::future::Future;

use thiserror_no_std::Error;

use crate::reading::round_to;

/// ADC reference voltage of the analog front end (V)
pub const DEFAULT_VREF: f32 = 3.3;

/// Concentration reported at full-scale voltage (ppm)
pub const DEFAULT_FULL_SCALE_PPM: f32 = 100.0;

/// Errors raised by a single analog read.
///
/// These never abort a sample window on their own; the sampler logs them and
/// keeps going.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: read failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: conversion not ready")]
    NotReady { sensor: &'static str },
    #[error("{sensor}: raw value {raw} above full scale {full_scale}")]
    OutOfRange {
        sensor: &'static str,
        raw: u16,
        full_scale: u16,
    },
}

/// Port for the analog sensor input (one ADC channel).
pub trait AnalogInput {
    /// Take one raw conversion in `0..=full_scale()`
    fn read_raw(&mut self) -> impl Future<Output = Result<u16, SensorError>>;

    /// Raw value corresponding to the reference voltage
    fn full_scale(&self) -> u16 {
        u16::MAX
    }
}

/// Linear mapping from sensor voltage to gas concentration.
///
/// `0 V` maps to `0 ppm` and `vref` maps to `full_scale` ppm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    pub vref: f32,
    pub full_scale: f32,
}

impl Default for LinearCalibration {
    fn default() -> Self {
        Self {
            vref: DEFAULT_VREF,
            full_scale: DEFAULT_FULL_SCALE_PPM,
        }
    }
}

impl LinearCalibration {
    pub const fn new(vref: f32, full_scale: f32) -> Self {
        Self { vref, full_scale }
    }

    /// Convert a raw ADC count to volts
    pub fn raw_to_volts(&self, raw: u16, full_scale_raw: u16) -> f32 {
        if full_scale_raw == 0 {
            return 0.0;
        }
        (raw as f32 / full_scale_raw as f32) * self.vref
    }

    /// Convert a voltage to ppm, rounded to 2 decimals
    pub fn to_concentration(&self, voltage: f32) -> f32 {
        round_to((voltage / self.vref) * self.full_scale, 2)
    }
}

/// Convert a sensor voltage to H₂S ppm with the default 3.3 V / 100 ppm mapping.
pub fn convert_voltage_to_ppm(voltage: f32) -> f32 {
    LinearCalibration::default().to_concentration(voltage)
}
