//! Reading value objects and their on-disk line format.
//!
//! A [`Reading`] is what the sampler produces once per cycle. It is stored in
//! the durable buffer as one text line:
//!
//! ```text
//! <timestamp>,<voltage>,<concentration>\n
//! ```
//!
//! The `buffered` marker and the original timestamp only exist on the wire
//! (see [`crate::relay::NoteBody`]), never in storage.

use core::fmt::{self, Display};
use core::str::FromStr;

use thiserror_no_std::Error;

/// One sampled-and-converted sensor value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Seconds on the platform clock when the sample window closed
    pub timestamp: u64,
    /// Mean sensor voltage over the sample window (V)
    pub voltage: f32,
    /// Gas concentration derived from `voltage` (ppm, 2 decimals)
    pub concentration: f32,
}

impl Reading {
    pub const fn new(timestamp: u64, voltage: f32, concentration: f32) -> Self {
        Self {
            timestamp,
            voltage,
            concentration,
        }
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.timestamp, self.voltage, self.concentration)
    }
}

/// Error returned when a stored line is not a valid reading.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseReadingError {
    #[error("expected 3 comma-separated fields, found {found}")]
    FieldCount { found: usize },
    #[error("invalid timestamp field")]
    Timestamp,
    #[error("invalid voltage field")]
    Voltage,
    #[error("invalid concentration field")]
    Concentration,
}

impl FromStr for Reading {
    type Err = ParseReadingError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let mut fields = line.split(',');

        let (Some(ts), Some(voltage), Some(concentration), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseReadingError::FieldCount {
                found: line.split(',').count(),
            });
        };

        // Older buffers were written with fractional wall-clock seconds.
        let timestamp = match ts.parse::<u64>() {
            Ok(ts) => ts,
            Err(_) => {
                let ts = ts
                    .parse::<f64>()
                    .map_err(|_| ParseReadingError::Timestamp)?;
                if !ts.is_finite() || ts < 0.0 {
                    return Err(ParseReadingError::Timestamp);
                }
                ts as u64
            }
        };
        let voltage = parse_finite(voltage).ok_or(ParseReadingError::Voltage)?;
        let concentration =
            parse_finite(concentration).ok_or(ParseReadingError::Concentration)?;

        Ok(Self::new(timestamp, voltage, concentration))
    }
}

fn parse_finite(field: &str) -> Option<f32> {
    field.parse::<f32>().ok().filter(|v| v.is_finite())
}

/// A [`Reading`] as handled by the delivery path.
///
/// `buffered` is `false` for fresh samples and for entries read back from
/// storage. It flips to `true` only when an entry is re-sent from the buffer,
/// at which point its original timestamp travels with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferEntry {
    pub reading: Reading,
    pub buffered: bool,
}

impl BufferEntry {
    /// An entry as it sits in storage.
    pub const fn stored(reading: Reading) -> Self {
        Self {
            reading,
            buffered: false,
        }
    }

    /// Mark this entry as being re-sent from the buffer.
    pub const fn retransmit(self) -> Self {
        Self {
            reading: self.reading,
            buffered: true,
        }
    }
}

impl From<Reading> for BufferEntry {
    fn from(reading: Reading) -> Self {
        Self::stored(reading)
    }
}

/// Round `value` to `decimals` places, half away from zero.
///
/// `core` has no float rounding, so this goes through an integer cast.
pub fn round_to(value: f32, decimals: u32) -> f32 {
    if !value.is_finite() {
        return value;
    }

    let mut scale = 1.0_f64;
    for _ in 0..decimals {
        scale *= 10.0;
    }

    let scaled = value as f64 * scale;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5) as i64
    } else {
        (scaled - 0.5) as i64
    };

    (rounded as f64 / scale) as f32
}
