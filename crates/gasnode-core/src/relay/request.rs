//! Request and response documents exchanged with the relay.
//!
//! The relay speaks JSON objects with a `"req"` discriminator, one object per
//! transaction. Only the requests the node actually issues are modelled.

use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::TransportError;
use crate::error::detail;
use crate::reading::{BufferEntry, round_to};

/// Template hint telling the relay a field is a 4-byte float
const TEMPLATE_FLOAT: f32 = 14.1;

/// One transaction sent to the relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "req")]
pub enum RelayRequest {
    /// Attach to the cloud project and set the sync cadence
    #[serde(rename = "hub.set")]
    HubSet {
        product: String,
        mode: SyncMode,
        /// Minutes between outbound syncs
        outbound: u32,
        /// Minutes between inbound syncs
        inbound: u32,
        align: bool,
    },
    /// Register the body layout of a note file so notes are stored compactly
    #[serde(rename = "note.template")]
    NoteTemplate { file: String, body: NoteBody },
    /// Enable periodic battery reporting
    #[serde(rename = "card.power")]
    CardPower { minutes: u32, reset: bool },
    /// Queue one note for upload
    #[serde(rename = "note.add")]
    NoteAdd { file: String, body: NoteBody },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Periodic,
    Continuous,
    Minimum,
}

/// Body of an `h2s` note.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteBody {
    /// Sensor voltage, 3 decimals
    pub voltage: f32,
    /// Concentration, 2 decimals
    #[serde(rename = "h2s_ppm")]
    pub concentration: f32,
    /// Set only on readings re-sent from the buffer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffered: Option<bool>,
    /// Sample timestamp of a re-sent reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_time: Option<u64>,
}

impl NoteBody {
    /// Body used to register the note template
    pub const fn template() -> Self {
        Self {
            voltage: TEMPLATE_FLOAT,
            concentration: TEMPLATE_FLOAT,
            buffered: None,
            original_time: None,
        }
    }
}

impl From<&BufferEntry> for NoteBody {
    fn from(entry: &BufferEntry) -> Self {
        let reading = &entry.reading;
        Self {
            voltage: round_to(reading.voltage, 3),
            concentration: reading.concentration,
            buffered: entry.buffered.then_some(true),
            original_time: entry.buffered.then_some(reading.timestamp),
        }
    }
}

impl RelayRequest {
    pub fn note_add(file: &str, entry: &BufferEntry) -> Self {
        Self::NoteAdd {
            file: String::from(file),
            body: NoteBody::from(entry),
        }
    }

    /// Name of the request as the relay knows it
    pub const fn name(&self) -> &'static str {
        match self {
            Self::HubSet { .. } => "hub.set",
            Self::NoteTemplate { .. } => "note.template",
            Self::CardPower { .. } => "card.power",
            Self::NoteAdd { .. } => "note.add",
        }
    }

    /// Serialize to the newline-terminated JSON line the relay expects
    pub fn to_json_line(&self) -> Result<Vec<u8>, TransportError> {
        let mut line = serde_json::to_vec(self)
            .map_err(|_| TransportError::Encode(self.name()))?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Reply to a transaction. A present `err` means the relay rejected it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl RelayResponse {
    pub const fn ok() -> Self {
        Self { err: None }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            err: Some(String::from(reason)),
        }
    }

    /// Parse a reply line. Fields other than `err` are ignored.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|_| TransportError::MalformedResponse)
    }

    pub fn into_result(self) -> Result<(), TransportError> {
        match self.err {
            None => Ok(()),
            Some(reason) => Err(TransportError::Rejected(detail(&reason))),
        }
    }
}
