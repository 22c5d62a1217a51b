//! Simulated relay that appends every accepted request to a JSONL outbox.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use gasnode_core::relay::{RelayRequest, RelayResponse};
use gasnode_core::{RelayTransport, TransportError};
use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::RelayMode;

pub struct SimRelay {
    mode: RelayMode,
    outbox: PathBuf,
    rng: ChaCha8Rng,
    failure_rate: f64,
    accepted: u32,
}

impl SimRelay {
    pub fn new(mode: RelayMode, outbox: impl Into<PathBuf>, seed: u64, failure_rate: f64) -> Self {
        Self {
            mode,
            outbox: outbox.into(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            accepted: 0,
        }
    }

    /// Requests written to the outbox so far
    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    fn write_outbox(&self, line: &[u8]) -> Result<(), TransportError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbox)
            .map_err(|e| TransportError::bus(&e.to_string()))?;
        file.write_all(line)
            .map_err(|e| TransportError::bus(&e.to_string()))
    }

    /// Reply the way the real relay would, as raw JSON
    fn reply(&self, request: &RelayRequest) -> Vec<u8> {
        let reply = match request {
            RelayRequest::NoteAdd { .. } => serde_json::json!({ "total": self.accepted }),
            _ => serde_json::json!({}),
        };
        reply.to_string().into_bytes()
    }
}

impl RelayTransport for SimRelay {
    async fn open(&mut self) -> Result<(), TransportError> {
        match self.mode {
            RelayMode::Offline => Err(TransportError::NotResponding),
            RelayMode::Online | RelayMode::Flaky => Ok(()),
        }
    }

    async fn transact(&mut self, request: &RelayRequest) -> Result<RelayResponse, TransportError> {
        if self.mode == RelayMode::Offline {
            return Err(TransportError::NotResponding);
        }
        if self.mode == RelayMode::Flaky && self.rng.random_bool(self.failure_rate) {
            warn!("Simulated relay dropped {}", request.name());
            return Err(TransportError::NotResponding);
        }

        let line = request.to_json_line()?;
        self.write_outbox(&line)?;
        self.accepted += 1;
        debug!("Relay <- {}", String::from_utf8_lossy(line.trim_ascii_end()));

        RelayResponse::from_json(&self.reply(request))
    }
}
