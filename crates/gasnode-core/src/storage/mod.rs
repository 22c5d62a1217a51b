//! Durable storage for readings that have not reached the relay yet.
//!
//! The buffer lives in a line-oriented store (a text file on flash or SD in
//! practice). Appends are the hot path; full rewrites only happen when the
//! buffer is at capacity or when it is drained.

mod buffer;
#[cfg(test)]
mod memory;

pub use buffer::{DrainBatch, DurableBuffer};
#[cfg(test)]
pub(crate) use memory::MemoryLineStore;

use alloc::string::String;
use alloc::vec::Vec;

use thiserror_no_std::Error;

use crate::error::detail;

/// Default name of the buffer file
pub const BUFFER_FILE: &str = "sensor_buffer.txt";

/// Error type for line store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backing medium failed the read or write
    #[error("storage I/O error: {0}")]
    Io(heapless::String<64>),
    /// Stored bytes are not valid text
    #[error("stored data is corrupt")]
    Corrupt,
    /// Medium is out of space
    #[error("storage full")]
    Full,
}

impl StorageError {
    /// I/O failure with a detail message, truncated to fit
    pub fn io(details: &str) -> Self {
        Self::Io(detail(details))
    }
}

/// Port for a persistent, append-only line store.
///
/// Implementations must survive power cycles and must not leave the store
/// half-rewritten: `rewrite` and `clear` either fully apply or leave the
/// previous content in place. An interrupted `append_line` may leave a torn
/// last line, which readers skip.
///
/// These operations are blocking, like the SD card calls they sit on top of.
pub trait LineStore {
    /// Append one line (without the trailing newline)
    fn append_line(&mut self, line: &str) -> Result<(), StorageError>;

    /// Read every stored line in write order
    ///
    /// A store that was never written reads as empty.
    fn read_lines(&mut self) -> Result<Vec<String>, StorageError>;

    /// Atomically replace the whole store with `lines`
    fn rewrite(&mut self, lines: &[String]) -> Result<(), StorageError>;

    /// Remove every line
    fn clear(&mut self) -> Result<(), StorageError> {
        self.rewrite(&[])
    }
}
