use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::{LineStore, StorageError};

/// RAM-backed [`LineStore`] for tests.
///
/// It can be told to fail writes or to come back corrupt, which is how the
/// buffer's failure paths get exercised.
#[derive(Debug, Default)]
pub struct MemoryLineStore {
    lines: Vec<String>,
    fail_writes: bool,
    corrupt: bool,
}

impl MemoryLineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Make every subsequent write fail until switched off
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make reads fail until the store is rewritten
    pub fn corrupt(&mut self) {
        self.corrupt = true;
    }

    fn check_write(&self) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::io("write rejected"));
        }
        Ok(())
    }
}

impl LineStore for MemoryLineStore {
    fn append_line(&mut self, line: &str) -> Result<(), StorageError> {
        self.check_write()?;
        self.lines.push(line.to_string());
        Ok(())
    }

    fn read_lines(&mut self) -> Result<Vec<String>, StorageError> {
        if self.corrupt {
            return Err(StorageError::Corrupt);
        }
        Ok(self.lines.clone())
    }

    fn rewrite(&mut self, lines: &[String]) -> Result<(), StorageError> {
        self.check_write()?;
        self.lines = lines.to_vec();
        self.corrupt = false;
        Ok(())
    }
}
