use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, error, info, warn};

use super::LineStore;
use crate::error::PersistenceFault;
use crate::reading::{BufferEntry, Reading};

/// Bounded, persistent FIFO of readings waiting for the relay.
///
/// Holds at most `capacity` entries. Appending to a full buffer evicts the
/// oldest entry. Draining hands out entries oldest first and only empties
/// the store once the caller commits the batch.
///
/// The buffer is only ever touched from the control loop, so there is no
/// locking; crash safety comes from the [`LineStore`] contract.
pub struct DurableBuffer<S: LineStore> {
    store: S,
    capacity: usize,
    /// Line count of the store, loaded lazily after boot
    len: Option<usize>,
}

impl<S: LineStore> DurableBuffer<S> {
    /// Wrap a store. A capacity of 0 is treated as 1.
    pub fn new(store: S, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            len: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Number of lines currently stored
    pub fn len(&mut self) -> usize {
        match self.len {
            Some(len) => len,
            None => self.read_or_truncate().len(),
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Append a reading at the tail, evicting the oldest entry when full.
    ///
    /// On error the reading is not stored. There is nowhere else to put it,
    /// so callers log the fault and move on.
    pub fn append(&mut self, reading: &Reading) -> Result<(), PersistenceFault> {
        let line = reading.to_string();
        let count = self.len();

        if count < self.capacity {
            self.store.append_line(&line)?;
            self.len = Some(count + 1);
            debug!("Buffered reading ({} pending)", count + 1);
            return Ok(());
        }

        let mut lines = self.read_or_truncate();
        lines.push(line);
        let evicted = trim_front(&mut lines, self.capacity);
        self.store.rewrite(&lines)?;
        self.len = Some(lines.len());

        warn!(
            "Buffer full ({} entries), evicted {} oldest",
            self.capacity, evicted
        );
        Ok(())
    }

    /// Put entries that could not be delivered back into the buffer, in order.
    pub fn rebuffer(&mut self, entries: &[BufferEntry]) -> Result<(), PersistenceFault> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut lines = self.read_or_truncate();
        lines.extend(entries.iter().map(|entry| entry.reading.to_string()));
        let evicted = trim_front(&mut lines, self.capacity);
        if evicted > 0 {
            warn!("Re-buffering overflowed capacity, evicted {} oldest", evicted);
        }

        self.store.rewrite(&lines)?;
        self.len = Some(lines.len());
        info!("Re-buffered {} readings", entries.len());
        Ok(())
    }

    /// Stored entries oldest first, without removing them.
    ///
    /// Only the newest `capacity` lines are considered and unreadable lines
    /// are skipped, exactly as [`drain`](Self::drain) would.
    pub fn entries(&mut self) -> Vec<BufferEntry> {
        let lines = self.read_or_truncate();
        self.window(lines)
    }

    /// Take every pending entry, oldest first.
    ///
    /// The store is left untouched until [`DrainBatch::commit`] is called.
    /// Lines older than the newest `capacity` are dropped from the batch and
    /// disappear on commit.
    pub fn drain(&mut self) -> DrainBatch<'_, S> {
        let lines = self.read_or_truncate();
        let entries = self.window(lines);
        DrainBatch {
            buffer: self,
            entries,
        }
    }

    fn window(&self, lines: Vec<String>) -> Vec<BufferEntry> {
        let skip = lines.len().saturating_sub(self.capacity);
        if skip > 0 {
            warn!(
                "Buffer holds {} lines, discarding {} oldest beyond capacity",
                lines.len(),
                skip
            );
        }

        let mut entries = Vec::with_capacity(lines.len() - skip);
        for (index, line) in lines.iter().enumerate().skip(skip) {
            match line.parse::<Reading>() {
                Ok(reading) => entries.push(BufferEntry::stored(reading)),
                Err(e) => warn!("Skipping unreadable buffer line {}: {}", index + 1, e),
            }
        }
        entries
    }

    /// Read the whole store. A store that cannot be read is truncated and
    /// treated as empty, trading whatever it held for a working buffer.
    fn read_or_truncate(&mut self) -> Vec<String> {
        match self.store.read_lines() {
            Ok(lines) => {
                self.len = Some(lines.len());
                lines
            }
            Err(e) => {
                error!("Failed to load buffer, truncating: {}", e);
                match self.store.clear() {
                    Ok(()) => self.len = Some(0),
                    Err(e) => {
                        error!("Failed to truncate buffer: {}", e);
                        self.len = None;
                    }
                }
                Vec::new()
            }
        }
    }
}

/// Drop lines from the front until at most `capacity` remain.
fn trim_front(lines: &mut Vec<String>, capacity: usize) -> usize {
    let excess = lines.len().saturating_sub(capacity);
    lines.drain(..excess);
    excess
}

/// Entries taken from a [`DurableBuffer`] that are not yet removed from it.
///
/// Dropping the batch without committing leaves the store as it was.
pub struct DrainBatch<'a, S: LineStore> {
    buffer: &'a mut DurableBuffer<S>,
    entries: Vec<BufferEntry>,
}

impl<S: LineStore> DrainBatch<'_, S> {
    pub fn entries(&self) -> &[BufferEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear the store and take ownership of the entries.
    ///
    /// From here on the entries exist only in the caller's hands; anything
    /// the caller fails to deliver has to go back through
    /// [`DurableBuffer::rebuffer`].
    pub fn commit(self) -> Result<Vec<BufferEntry>, PersistenceFault> {
        self.buffer.store.clear()?;
        self.buffer.len = Some(0);
        Ok(self.entries)
    }
}
