//! Implements the staging buffer between the block encoder and the host.
use std::convert::TryFrom;

use tracing::debug;

use crate::{EncoderError, TtaIo};

/// Byte queue fed by the encoder's IO callback and drained by the host.
///
/// Bytes in `[read_pos, write_pos)` are valid, unread output. `write_pos` only moves
/// through [`TtaIo::write`], `read_pos` only through [`StagingBuffer::drain`] and
/// [`TtaIo::seek`]. Once everything was read both cursors return to zero. The buffer
/// is never compacted otherwise.
///
/// A buffer created with [`with_capacity`](Self::with_capacity) never grows: a write that
/// does not fit is rejected with [`EncoderError::BufferTooSmall`]. A buffer created with
/// [`growable`](Self::growable) grows to take the write instead, and only reports
/// `BufferTooSmall` if the allocation fails.
#[derive(Debug)]
pub struct StagingBuffer {
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    growable: bool,
}

impl StagingBuffer {
    /// Allocates a staging buffer with the given capacity.
    ///
    /// Returns `None` if the allocation fails.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(capacity).ok()?;
        buffer.resize(capacity, 0);

        Some(Self {
            buffer,
            read_pos: 0,
            write_pos: 0,
            growable: false,
        })
    }

    /// Allocates a staging buffer with the given initial capacity that grows on demand.
    ///
    /// Returns `None` if the allocation fails.
    pub fn growable(capacity: usize) -> Option<Self> {
        let mut staging = Self::with_capacity(capacity)?;
        staging.growable = true;
        Some(staging)
    }

    /// Returns `true` if writes beyond the capacity grow the buffer.
    pub fn is_growable(&self) -> bool {
        self.growable
    }

    /// Grows the backing storage so that `additional` more bytes fit behind `write_pos`.
    fn grow(&mut self, additional: usize) -> bool {
        let required = match self.write_pos.checked_add(additional) {
            Some(required) => required,
            None => return false,
        };
        let capacity = required.max(self.buffer.len().saturating_mul(2));
        if self
            .buffer
            .try_reserve_exact(capacity - self.buffer.len())
            .is_err()
        {
            return false;
        }
        self.buffer.resize(capacity, 0);
        debug!("grew staging buffer to {} bytes", capacity);
        true
    }

    /// Total size of the backing storage.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Returns `true` if there is nothing left to read.
    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Bytes that can still be written before the buffer must be drained.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.write_pos
    }

    /// The unread region.
    pub fn unread(&self) -> &[u8] {
        &self.buffer[self.read_pos..self.write_pos]
    }

    /// Drops all unread bytes and returns both cursors to zero.
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Copies as many unread bytes as fit into `dest` and returns how many were copied.
    pub fn drain(&mut self, dest: &mut [u8]) -> usize {
        let len = dest.len().min(self.len());
        dest[..len].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        if self.read_pos == self.write_pos {
            self.reset();
        }
        len
    }
}

impl TtaIo for StagingBuffer {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, EncoderError> {
        let available = self.remaining();
        if bytes.len() > available && !(self.growable && self.grow(bytes.len())) {
            return Err(EncoderError::BufferTooSmall {
                requested: bytes.len(),
                available,
            });
        }
        self.buffer[self.write_pos..self.write_pos + bytes.len()].copy_from_slice(bytes);
        self.write_pos += bytes.len();
        Ok(bytes.len())
    }

    /// Rewinds the read cursor inside the written region.
    fn seek(&mut self, offset: u64) -> Result<u64, EncoderError> {
        match usize::try_from(offset) {
            Ok(pos) if pos < self.write_pos => {
                self.read_pos = pos;
                Ok(offset)
            }
            _ => Err(EncoderError::SeekOutOfRange { offset }),
        }
    }
}
