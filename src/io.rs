//! IO callbacks of the block encoder.
use std::io::{Seek, SeekFrom, Write};

use crate::EncoderError;

/// Sink the block encoder pushes its output into.
///
/// The encoder calls back into this interface synchronously from within
/// `process_stream`, `flush_fifo`, `preliminary_finish` and `finalize`.
pub trait TtaIo {
    /// Appends `bytes` and returns the number of bytes accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, EncoderError>;

    /// Moves to the absolute position `offset` and returns the new position.
    fn seek(&mut self, offset: u64) -> Result<u64, EncoderError>;
}

impl<T: TtaIo + ?Sized> TtaIo for &mut T {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, EncoderError> {
        (**self).write(bytes)
    }

    fn seek(&mut self, offset: u64) -> Result<u64, EncoderError> {
        (**self).seek(offset)
    }
}

/// Adapts any seekable writer, like a file, to [`TtaIo`].
#[derive(Debug)]
pub struct StreamIo<T> {
    inner: T,
}

impl<T: Write + Seek> StreamIo<T> {
    /// Wraps the given writer.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Returns a reference to the wrapped writer.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Returns a mutable reference to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwraps the writer.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write + Seek> TtaIo for StreamIo<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, EncoderError> {
        self.inner.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn seek(&mut self, offset: u64) -> Result<u64, EncoderError> {
        Ok(self.inner.seek(SeekFrom::Start(offset))?)
    }
}
