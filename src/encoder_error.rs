//! Encoder errors.
use std::io;

use thiserror::Error;

/// Errors thrown by the block encoder and its IO callbacks.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The stream parameters are not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(&'static str),
    /// The staging buffer cannot take the requested write.
    #[error("staging buffer is too small: {requested} bytes requested, {available} available")]
    BufferTooSmall {
        /// Bytes the codec tried to write.
        requested: usize,
        /// Bytes left in the buffer.
        available: usize,
    },
    /// The requested position lies outside of the written region.
    #[error("seek to offset {offset} is outside of the written region")]
    SeekOutOfRange {
        /// Requested offset.
        offset: u64,
    },
    /// The IO callback accepted fewer bytes than requested.
    #[error("short write: {written} of {requested} bytes")]
    ShortWrite {
        /// Bytes the codec tried to write.
        requested: usize,
        /// Bytes the callback accepted.
        written: usize,
    },
    /// The underlying stream failed.
    #[error("io error")]
    Io(#[from] io::Error),
    /// An internal encoder error.
    #[error("{0}")]
    InternalError(&'static str),
}
