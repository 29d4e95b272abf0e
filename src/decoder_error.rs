//! Decoder errors.
use std::io;

use thiserror::Error;

/// Errors thrown by the decoder.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// The underlying reader failed.
    #[error("io error")]
    Io(#[source] io::Error),
    /// The stream does not start with a TTA1 signature.
    #[error("invalid signature")]
    InvalidSignature,
    /// The stream uses a format the decoder does not support.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(&'static str),
    /// A checksum did not match.
    #[error("crc mismatch in {0}")]
    CrcMismatch(&'static str),
    /// The stream ended early.
    #[error("unexpected end of stream")]
    UnexpectedEof,
}

impl From<io::Error> for DecoderError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecoderError::UnexpectedEof
        } else {
            DecoderError::Io(err)
        }
    }
}
