//! Errors of an encoder session.
use std::io;

use thiserror::Error;

use crate::EncoderError;

/// Errors reported by an encoder session.
///
/// The first five variants mirror the error kinds a host expects from a TTA encoder:
/// unsupported formats, allocation failures and the read, write and file handle failures
/// of the final splice.
#[derive(Debug, Error)]
pub enum TtaError {
    /// Unsupported channel count, bit depth or sample rate.
    #[error("unsupported format: {0}")]
    Format(&'static str),
    /// Allocation of a session buffer failed.
    #[error("memory error: {0}")]
    Memory(&'static str),
    /// Reading the already written payload failed.
    #[error("read error while trying to {context}")]
    Read {
        /// The step that failed.
        context: &'static str,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the temporary or destination file failed.
    #[error("write error while trying to {context}")]
    Write {
        /// The step that failed.
        context: &'static str,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Syncing or closing a file handle failed.
    #[error("file error while trying to {context}")]
    File {
        /// The step that failed.
        context: &'static str,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Positioning inside a file failed.
    #[error("seek error while trying to {context}")]
    Seek {
        /// The step that failed.
        context: &'static str,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The session was driven out of order.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// The block codec failed.
    #[error("encoder error")]
    Encoder(#[source] EncoderError),
}

impl TtaError {
    /// Returns a mapper that wraps an IO error into [`TtaError::Read`].
    pub fn read(context: &'static str) -> impl FnOnce(io::Error) -> TtaError {
        move |source| TtaError::Read { context, source }
    }

    /// Returns a mapper that wraps an IO error into [`TtaError::Write`].
    pub fn write(context: &'static str) -> impl FnOnce(io::Error) -> TtaError {
        move |source| TtaError::Write { context, source }
    }

    /// Returns a mapper that wraps an IO error into [`TtaError::File`].
    pub fn file(context: &'static str) -> impl FnOnce(io::Error) -> TtaError {
        move |source| TtaError::File { context, source }
    }

    /// Returns a mapper that wraps an IO error into [`TtaError::Seek`].
    pub fn seek(context: &'static str) -> impl FnOnce(io::Error) -> TtaError {
        move |source| TtaError::Seek { context, source }
    }
}

impl From<EncoderError> for TtaError {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::UnsupportedFormat(message) => TtaError::Format(message),
            err => TtaError::Encoder(err),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use std::error::Error;

    use super::*;

    #[test]
    fn test_format_errors_keep_their_kind() {
        let err: TtaError = EncoderError::UnsupportedFormat("bad channels").into();
        assert!(matches!(err, TtaError::Format("bad channels")));
    }

    #[test]
    fn test_codec_errors_are_wrapped() {
        let err: TtaError = EncoderError::BufferTooSmall {
            requested: 10,
            available: 2,
        }
        .into();
        assert!(matches!(err, TtaError::Encoder(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_io_mappers() {
        let err = TtaError::read("copy payload")(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "read error while trying to copy payload");
        assert!(err.source().is_some());

        let err = TtaError::file("close temporary file")(io::Error::new(
            io::ErrorKind::Other,
            "boom",
        ));
        assert!(matches!(err, TtaError::File { .. }));
    }
}
