#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! Streaming encoder for the TTA (True Audio) lossless audio format.
//!
//! TTA is a simple lossless codec: every channel of a frame runs through a fixed first-order
//! predictor and an adaptive hybrid filter, the residuals are Rice coded and each frame
//! is protected by a CRC32. A file is a 22 byte header, a seek table with the size of
//! every frame and the frames themselves.
//!
//! The crate is built around a host driven encoder session ([`TtaAudioCoder`]):
//!
//! * The host pushes PCM in arbitrarily sized chunks and pulls compressed bytes back
//!   through a caller provided output slot.
//! * The block codec ([`TtaEncoder`]) consumes fixed size blocks and pushes its output
//!   through an IO callback ([`TtaIo`]) into a bounded [`StagingBuffer`].
//! * Since the seek table is only known once the last sample was seen, finishing a session
//!   splices the final header and seek table in front of the payload that was already
//!   written to disk.
//!
//! ```no_run
//! use enc_tta::{TtaAudioCoder, TtaError};
//!
//! fn encode(pcm: &[u8], path: &std::path::Path) -> Result<(), TtaError> {
//!     let mut coder = TtaAudioCoder::new(2, 44100, 16)?;
//!     let mut file = Vec::new();
//!     let mut out = vec![0_u8; 4096];
//!
//!     let mut input = pcm;
//!     coder.prepare_to_finish();
//!     loop {
//!         let result = coder.encode(input, &mut out)?;
//!         input = &input[result.consumed..];
//!         file.extend_from_slice(&out[..result.written]);
//!         if result.written == 0 && input.is_empty() {
//!             break;
//!         }
//!     }
//!     std::fs::write(path, &file).map_err(TtaError::write("store payload"))?;
//!     coder.finish_audio(path)
//! }
//! ```
//!
use num_traits::ToPrimitive;

pub use coder::*;
#[cfg(feature = "decoder")]
pub use decoder::*;
pub use decoder_error::*;
pub use encoder::*;
pub use encoder_error::*;
pub use error::*;
pub use io::*;
pub use staging::*;

mod coder;
#[cfg(feature = "decoder")]
mod decoder;
mod decoder_error;
mod encoder;
mod encoder_error;
mod error;
pub(crate) mod filter;
#[cfg(feature = "host")]
pub mod host;
mod io;
pub(crate) mod math;
pub(crate) mod rice_coder;
mod splice;
mod staging;

// Affects the following targets: avr and msp430
#[cfg(any(target_pointer_width = "8", target_pointer_width = "16"))]
compile_error!("usize needs to be at least 32 bit wide");

/// Maximum number of channels a TTA stream can carry.
pub const MAX_NCH: u32 = 6;

/// Maximum bits per sample.
pub const MAX_BPS: u32 = 24;

/// Sample count written into a provisional header, before the real count is known.
pub const MAX_SAMPLES: u32 = u32::MAX;

/// Size of the TTA1 header in bytes.
pub const TTA_HEADER_SIZE: u64 = 22;

/// Format tag of an unencrypted TTA1 stream.
pub const TTA_FORMAT_SIMPLE: u16 = 1;

pub(crate) const TTA_SIGNATURE: [u8; 4] = *b"TTA1";

/// Size of the encoder output FIFO. Output reaches the IO callback in chunks of this size.
pub(crate) const FIFO_BUFFER_SIZE: usize = 5120;

/// Stream parameters of a TTA stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TtaInfo {
    /// Number of interleaved channels.
    pub channels: u32,
    /// Significant bits per sample.
    pub bits_per_sample: u32,
    /// Samples per second.
    pub sample_rate: u32,
    /// Samples per channel in the whole stream.
    pub samples: u32,
}

impl TtaInfo {
    /// Creates stream parameters with a provisional sample count of [`MAX_SAMPLES`].
    pub fn new(channels: u32, bits_per_sample: u32, sample_rate: u32) -> Self {
        Self {
            channels,
            bits_per_sample,
            sample_rate,
            samples: MAX_SAMPLES,
        }
    }

    /// Returns a copy with the given sample count.
    pub fn with_samples(self, samples: u32) -> Self {
        Self { samples, ..self }
    }

    /// Bytes used to store a single sample of one channel.
    pub fn depth(&self) -> usize {
        ((self.bits_per_sample + 7) / 8) as usize
    }

    /// Bytes of one sample period across all channels.
    pub fn sample_frame_size(&self) -> usize {
        self.channels as usize * self.depth()
    }

    /// Samples per channel in a full TTA frame.
    pub fn frame_length(&self) -> u32 {
        (u64::from(self.sample_rate) * 256 / 245)
            .to_u32()
            .unwrap_or(u32::MAX)
    }

    /// Number of frames needed to store `samples` samples.
    pub fn frame_count(&self) -> u32 {
        let frame_length = self.frame_length();
        if frame_length == 0 {
            return 0;
        }
        math::div_ceil(self.samples, frame_length)
    }

    /// Size of the seek table including its CRC.
    pub fn seek_table_size(&self) -> u64 {
        (u64::from(self.frame_count()) + 1) * 4
    }

    /// Checks that the parameters describe a stream the codec supports.
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.channels == 0 || self.channels > MAX_NCH {
            return Err(EncoderError::UnsupportedFormat(
                "channel count must be between 1 and 6",
            ));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample > MAX_BPS {
            return Err(EncoderError::UnsupportedFormat(
                "bits per sample must be between 1 and 24",
            ));
        }
        if self.sample_rate == 0 {
            return Err(EncoderError::UnsupportedFormat(
                "sample rate must not be zero",
            ));
        }
        Ok(())
    }
}
