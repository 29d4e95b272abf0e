//! Entry points of the host encoder plugin interface.
//!
//! A safe rendition of the functions a host resolves from an encoder plugin. Format
//! tags are FOURCC codes, sessions are owned [`TtaAudioCoder`] values and the host's
//! narrow and wide path strings are normalized before they reach the splice.
use std::io;
use std::path::PathBuf;

use tracing::warn;

use crate::{TtaAudioCoder, TtaError};

/// A FOURCC format tag, stored the way `mmioFOURCC` packs it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FourCc(u32);

impl FourCc {
    /// TTA compressed audio.
    pub const TTA: FourCc = FourCc::new(*b"TTA ");
    /// Uncompressed PCM.
    pub const PCM: FourCc = FourCc::new(*b"PCM ");

    /// Packs four characters, the first one in the lowest byte.
    pub const fn new(code: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(code))
    }

    /// The packed value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for FourCc {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Returns the format tag and description of the output format at `index`.
///
/// Only index 0 exists.
pub fn get_audio_types(index: u32) -> Option<(FourCc, String)> {
    if index == 0 {
        Some((FourCc::TTA, format!("TTA v{}", env!("CARGO_PKG_VERSION"))))
    } else {
        None
    }
}

/// Creates an encoder session for PCM input and TTA output.
///
/// `output` is set to [`FourCc::TTA`] once the formats were accepted. Returns `None`
/// if the formats don't match or the session can't be constructed.
pub fn create_audio(
    channels: u32,
    sample_rate: u32,
    bits_per_sample: u32,
    source: FourCc,
    output: &mut FourCc,
) -> Option<TtaAudioCoder> {
    if source != FourCc::PCM || *output != FourCc::TTA {
        warn!(
            "rejected session for formats {:#010x} -> {:#010x}",
            source.as_u32(),
            output.as_u32()
        );
        return None;
    }
    *output = FourCc::TTA;

    match TtaAudioCoder::new(channels, sample_rate, bits_per_sample) {
        Ok(coder) => Some(coder),
        Err(err) => {
            warn!("can't create encoder session: {}", err);
            None
        }
    }
}

/// Announces the end of the input.
pub fn prepare_to_finish(coder: &mut TtaAudioCoder) {
    coder.prepare_to_finish();
}

/// A destination path as handed over by the host.
#[derive(Clone, Copy, Debug)]
pub enum HostPath<'a> {
    /// 8 bit characters, read as UTF-8.
    Narrow(&'a [u8]),
    /// 16 bit characters, read as UTF-16.
    Wide(&'a [u16]),
}

/// Converts a host path into a [`PathBuf`]. The path ends at the first NUL character.
pub fn normalize_path(path: HostPath<'_>) -> Result<PathBuf, TtaError> {
    let path = match path {
        HostPath::Narrow(chars) => {
            let len = chars.iter().position(|c| *c == 0).unwrap_or(chars.len());
            std::str::from_utf8(&chars[..len])
                .map(str::to_owned)
                .map_err(|_| invalid_path())?
        }
        HostPath::Wide(chars) => {
            let len = chars.iter().position(|c| *c == 0).unwrap_or(chars.len());
            String::from_utf16(&chars[..len]).map_err(|_| invalid_path())?
        }
    };

    Ok(PathBuf::from(path))
}

fn invalid_path() -> TtaError {
    TtaError::Write {
        context: "decode destination path",
        source: io::Error::new(io::ErrorKind::InvalidData, "path is not valid unicode"),
    }
}

/// Finishes the session by splicing header and seek table into the file at `path`.
pub fn finish_audio(coder: &mut TtaAudioCoder, path: HostPath<'_>) -> Result<(), TtaError> {
    let path = normalize_path(path)?;
    coder.finish_audio(&path)
}

/// The encoder has no configuration dialog. Always returns `false`.
pub fn config_audio(_output: FourCc) -> bool {
    false
}

/// Returns 1 for the TTA format and 0 otherwise. No item is filled in.
pub fn get_config_item(output: FourCc, _item: &str, _data: &mut String) -> i32 {
    if output == FourCc::TTA {
        1
    } else {
        0
    }
}

/// No configuration item can be set. Always returns 0.
pub fn set_config_item(_output: FourCc, _item: &str, _data: &str) -> i32 {
    0
}
