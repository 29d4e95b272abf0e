//! Splices the final header and seek table in front of an already written payload.
use std::convert::TryFrom;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{EncoderConfiguration, ReplaceMode, StagingBuffer, TtaEncoder, TtaError, TtaInfo};

/// Prefix of the temporary file created next to the destination.
const TEMP_PREFIX: &str = "enc";

/// Replaces the provisional header at `path` with the final header and seek table.
///
/// The file at `path` holds the provisional header followed by the frames. The result is
/// written to a temporary file in the same directory which then replaces the destination.
/// The temporary file is removed on every error path.
pub(crate) fn finish(
    encoder: &mut TtaEncoder<StagingBuffer>,
    info: &TtaInfo,
    configuration: &EncoderConfiguration,
    path: &Path,
) -> Result<(), TtaError> {
    let dir = resolve_dir(path, configuration.max_path_len)?;

    encoder.init_set_info_for_memory(info)?;
    encoder.flush_fifo()?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(TtaError::write("create temporary file"))?;
    temp.write_all(encoder.io().unread())
        .map_err(TtaError::write("write header"))?;
    debug!(
        "wrote {} header bytes to {}",
        encoder.io().len(),
        temp.path().display()
    );

    let table_size = usize::try_from(info.seek_table_size())
        .map_err(|_| TtaError::Memory("seek table is too large"))?;
    if encoder.io().capacity() < table_size {
        *encoder.io_mut() = StagingBuffer::growable(table_size)
            .ok_or(TtaError::Memory("can't allocate the seek table buffer"))?;
    } else {
        encoder.io_mut().reset();
    }
    encoder.finalize()?;

    let header_offset = encoder.header_offset();
    temp.seek(SeekFrom::Start(header_offset))
        .map_err(TtaError::seek("position seek table"))?;
    temp.write_all(encoder.io().unread())
        .map_err(TtaError::write("write seek table"))?;
    debug!("wrote seek table of {} frames", encoder.seek_table().len());
    encoder.io_mut().reset();

    let copied = copy_payload(path, header_offset, temp.as_file_mut(), configuration)?;
    debug!("copied {} payload bytes", copied);

    temp.as_file()
        .sync_all()
        .map_err(TtaError::file("sync temporary file"))?;

    replace(temp, path, configuration.replace_mode)?;
    debug!("replaced {}", path.display());

    Ok(())
}

/// Checks the path length and returns the directory the temporary file is created in.
fn resolve_dir(path: &Path, max_path_len: usize) -> Result<&Path, TtaError> {
    if path.as_os_str().len() > max_path_len {
        return Err(TtaError::Write {
            context: "resolve destination",
            source: io::Error::new(io::ErrorKind::InvalidInput, "path is too long"),
        });
    }

    match path.parent() {
        Some(dir) if path.file_name().is_some() => {
            if dir.as_os_str().is_empty() {
                Ok(Path::new("."))
            } else {
                Ok(dir)
            }
        }
        _ => Err(TtaError::Write {
            context: "resolve destination",
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no directory"),
        }),
    }
}

/// Copies everything behind `offset` in `path` to the end of `dest`.
fn copy_payload(
    path: &Path,
    offset: u64,
    dest: &mut File,
    configuration: &EncoderConfiguration,
) -> Result<u64, TtaError> {
    let mut source = File::open(path).map_err(TtaError::read("open payload"))?;
    source
        .seek(SeekFrom::Start(offset))
        .map_err(TtaError::seek("skip provisional header"))?;
    dest.seek(SeekFrom::End(0))
        .map_err(TtaError::seek("position payload"))?;

    let mut chunk = vec![0_u8; configuration.copy_chunk_size];
    let mut copied = 0_u64;
    loop {
        let len = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(TtaError::read("read payload")(err)),
        };
        dest.write_all(&chunk[..len])
            .map_err(TtaError::write("write payload"))?;
        copied += len as u64;
    }

    Ok(copied)
}

fn replace(mut temp: NamedTempFile, path: &Path, mode: ReplaceMode) -> Result<(), TtaError> {
    match mode {
        ReplaceMode::AtomicRename => {
            temp.persist(path).map_err(|err| TtaError::Write {
                context: "rename temporary file",
                source: err.error,
            })?;
        }
        ReplaceMode::Copy => {
            temp.seek(SeekFrom::Start(0))
                .map_err(TtaError::seek("rewind temporary file"))?;
            let mut dest = File::create(path).map_err(TtaError::write("open destination"))?;
            io::copy(temp.as_file_mut(), &mut dest)
                .map_err(TtaError::write("copy to destination"))?;
            dest.sync_all()
                .map_err(TtaError::file("sync destination"))?;
            temp.close()
                .map_err(TtaError::file("delete temporary file"))?;
        }
    }
    Ok(())
}
