//! Implements the streaming encode adapter between a host and the block encoder.
use std::path::Path;

use num_traits::ToPrimitive;
use tracing::{debug, trace, warn};

use crate::{splice, StagingBuffer, TtaEncoder, TtaError, TtaInfo, FIFO_BUFFER_SIZE};

/// How `finish_audio` replaces the destination file with the spliced stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplaceMode {
    /// Renames the temporary file over the destination.
    AtomicRename,
    /// Copies the temporary file over the destination and deletes it afterwards.
    Copy,
}

/// Configures an encoder session on creation.
#[derive(Clone, Debug)]
pub struct EncoderConfiguration {
    /// Sample frames handed to the block encoder per feed. Default: 5210.
    pub block_frames: usize,
    /// Size of the chunks the payload is copied in when finishing. Default: 64 KiB.
    pub copy_chunk_size: usize,
    /// Longest accepted destination path, in bytes. Default: 260.
    pub max_path_len: usize,
    /// How the destination is replaced. Default: `AtomicRename`.
    pub replace_mode: ReplaceMode,
}

impl Default for EncoderConfiguration {
    fn default() -> Self {
        Self {
            block_frames: 5210,
            copy_chunk_size: 64 * 1024,
            max_path_len: 260,
            replace_mode: ReplaceMode::AtomicRename,
        }
    }
}

/// Progress of a session towards its last block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LastBlockState {
    /// More input is expected.
    Streaming,
    /// The host announced the end of the input. The rest of the input is encoded and
    /// the last frame is closed by the next `encode` call.
    LastBlockPending,
    /// The last frame is closed. Only the remaining output can be drained.
    LastBlockFlushed,
}

/// Result of a single [`TtaAudioCoder::encode`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EncodeResult {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Compressed bytes written into the output slot.
    pub written: usize,
}

/// A TTA encoder session.
///
/// The host pushes PCM in arbitrarily sized chunks through [`encode`](Self::encode) and
/// gets compressed bytes back in the output slot it provides. The bytes returned by all
/// `encode` calls form a TTA stream with a provisional header and without a seek table.
/// After the host stored them, [`finish_audio`](Self::finish_audio) splices the final
/// header and the seek table in front of the stored payload.
pub struct TtaAudioCoder {
    encoder: TtaEncoder<StagingBuffer>,
    info: TtaInfo,
    configuration: EncoderConfiguration,
    block_size: usize,
    consumed_bytes: u64,
    state: LastBlockState,
    finished: bool,
}

impl TtaAudioCoder {
    /// Creates a new session with the default configuration.
    pub fn new(channels: u32, sample_rate: u32, bits_per_sample: u32) -> Result<Self, TtaError> {
        Self::with_configuration(
            channels,
            sample_rate,
            bits_per_sample,
            &EncoderConfiguration::default(),
        )
    }

    /// Creates a new session with the given configuration.
    pub fn with_configuration(
        channels: u32,
        sample_rate: u32,
        bits_per_sample: u32,
        configuration: &EncoderConfiguration,
    ) -> Result<Self, TtaError> {
        let info = TtaInfo::new(channels, bits_per_sample, sample_rate);
        info.validate()?;

        if configuration.block_frames == 0 || configuration.copy_chunk_size == 0 {
            return Err(TtaError::Memory("block and copy chunk sizes must not be zero"));
        }

        let block_size = configuration
            .block_frames
            .checked_mul(info.sample_frame_size())
            .ok_or(TtaError::Memory("encode block is too large"))?;
        let capacity = block_size
            .checked_mul(2)
            .and_then(|size| size.checked_add(FIFO_BUFFER_SIZE))
            .ok_or(TtaError::Memory("staging buffer is too large"))?;
        let staging = StagingBuffer::growable(capacity)
            .ok_or(TtaError::Memory("can't allocate the staging buffer"))?;

        let mut encoder = TtaEncoder::new(staging);
        encoder.init_set_info_for_memory(&info)?;

        debug!(
            "created encoder session: {} channels, {} bits, {} Hz, {} byte blocks",
            channels, bits_per_sample, sample_rate, block_size
        );

        Ok(Self {
            encoder,
            info,
            configuration: configuration.clone(),
            block_size,
            consumed_bytes: 0,
            state: LastBlockState::Streaming,
            finished: false,
        })
    }

    /// Stream parameters of the session. The sample count is provisional.
    pub fn info(&self) -> &TtaInfo {
        &self.info
    }

    /// The configuration the session was created with.
    pub fn configuration(&self) -> &EncoderConfiguration {
        &self.configuration
    }

    /// Bytes of one sample period across all channels.
    pub fn sample_frame_size(&self) -> usize {
        self.info.sample_frame_size()
    }

    /// Input bytes handed to the block encoder per feed.
    pub fn encode_block_size(&self) -> usize {
        self.block_size
    }

    /// Samples per channel consumed so far.
    pub fn total_samples_encoded(&self) -> u64 {
        self.consumed_bytes / self.info.sample_frame_size() as u64
    }

    /// Progress towards the last block.
    pub fn state(&self) -> LastBlockState {
        self.state
    }

    /// Compressed bytes waiting for the next `encode` call.
    pub fn pending_output(&self) -> usize {
        self.encoder.io().len()
    }

    /// Announces the end of the input.
    ///
    /// The last frame is closed by the next `encode` call once all of its input was
    /// consumed. Calling it again has no further effect.
    pub fn prepare_to_finish(&mut self) {
        if self.state == LastBlockState::Streaming {
            self.state = LastBlockState::LastBlockPending;
        }
    }

    /// Consumes PCM from `input` and writes compressed bytes into `output`.
    ///
    /// Buffered output is always drained before more input is encoded, so the output
    /// of consecutive calls concatenates to the same stream regardless of how the
    /// input was split. The call returns once the output slot is full, or once the input
    /// is exhausted and nothing more can be drained. Output that did not fit stays
    /// buffered for the next call.
    pub fn encode(&mut self, input: &[u8], output: &mut [u8]) -> Result<EncodeResult, TtaError> {
        if self.state == LastBlockState::LastBlockFlushed && !input.is_empty() {
            warn!("rejected {} input bytes after the last block", input.len());
            return Err(TtaError::InvalidState("input after the last block was flushed"));
        }

        let mut result = EncodeResult::default();
        loop {
            result.written += self.encoder.io_mut().drain(&mut output[result.written..]);
            let slot_full = result.written > 0 && result.written == output.len();
            if slot_full || !self.encoder.io().is_empty() {
                // Leftover staged bytes also mean the slot is full.
                break;
            }

            let remaining = &input[result.consumed..];
            if remaining.is_empty() {
                if self.state == LastBlockState::LastBlockPending {
                    self.encoder.preliminary_finish()?;
                    self.state = LastBlockState::LastBlockFlushed;
                    debug!(
                        "flushed the last block after {} samples",
                        self.total_samples_encoded()
                    );
                    continue;
                }
                break;
            }

            let block = &remaining[..remaining.len().min(self.block_size)];
            self.encoder.process_stream(block)?;
            result.consumed += block.len();
            self.consumed_bytes += block.len() as u64;

            trace!(
                "fed {} bytes, {} bytes staged",
                block.len(),
                self.encoder.io().len()
            );
        }

        Ok(result)
    }

    /// Splices the final header and the seek table in front of the payload stored at
    /// `path`.
    ///
    /// `path` must hold the exact bytes returned by all `encode` calls. The session has
    /// to reach [`LastBlockState::LastBlockFlushed`] and all output has to be drained
    /// before it can be finished. Once finished successfully, a session can't be finished
    /// again. After a failed attempt the destination is left untouched and the call can be
    /// repeated.
    pub fn finish_audio<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TtaError> {
        if self.finished {
            return Err(TtaError::InvalidState("session was already finished"));
        }
        if self.state != LastBlockState::LastBlockFlushed {
            return Err(TtaError::InvalidState("the last block was not flushed yet"));
        }
        if !self.encoder.io().is_empty() {
            return Err(TtaError::InvalidState("compressed output was not drained"));
        }

        let samples = self
            .total_samples_encoded()
            .to_u32()
            .filter(|samples| *samples != crate::MAX_SAMPLES)
            .ok_or(TtaError::Format("too many samples for a TTA1 header"))?;

        let result = splice::finish(
            &mut self.encoder,
            &self.info.with_samples(samples),
            &self.configuration,
            path.as_ref(),
        );
        match result {
            Ok(()) => self.finished = true,
            Err(ref err) => {
                warn!("can't finish {}: {}", path.as_ref().display(), err);
                // Drops a staged header or seek table of the failed attempt.
                self.encoder.io_mut().reset();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use std::io::Cursor;

    use nanorand::RNG;

    use super::*;
    use crate::{StreamIo, MAX_BPS, MAX_NCH};

    fn random_pcm(seed: u64, len: usize) -> Vec<u8> {
        let mut rnd = nanorand::WyRand::new_seed(seed);
        let mut pcm = Vec::with_capacity(len);
        let mut phase = 0.0_f32;
        while pcm.len() < len {
            phase += 0.02;
            let noise = rnd.generate_range::<u32>(0, 512) as i32 - 256;
            let value = (phase.sin() * 9000.0) as i32 + noise;
            pcm.extend_from_slice(&(value as i16).to_le_bytes());
        }
        pcm.truncate(len);
        pcm
    }

    /// Pushes `pcm` in chunks of `in_chunk` bytes and pulls output in slots of `out_slot`
    /// bytes until the session is flushed and drained.
    fn run_session(
        coder: &mut TtaAudioCoder,
        pcm: &[u8],
        in_chunk: usize,
        out_slot: usize,
    ) -> Vec<u8> {
        let mut stream = Vec::new();
        let mut out = vec![0_u8; out_slot];
        let mut input = pcm;

        loop {
            if input.is_empty() {
                coder.prepare_to_finish();
            }
            let chunk = &input[..input.len().min(in_chunk)];
            let result = coder.encode(chunk, &mut out).unwrap();
            input = &input[result.consumed..];
            stream.extend_from_slice(&out[..result.written]);

            if coder.state() == LastBlockState::LastBlockFlushed
                && result.written == 0
                && coder.pending_output() == 0
            {
                return stream;
            }
        }
    }

    fn single_shot(info: &TtaInfo, pcm: &[u8]) -> Vec<u8> {
        let mut encoder = TtaEncoder::new(StreamIo::new(Cursor::new(Vec::new())));
        encoder.init_set_info_for_memory(info).unwrap();
        encoder.process_stream(pcm).unwrap();
        encoder.preliminary_finish().unwrap();
        encoder.into_inner().into_inner().into_inner()
    }

    #[test]
    fn test_construction_validates_format() {
        for channels in 1..=MAX_NCH {
            for bits in [1, 8, 16, 24].iter() {
                assert!(TtaAudioCoder::new(channels, 44100, *bits).is_ok());
            }
        }
        assert!(matches!(
            TtaAudioCoder::new(0, 44100, 16),
            Err(TtaError::Format(_))
        ));
        assert!(matches!(
            TtaAudioCoder::new(MAX_NCH + 1, 44100, 16),
            Err(TtaError::Format(_))
        ));
        assert!(matches!(
            TtaAudioCoder::new(2, 44100, MAX_BPS + 1),
            Err(TtaError::Format(_))
        ));
        assert!(matches!(
            TtaAudioCoder::new(2, 44100, 0),
            Err(TtaError::Format(_))
        ));
    }

    #[test]
    fn test_derived_sizes() {
        let coder = TtaAudioCoder::new(3, 48000, 24).unwrap();
        assert_eq!(coder.sample_frame_size(), 9);
        assert_eq!(coder.encode_block_size(), 5210 * 9);
        assert_eq!(coder.state(), LastBlockState::Streaming);
        assert_eq!(coder.total_samples_encoded(), 0);
    }

    #[test]
    fn test_chunking_is_transparent() {
        let pcm = random_pcm(42, 200_000);
        let reference = single_shot(&TtaInfo::new(2, 16, 44100), &pcm);

        for (in_chunk, out_slot) in [(pcm.len(), 1 << 20), (4096, 4096), (1, 7), (333, 1)].iter() {
            let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
            let stream = run_session(&mut coder, &pcm, *in_chunk, *out_slot);
            assert_eq!(
                stream, reference,
                "input chunks of {} and output slots of {} changed the stream",
                in_chunk, out_slot
            );
        }
    }

    #[test]
    fn test_sample_count() {
        let pcm = random_pcm(7, 4 * 12_345);
        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
        run_session(&mut coder, &pcm, 1000, 512);
        assert_eq!(coder.total_samples_encoded(), 12_345);
    }

    #[test]
    fn test_zero_length_slot() {
        let pcm = random_pcm(3, 100_000);
        let reference = single_shot(&TtaInfo::new(2, 16, 44100), &pcm);
        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();

        let mut input = &pcm[..];
        while !input.is_empty() {
            let result = coder.encode(input, &mut []).unwrap();
            assert_eq!(result.written, 0);
            if result.consumed == 0 {
                break;
            }
            input = &input[result.consumed..];
        }
        assert!(coder.pending_output() <= coder.encoder.io().capacity());

        let mut stream = Vec::new();
        let mut out = vec![0_u8; 1000];
        coder.prepare_to_finish();
        loop {
            let result = coder.encode(input, &mut out).unwrap();
            input = &input[result.consumed..];
            stream.extend_from_slice(&out[..result.written]);
            if result.written == 0 && input.is_empty() {
                break;
            }
        }
        assert_eq!(stream, reference);
    }

    #[test]
    fn test_zero_length_slot_with_staged_output() {
        let pcm = random_pcm(4, 100_000);
        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
        let mut out = [0_u8; 16];
        coder.encode(&pcm, &mut out).unwrap();
        assert!(coder.pending_output() > 0);

        let pending = coder.pending_output();
        let result = coder.encode(&pcm[..4], &mut []).unwrap();
        assert_eq!(result, EncodeResult::default());
        assert_eq!(coder.pending_output(), pending);
    }

    #[test]
    fn test_prepare_to_finish_is_idempotent() {
        let mut coder = TtaAudioCoder::new(1, 8000, 8).unwrap();
        coder.prepare_to_finish();
        coder.prepare_to_finish();
        assert_eq!(coder.state(), LastBlockState::LastBlockPending);

        let mut out = vec![0_u8; 128];
        coder.encode(&[0x80; 10], &mut out).unwrap();
        assert_eq!(coder.state(), LastBlockState::LastBlockFlushed);
        coder.prepare_to_finish();
        assert_eq!(coder.state(), LastBlockState::LastBlockFlushed);
    }

    #[test]
    fn test_input_after_last_block_is_rejected() {
        let mut coder = TtaAudioCoder::new(1, 8000, 8).unwrap();
        let mut out = vec![0_u8; 128];
        coder.prepare_to_finish();
        coder.encode(&[0x80; 10], &mut out).unwrap();

        assert!(matches!(
            coder.encode(&[0x80], &mut out),
            Err(TtaError::InvalidState(_))
        ));
        assert!(coder.encode(&[], &mut out).is_ok());
    }

    /// Near silent noise with a full scale spike every 400 samples. The silence drives
    /// both Rice parameters down, so every spike codes into a very long unary prefix.
    fn spiky_pcm(samples: usize, bits: u32) -> Vec<u8> {
        let mut rnd = nanorand::WyRand::new_seed(17);
        let depth = ((bits + 7) / 8) as usize;
        let peak = (1_i32 << (bits - 1)) - 1;
        let mut pcm = Vec::with_capacity(samples * depth);

        for i in 0..samples {
            let value = if i % 400 == 399 {
                if i % 800 == 399 {
                    peak
                } else {
                    -peak
                }
            } else {
                rnd.generate_range::<u32>(0, 3) as i32 - 1
            };
            pcm.extend_from_slice(&value.to_le_bytes()[..depth]);
        }
        pcm
    }

    #[test]
    fn test_spiky_input_fits_staging() {
        for (bits, samples) in [(16, 20_000), (24, 1_200)].iter() {
            let pcm = spiky_pcm(*samples, *bits);
            let reference = single_shot(&TtaInfo::new(1, *bits, 44100), &pcm);
            assert!(reference.len() > 2 * pcm.len());

            for (in_chunk, out_slot) in [(pcm.len(), 1 << 16), (1000, 100)].iter() {
                let mut coder = TtaAudioCoder::new(1, 44100, *bits).unwrap();
                let stream = run_session(&mut coder, &pcm, *in_chunk, *out_slot);
                assert_eq!(stream, reference, "{} bit spikes changed the stream", bits);
                assert_eq!(coder.total_samples_encoded(), *samples as u64);
            }
        }
    }

    #[test]
    fn test_full_slot_stops_feeding() {
        let pcm = random_pcm(5, 200_000);
        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
        let mut out = [0_u8; 16];
        let first = coder.encode(&pcm, &mut out).unwrap();
        assert_eq!(first.written, 16);
        assert_eq!(first.consumed, coder.encode_block_size());

        // A slot that exactly fits the staged bytes is filled without touching the input.
        let mut exact = vec![0_u8; coder.pending_output()];
        let second = coder.encode(&pcm[first.consumed..], &mut exact).unwrap();
        assert_eq!(second.written, exact.len());
        assert_eq!(second.consumed, 0);
        assert_eq!(coder.pending_output(), 0);
        assert_eq!(coder.total_samples_encoded(), first.consumed as u64 / 4);
    }

    #[test]
    fn test_finish_can_be_retried_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retry.tta");

        let pcm = random_pcm(8, 4 * 3_000);
        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
        let stream = run_session(&mut coder, &pcm, 4096, 4096);

        // The payload was not stored yet.
        assert!(matches!(
            coder.finish_audio(&path),
            Err(TtaError::Read { .. })
        ));
        assert_eq!(coder.pending_output(), 0);

        std::fs::write(&path, &stream).unwrap();
        coder.finish_audio(&path).unwrap();
        let file = std::fs::read(&path).unwrap();
        assert_eq!(&file[14..18], &3_000_u32.to_le_bytes());
        assert_eq!(file.len(), stream.len() + 8);
        assert!(matches!(
            coder.finish_audio(&path),
            Err(TtaError::InvalidState(_))
        ));
    }

    #[test]
    fn test_finish_before_last_block_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("early.tta");
        std::fs::write(&path, b"").unwrap();

        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
        let mut out = vec![0_u8; 4096];
        coder.encode(&random_pcm(1, 4000), &mut out).unwrap();
        assert!(matches!(
            coder.finish_audio(&path),
            Err(TtaError::InvalidState(_))
        ));

        coder.prepare_to_finish();
        assert!(matches!(
            coder.finish_audio(&path),
            Err(TtaError::InvalidState(_))
        ));
    }

    #[test]
    fn test_finish_with_undrained_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("undrained.tta");
        std::fs::write(&path, b"").unwrap();

        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
        let mut out = vec![0_u8; 8];
        coder.prepare_to_finish();
        coder.encode(&random_pcm(2, 4000), &mut out).unwrap();
        assert_eq!(coder.state(), LastBlockState::LastBlockFlushed);
        assert!(matches!(
            coder.finish_audio(&path),
            Err(TtaError::InvalidState(_))
        ));
    }

    #[test]
    fn test_header_counts_samples_of_partial_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.tta");

        // The host announces the end after a chunk that stops in the middle of a block.
        let pcm = random_pcm(11, 4 * 7_777);
        let mut coder = TtaAudioCoder::new(2, 44100, 16).unwrap();
        let mut stream = Vec::new();
        let mut out = vec![0_u8; 1 << 16];

        let result = coder.encode(&pcm[..4 * 5_000], &mut out).unwrap();
        stream.extend_from_slice(&out[..result.written]);
        coder.prepare_to_finish();
        let mut input = &pcm[4 * 5_000..];
        loop {
            let result = coder.encode(input, &mut out).unwrap();
            input = &input[result.consumed..];
            stream.extend_from_slice(&out[..result.written]);
            if result.written == 0 && input.is_empty() {
                break;
            }
        }

        std::fs::write(&path, &stream).unwrap();
        coder.finish_audio(&path).unwrap();

        let file = std::fs::read(&path).unwrap();
        assert_eq!(&file[14..18], &7_777_u32.to_le_bytes());
        assert!(matches!(
            coder.finish_audio(&path),
            Err(TtaError::InvalidState(_))
        ));
    }

    #[cfg(feature = "decoder")]
    #[test]
    fn test_round_trip_through_file() {
        use crate::TtaDecoder;

        for mode in [ReplaceMode::AtomicRename, ReplaceMode::Copy].iter() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("round_trip.tta");
            let configuration = EncoderConfiguration {
                block_frames: 1000,
                copy_chunk_size: 777,
                replace_mode: *mode,
                ..EncoderConfiguration::default()
            };

            let pcm = random_pcm(99, 4 * 100_000);
            let mut coder =
                TtaAudioCoder::with_configuration(2, 44100, 16, &configuration).unwrap();
            let stream = run_session(&mut coder, &pcm, 10_000, 3000);
            std::fs::write(&path, &stream).unwrap();
            coder.finish_audio(&path).unwrap();

            let file = std::fs::File::open(&path).unwrap();
            let mut decoder = TtaDecoder::new(std::io::BufReader::new(file)).unwrap();
            assert_eq!(
                u64::from(decoder.info().samples),
                coder.total_samples_encoded()
            );
            assert_eq!(decoder.decode_to_end().unwrap(), pcm);

            let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
            assert_eq!(leftovers, 1, "temporary file was left behind");
        }
    }
}
