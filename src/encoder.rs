//! Implements the TTA block encoder.
use byteorder::{ByteOrder, LittleEndian};
use tracing::{trace, warn};

use crate::filter::{filter_shift, ChannelCodec};
use crate::math::{predictor1, PREDICTOR_ORDER};
use crate::rice_coder::RiceEncoder;
use crate::{EncoderError, TtaInfo, TtaIo, TTA_FORMAT_SIMPLE, TTA_HEADER_SIZE, TTA_SIGNATURE};

/// Where the seek table ends up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Layout {
    /// Header and frames are streamed, the seek table is emitted on its own by `finalize()`.
    Memory,
    /// Space for the seek table is reserved after the header and filled in by `finalize()`.
    Direct,
}

/// TTA block encoder.
///
/// Consumes interleaved little endian PCM and pushes the compressed stream into its
/// [`TtaIo`] callback. Output leaves the encoder in FIFO sized chunks, so the callback
/// sees nothing until enough data was compressed or the FIFO is flushed.
///
/// There are two ways to drive the encoder:
///
/// * [`init_set_info`](Self::init_set_info) writes a complete file in one pass to a
///   seekable sink, if the number of samples is known in advance.
/// * [`init_set_info_for_memory`](Self::init_set_info_for_memory) streams header and frames
///   without a seek table. After all samples were processed the header is re-issued with
///   the final sample count and [`finalize`](Self::finalize) emits the seek table on its
///   own, so the caller can place both in front of the already written frames.
pub struct TtaEncoder<W: TtaIo> {
    io: W,
    info: Option<TtaInfo>,
    layout: Layout,
    fifo: RiceEncoder,
    channels: Vec<ChannelCodec>,
    samples: Vec<i32>,
    pending: Vec<u8>,
    depth: usize,
    shift: u32,
    frame_length: u32,
    frame_position: u32,
    seek_table: Vec<u32>,
    offset: u64,
}

impl<W: TtaIo> TtaEncoder<W> {
    /// Creates a new encoder writing into `io`. The encoder needs to be initialized
    /// before it accepts samples.
    pub fn new(io: W) -> Self {
        Self {
            io,
            info: None,
            layout: Layout::Memory,
            fifo: RiceEncoder::new(),
            channels: Vec::new(),
            samples: Vec::new(),
            pending: Vec::new(),
            depth: 0,
            shift: 0,
            frame_length: 0,
            frame_position: 0,
            seek_table: Vec::new(),
            offset: 0,
        }
    }

    /// Initializes the encoder for a stream without a reserved seek table and queues a
    /// header for `info`.
    ///
    /// Calling it again on an initialized encoder only queues a new header, for example
    /// with the final sample count. The stream parameters must not change and no frame
    /// may be open at that point.
    pub fn init_set_info_for_memory(&mut self, info: &TtaInfo) -> Result<(), EncoderError> {
        info.validate()?;

        match self.info {
            None => self.setup(info, Layout::Memory, 0),
            Some(current) => {
                if current.channels != info.channels
                    || current.bits_per_sample != info.bits_per_sample
                    || current.sample_rate != info.sample_rate
                {
                    return Err(EncoderError::UnsupportedFormat(
                        "stream parameters cannot change while encoding",
                    ));
                }
                if self.frame_position != 0 || !self.pending.is_empty() {
                    return Err(EncoderError::InternalError(
                        "header can't be re-issued inside an open frame",
                    ));
                }
                self.info = Some(*info);
            }
        }

        self.write_header(info)
    }

    /// Initializes the encoder to write a complete stream at position `pos` of a seekable
    /// sink. The sample count of `info` must be final.
    pub fn init_set_info(&mut self, info: &TtaInfo, pos: u64) -> Result<(), EncoderError> {
        info.validate()?;
        if info.samples == crate::MAX_SAMPLES {
            return Err(EncoderError::UnsupportedFormat(
                "a complete stream needs the total sample count",
            ));
        }
        if self.info.is_some() {
            return Err(EncoderError::InternalError("encoder is already initialized"));
        }

        if pos != 0 {
            self.io.seek(pos)?;
        }
        self.setup(info, Layout::Direct, pos);
        self.write_header(info)?;
        self.fifo.skip_bytes(&mut self.io, info.seek_table_size())?;
        self.fifo.start();

        Ok(())
    }

    fn setup(&mut self, info: &TtaInfo, layout: Layout, pos: u64) {
        self.info = Some(*info);
        self.layout = layout;
        self.depth = info.depth();
        self.shift = filter_shift(self.depth);
        self.frame_length = info.frame_length();
        self.frame_position = 0;
        self.channels = vec![ChannelCodec::new(self.shift); info.channels as usize];
        self.samples = vec![0; info.channels as usize];
        self.pending.clear();
        self.seek_table.clear();
        self.offset = pos + TTA_HEADER_SIZE;
    }

    fn write_header(&mut self, info: &TtaInfo) -> Result<(), EncoderError> {
        self.fifo.start();
        self.fifo.put_bytes(&mut self.io, &TTA_SIGNATURE)?;
        self.fifo.put_u16(&mut self.io, TTA_FORMAT_SIMPLE)?;
        self.fifo.put_u16(&mut self.io, info.channels as u16)?;
        self.fifo.put_u16(&mut self.io, info.bits_per_sample as u16)?;
        self.fifo.put_u32(&mut self.io, info.sample_rate)?;
        self.fifo.put_u32(&mut self.io, info.samples)?;
        self.fifo.put_crc32(&mut self.io)?;
        self.fifo.start();
        Ok(())
    }

    /// Returns the stream parameters, once initialized.
    pub fn info(&self) -> Option<&TtaInfo> {
        self.info.as_ref()
    }

    /// Offset of the first byte after the header.
    pub fn header_offset(&self) -> u64 {
        self.offset
    }

    /// Sizes of all completed frames.
    pub fn seek_table(&self) -> &[u32] {
        &self.seek_table
    }

    /// Number of bytes compressed but not yet handed to the IO callback.
    pub fn buffered(&self) -> usize {
        self.fifo.buffered()
    }

    /// Returns a reference to the IO callback.
    pub fn io(&self) -> &W {
        &self.io
    }

    /// Returns a mutable reference to the IO callback.
    pub fn io_mut(&mut self) -> &mut W {
        &mut self.io
    }

    /// Unwraps the IO callback. Unflushed output is lost.
    pub fn into_inner(self) -> W {
        self.io
    }

    /// Compresses the given PCM bytes.
    ///
    /// The input doesn't need to end on a sample boundary: a trailing partial sample
    /// is kept and completed by the next call.
    pub fn process_stream(&mut self, input: &[u8]) -> Result<(), EncoderError> {
        let frame_size = match self.info {
            Some(info) => info.sample_frame_size(),
            None => return Err(EncoderError::InternalError("encoder is not initialized")),
        };

        let mut input = input;
        if !self.pending.is_empty() {
            let take = (frame_size - self.pending.len()).min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.pending.len() < frame_size {
                return Ok(());
            }

            let pending = std::mem::take(&mut self.pending);
            self.encode_sample_frame(&pending)?;
            self.pending = pending;
            self.pending.clear();
        }

        let mut chunks = input.chunks_exact(frame_size);
        for chunk in &mut chunks {
            self.encode_sample_frame(chunk)?;
        }
        self.pending.extend_from_slice(chunks.remainder());

        trace!(
            "processed {} bytes, {} frames done, {} bytes buffered",
            input.len(),
            self.seek_table.len(),
            self.fifo.buffered()
        );

        Ok(())
    }

    /// Number of samples the current frame holds before it is closed.
    fn frame_limit(&self) -> u32 {
        match (self.layout, self.info) {
            (Layout::Direct, Some(info)) => {
                let done = self.seek_table.len() as u64 * u64::from(self.frame_length);
                let left = u64::from(info.samples).saturating_sub(done);
                left.min(u64::from(self.frame_length)) as u32
            }
            _ => self.frame_length,
        }
    }

    fn encode_sample_frame(&mut self, bytes: &[u8]) -> Result<(), EncoderError> {
        if self.frame_position == 0 && self.frame_limit() == 0 {
            return Err(EncoderError::InternalError(
                "more samples than announced in the header",
            ));
        }

        let depth = self.depth;
        for (sample, raw) in self.samples.iter_mut().zip(bytes.chunks_exact(depth)) {
            *sample = read_sample(raw, depth);
        }

        let last = self.channels.len() - 1;
        let mut res = 0_i32;
        for ch in 0..=last {
            let mut curr = self.samples[ch];
            if ch < last {
                curr = self.samples[ch + 1].wrapping_sub(curr);
                res = curr;
            } else {
                curr = curr.wrapping_sub(res / 2);
            }

            let state = &mut self.channels[ch];
            let temp = curr;
            curr = curr.wrapping_sub(predictor1(state.prev, PREDICTOR_ORDER));
            state.prev = temp;

            let residual = state.filter.encode(curr);
            self.fifo.put_value(&mut self.io, &mut state.rice, residual)?;
        }

        self.frame_position += 1;
        if self.frame_position == self.frame_limit() {
            self.close_frame()?;
        }

        Ok(())
    }

    fn close_frame(&mut self) -> Result<(), EncoderError> {
        let size = self.fifo.finish_frame(&mut self.io)?;
        self.seek_table.push(size);
        self.frame_position = 0;
        for state in &mut self.channels {
            *state = ChannelCodec::new(self.shift);
        }
        self.fifo.start();
        Ok(())
    }

    /// Closes the open frame and flushes the FIFO, without emitting the seek table.
    pub fn preliminary_finish(&mut self) -> Result<(), EncoderError> {
        if !self.pending.is_empty() {
            warn!(
                "dropping {} trailing bytes that don't form a whole sample",
                self.pending.len()
            );
            self.pending.clear();
        }
        if self.frame_position > 0 {
            self.close_frame()?;
        }
        self.fifo.flush(&mut self.io)
    }

    /// Hands all buffered output to the IO callback.
    pub fn flush_fifo(&mut self) -> Result<(), EncoderError> {
        self.fifo.flush(&mut self.io)
    }

    /// Closes the stream and emits the seek table.
    ///
    /// For a complete stream the table is written into the space reserved after the
    /// header. Otherwise it is written at the current position of the callback.
    pub fn finalize(&mut self) -> Result<(), EncoderError> {
        let info = match self.info {
            Some(info) => info,
            None => return Err(EncoderError::InternalError("encoder is not initialized")),
        };

        self.preliminary_finish()?;
        if info.frame_count() as usize != self.seek_table.len() {
            return Err(EncoderError::InternalError(
                "seek table does not match the announced sample count",
            ));
        }

        if self.layout == Layout::Direct {
            self.io.seek(self.offset)?;
        }

        self.fifo.start();
        for size in self.seek_table.iter() {
            self.fifo.put_u32(&mut self.io, *size)?;
        }
        self.fifo.put_crc32(&mut self.io)?;
        self.fifo.flush(&mut self.io)?;
        self.fifo.start();

        Ok(())
    }
}

/// Reads a single sample of `depth` bytes. 8 bit samples are unsigned.
#[inline(always)]
fn read_sample(raw: &[u8], depth: usize) -> i32 {
    match depth {
        1 => i32::from(raw[0]) - 0x80,
        2 => i32::from(LittleEndian::read_i16(raw)),
        _ => LittleEndian::read_i24(raw),
    }
}
