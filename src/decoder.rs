//! Implements the TTA decoder.
use std::io::Read;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::filter::{filter_shift, ChannelCodec};
use crate::math::{predictor1, PREDICTOR_ORDER};
use crate::rice_coder::RiceDecoder;
use crate::{DecoderError, TtaInfo, TTA_FORMAT_SIMPLE, TTA_HEADER_SIZE, TTA_SIGNATURE};

/// TTA decoder.
///
/// Reads the header and seek table on creation and then decodes one frame per call
/// into interleaved little endian PCM, in the same sample layout the encoder consumes.
/// Every header, seek table and frame checksum is verified.
pub struct TtaDecoder<R: Read> {
    reader: R,
    info: TtaInfo,
    seek_table: Vec<u32>,
    channels: Vec<ChannelCodec>,
    values: Vec<i32>,
    frame: Vec<u8>,
    shift: u32,
    next_frame: usize,
    samples_left: u32,
}

impl<R: Read> TtaDecoder<R> {
    /// Creates a new `TtaDecoder` and reads the header and seek table from `reader`.
    pub fn new(mut reader: R) -> Result<Self, DecoderError> {
        let info = read_header(&mut reader)?;
        let seek_table = read_seek_table(&mut reader, &info)?;
        let shift = filter_shift(info.depth());

        Ok(Self {
            reader,
            info,
            seek_table,
            channels: vec![ChannelCodec::new(shift); info.channels as usize],
            values: vec![0; info.channels as usize],
            frame: Vec::new(),
            shift,
            next_frame: 0,
            samples_left: info.samples,
        })
    }

    /// Stream parameters from the header.
    pub fn info(&self) -> &TtaInfo {
        &self.info
    }

    /// Size of every frame, CRC included.
    pub fn seek_table(&self) -> &[u32] {
        &self.seek_table
    }

    /// Decodes the next frame and appends its PCM bytes to `pcm`.
    ///
    /// Returns the number of samples per channel decoded, or `None` after the last frame.
    pub fn decode_frame(&mut self, pcm: &mut Vec<u8>) -> Result<Option<u32>, DecoderError> {
        let size = match self.seek_table.get(self.next_frame) {
            Some(size) => *size as usize,
            None => return Ok(None),
        };
        if size < 4 {
            return Err(DecoderError::UnsupportedFormat("frame is smaller than its crc"));
        }
        self.next_frame += 1;

        self.frame.resize(size, 0);
        self.reader.read_exact(&mut self.frame)?;
        let (payload, crc) = self.frame.split_at(size - 4);
        if crc32fast::hash(payload) != LittleEndian::read_u32(crc) {
            return Err(DecoderError::CrcMismatch("frame"));
        }

        let frame_samples = self.samples_left.min(self.info.frame_length());
        self.samples_left -= frame_samples;

        for state in &mut self.channels {
            *state = ChannelCodec::new(self.shift);
        }

        let depth = self.info.depth();
        let last = self.channels.len() - 1;
        let mut rice = RiceDecoder::new(payload);
        let mut raw = [0_u8; 3];

        pcm.reserve(frame_samples as usize * self.info.sample_frame_size());
        for _ in 0..frame_samples {
            for (state, value) in self.channels.iter_mut().zip(self.values.iter_mut()) {
                let residual = rice.get_value(&mut state.rice)?;
                let filtered = state.filter.decode(residual);
                let decoded = filtered.wrapping_add(predictor1(state.prev, PREDICTOR_ORDER));
                state.prev = decoded;
                *value = decoded;
            }

            // Undo the inter-channel decorrelation, starting from the last channel.
            if last > 0 {
                self.values[last] = self.values[last].wrapping_add(self.values[last - 1] / 2);
                for ch in (0..last).rev() {
                    self.values[ch] = self.values[ch + 1].wrapping_sub(self.values[ch]);
                }
            }

            for value in &self.values {
                write_sample(&mut raw, *value, depth);
                pcm.extend_from_slice(&raw[..depth]);
            }
        }

        Ok(Some(frame_samples))
    }

    /// Decodes all remaining frames and returns their PCM bytes.
    pub fn decode_to_end(&mut self) -> Result<Vec<u8>, DecoderError> {
        let mut pcm = Vec::new();
        while self.decode_frame(&mut pcm)?.is_some() {}
        Ok(pcm)
    }

    /// Unwraps the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn read_header<R: Read>(reader: &mut R) -> Result<TtaInfo, DecoderError> {
    let mut header = [0_u8; TTA_HEADER_SIZE as usize];
    reader.read_exact(&mut header)?;

    if header[..4] != TTA_SIGNATURE {
        return Err(DecoderError::InvalidSignature);
    }
    if crc32fast::hash(&header[..18]) != LittleEndian::read_u32(&header[18..]) {
        return Err(DecoderError::CrcMismatch("header"));
    }

    let mut fields = &header[4..18];
    let format = fields.read_u16::<LittleEndian>()?;
    if format != TTA_FORMAT_SIMPLE {
        return Err(DecoderError::UnsupportedFormat("only unencrypted streams are supported"));
    }

    let channels = u32::from(fields.read_u16::<LittleEndian>()?);
    let bits_per_sample = u32::from(fields.read_u16::<LittleEndian>()?);
    let sample_rate = fields.read_u32::<LittleEndian>()?;
    let samples = fields.read_u32::<LittleEndian>()?;

    let info = TtaInfo::new(channels, bits_per_sample, sample_rate).with_samples(samples);
    if info.validate().is_err() {
        return Err(DecoderError::UnsupportedFormat("stream parameters out of range"));
    }

    Ok(info)
}

fn read_seek_table<R: Read>(reader: &mut R, info: &TtaInfo) -> Result<Vec<u32>, DecoderError> {
    let mut table = vec![0_u8; info.seek_table_size() as usize];
    reader.read_exact(&mut table)?;

    let (entries, crc) = table.split_at(table.len() - 4);
    if crc32fast::hash(entries) != LittleEndian::read_u32(crc) {
        return Err(DecoderError::CrcMismatch("seek table"));
    }

    Ok(entries.chunks_exact(4).map(LittleEndian::read_u32).collect())
}

#[inline(always)]
fn write_sample(raw: &mut [u8; 3], value: i32, depth: usize) {
    match depth {
        1 => raw[0] = (value + 0x80) as u8,
        2 => LittleEndian::write_i16(&mut raw[..2], value as i16),
        _ => LittleEndian::write_i24(raw, value),
    }
}
