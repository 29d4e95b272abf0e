//! Implements the Rice encoder and the output FIFO of the block encoder.
use byteorder::{ByteOrder, LittleEndian};

use crate::math::{bit_mask, bit_shift, zigzag_encode};
use crate::rice_coder::{RiceState, UNARY_CHUNK};
use crate::{EncoderError, TtaIo, FIFO_BUFFER_SIZE};

/// Bit writer in front of the IO callback.
///
/// Bytes are collected in a FIFO of [`FIFO_BUFFER_SIZE`] bytes and handed to the
/// callback whenever the FIFO runs full, or when it is flushed explicitly. A CRC32 and
/// a byte count are kept for everything written since the last `start()`.
pub(crate) struct RiceEncoder {
    /// Bytes not yet handed to the callback.
    buffer: Vec<u8>,
    /// Pending bits, LSB first.
    bit_cache: u64,
    /// Number of valid bits in `bit_cache`.
    bit_count: u32,
    /// Checksum of the current unit.
    crc: crc32fast::Hasher,
    /// Bytes written in the current unit.
    count: u32,
}

impl RiceEncoder {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FIFO_BUFFER_SIZE),
            bit_cache: 0,
            bit_count: 0,
            crc: crc32fast::Hasher::new(),
            count: 0,
        }
    }

    /// Starts a new unit (header, frame or seek table).
    pub(crate) fn start(&mut self) {
        self.bit_cache = 0;
        self.bit_count = 0;
        self.crc.reset();
        self.count = 0;
    }

    /// Bytes waiting in the FIFO.
    pub(crate) fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn put_byte<W: TtaIo + ?Sized>(&mut self, io: &mut W, value: u8) -> Result<(), EncoderError> {
        self.crc.update(&[value]);
        self.count = self.count.wrapping_add(1);
        self.buffer.push(value);
        if self.buffer.len() == FIFO_BUFFER_SIZE {
            self.flush(io)?;
        }
        Ok(())
    }

    pub(crate) fn put_bytes<W: TtaIo + ?Sized>(
        &mut self,
        io: &mut W,
        bytes: &[u8],
    ) -> Result<(), EncoderError> {
        for byte in bytes {
            self.put_byte(io, *byte)?;
        }
        Ok(())
    }

    pub(crate) fn put_u16<W: TtaIo + ?Sized>(
        &mut self,
        io: &mut W,
        value: u16,
    ) -> Result<(), EncoderError> {
        let mut bytes = [0_u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.put_bytes(io, &bytes)
    }

    pub(crate) fn put_u32<W: TtaIo + ?Sized>(
        &mut self,
        io: &mut W,
        value: u32,
    ) -> Result<(), EncoderError> {
        let mut bytes = [0_u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.put_bytes(io, &bytes)
    }

    /// Writes the CRC32 of everything written since the last `start()`.
    pub(crate) fn put_crc32<W: TtaIo + ?Sized>(&mut self, io: &mut W) -> Result<(), EncoderError> {
        let crc = self.crc.clone().finalize();
        self.put_u32(io, crc)
    }

    /// Writes `len` zero bytes.
    pub(crate) fn skip_bytes<W: TtaIo + ?Sized>(
        &mut self,
        io: &mut W,
        len: u64,
    ) -> Result<(), EncoderError> {
        for _ in 0..len {
            self.put_byte(io, 0)?;
        }
        Ok(())
    }

    fn drain_cache<W: TtaIo + ?Sized>(&mut self, io: &mut W) -> Result<(), EncoderError> {
        while self.bit_count >= 8 {
            self.put_byte(io, self.bit_cache as u8)?;
            self.bit_cache >>= 8;
            self.bit_count -= 8;
        }
        Ok(())
    }

    fn put_binary<W: TtaIo + ?Sized>(
        &mut self,
        io: &mut W,
        value: u32,
        bits: u32,
    ) -> Result<(), EncoderError> {
        let bits = bits.min(32);
        self.drain_cache(io)?;
        self.bit_cache |= u64::from(value & bit_mask(bits)) << self.bit_count;
        self.bit_count += bits;
        Ok(())
    }

    fn put_unary<W: TtaIo + ?Sized>(&mut self, io: &mut W, value: u32) -> Result<(), EncoderError> {
        let mut value = value;
        loop {
            self.drain_cache(io)?;
            if value > UNARY_CHUNK {
                self.bit_cache |= u64::from(bit_mask(UNARY_CHUNK)) << self.bit_count;
                self.bit_count += UNARY_CHUNK;
                value -= UNARY_CHUNK;
            } else {
                self.bit_cache |= u64::from(bit_mask(value)) << self.bit_count;
                self.bit_count += value + 1;
                return Ok(());
            }
        }
    }

    /// Rice codes a residual.
    pub(crate) fn put_value<W: TtaIo + ?Sized>(
        &mut self,
        io: &mut W,
        rice: &mut RiceState,
        value: i32,
    ) -> Result<(), EncoderError> {
        let mut outval = zigzag_encode(value);
        let mut k = rice.k0;

        rice.adapt_k0(outval);

        let unary = if outval >= bit_shift(k) {
            outval -= bit_shift(k);
            k = rice.k1;
            rice.adapt_k1(outval);
            1 + outval.checked_shr(k).unwrap_or(0)
        } else {
            0
        };

        self.put_unary(io, unary)?;
        if k > 0 {
            self.put_binary(io, outval & bit_mask(k), k)?;
        }
        Ok(())
    }

    /// Pads the pending bits to a whole byte and closes the unit with its CRC32.
    ///
    /// Returns the size of the unit in bytes, CRC included.
    pub(crate) fn finish_frame<W: TtaIo + ?Sized>(
        &mut self,
        io: &mut W,
    ) -> Result<u32, EncoderError> {
        while self.bit_count > 0 {
            self.put_byte(io, self.bit_cache as u8)?;
            self.bit_cache >>= 8;
            self.bit_count = self.bit_count.saturating_sub(8);
        }
        self.bit_cache = 0;
        self.put_crc32(io)?;
        Ok(self.count)
    }

    /// Hands every buffered byte to the IO callback.
    pub(crate) fn flush<W: TtaIo + ?Sized>(&mut self, io: &mut W) -> Result<(), EncoderError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let requested = self.buffer.len();
        let written = io.write(&self.buffer)?;
        if written != requested {
            return Err(EncoderError::ShortWrite { requested, written });
        }
        self.buffer.clear();
        Ok(())
    }
}
