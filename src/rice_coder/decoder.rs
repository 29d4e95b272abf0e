//! Implements the Rice decoder.
use crate::math::{bit_mask, bit_shift, zigzag_decode};
use crate::rice_coder::RiceState;
use crate::DecoderError;

/// Bit reader over the payload of a single frame.
pub(crate) struct RiceDecoder<'d> {
    data: &'d [u8],
    pos: usize,
    bit_cache: u64,
    bit_count: u32,
}

impl<'d> RiceDecoder<'d> {
    pub(crate) fn new(data: &'d [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_cache: 0,
            bit_count: 0,
        }
    }

    fn next_byte(&mut self) -> Result<u8, DecoderError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DecoderError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn get_binary(&mut self, bits: u32) -> Result<u32, DecoderError> {
        let bits = bits.min(32);
        while self.bit_count < bits {
            let byte = self.next_byte()?;
            self.bit_cache |= u64::from(byte) << self.bit_count;
            self.bit_count += 8;
        }
        let value = (self.bit_cache as u32) & bit_mask(bits);
        self.bit_cache >>= bits;
        self.bit_count -= bits;
        Ok(value)
    }

    fn get_unary(&mut self) -> Result<u32, DecoderError> {
        let mut value = 0_u32;
        loop {
            if self.bit_count == 0 {
                self.bit_cache = u64::from(self.next_byte()?);
                self.bit_count = 8;
            }
            let bit = self.bit_cache & 1;
            self.bit_cache >>= 1;
            self.bit_count -= 1;
            if bit == 0 {
                return Ok(value);
            }
            value = value.wrapping_add(1);
        }
    }

    /// Decodes a residual.
    pub(crate) fn get_value(&mut self, rice: &mut RiceState) -> Result<i32, DecoderError> {
        let mut unary = self.get_unary()?;

        let (escaped, k) = if unary == 0 {
            (false, rice.k0)
        } else {
            unary -= 1;
            (true, rice.k1)
        };

        let mut value = if k > 0 {
            let binary = self.get_binary(k)?;
            unary.checked_shl(k).unwrap_or(0).wrapping_add(binary)
        } else {
            unary
        };

        if escaped {
            rice.adapt_k1(value);
            value = value.wrapping_add(bit_shift(rice.k0));
        }
        rice.adapt_k0(value);

        Ok(zigzag_decode(value))
    }
}
