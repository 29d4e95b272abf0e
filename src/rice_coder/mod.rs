//! Implements the adaptive Rice coder of the TTA format.
//!
//! Residuals are mapped onto unsigned values and coded against two adaptive parameters.
//! Values below `2^k0` are written as a single zero bit followed by `k0` raw bits.
//! Larger values are reduced by `2^k0` and written as a unary prefix of `1 + (v >> k1)`
//! followed by `k1` raw bits. Both parameters track a running sum of the coded values
//! and move by at most one step per sample.
//!
//! Bits are packed LSB first. Unary prefixes are a run of one bits closed by a zero bit.
#[cfg(any(feature = "decoder", test))]
pub(crate) use decoder::RiceDecoder;
pub(crate) use encoder::RiceEncoder;

use crate::math::shift_16;

#[cfg(any(feature = "decoder", test))]
mod decoder;
mod encoder;

/// Longest run of unary bits emitted in one step.
const UNARY_CHUNK: u32 = 23;

/// State of the two adaptive Rice parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RiceState {
    pub(crate) k0: u32,
    pub(crate) k1: u32,
    sum0: u32,
    sum1: u32,
}

impl RiceState {
    pub(crate) fn new(k0: u32, k1: u32) -> Self {
        Self {
            k0,
            k1,
            sum0: shift_16(k0),
            sum1: shift_16(k1),
        }
    }

    #[inline(always)]
    fn adapt_k0(&mut self, value: u32) {
        adapt(&mut self.k0, &mut self.sum0, value);
    }

    #[inline(always)]
    fn adapt_k1(&mut self, value: u32) {
        adapt(&mut self.k1, &mut self.sum1, value);
    }
}

#[inline(always)]
fn adapt(k: &mut u32, sum: &mut u32, value: u32) {
    *sum = sum.wrapping_add(value.wrapping_sub(*sum >> 4));
    if *k > 0 && *sum < shift_16(*k) {
        *k -= 1;
    } else if *sum > shift_16(*k + 1) {
        *k += 1;
    }
}
