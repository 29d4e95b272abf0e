use num_traits::PrimInt;

/// Order of the fixed first stage predictor.
pub(crate) const PREDICTOR_ORDER: u32 = 5;

/// Returns `2^k`, saturating at `2^31`.
#[inline(always)]
pub(crate) fn bit_shift(k: u32) -> u32 {
    if k < 32 {
        1 << k
    } else {
        0x8000_0000
    }
}

/// Returns a mask with the lowest `k` bits set.
#[inline(always)]
pub(crate) fn bit_mask(k: u32) -> u32 {
    if k < 32 {
        (1 << k) - 1
    } else {
        u32::MAX
    }
}

/// Threshold table of the adaptive Rice parameters: `2^(k + 4)`.
#[inline(always)]
pub(crate) fn shift_16(k: u32) -> u32 {
    bit_shift(k + 4)
}

/// Fixed first-order predictor: `x * (2^k - 1) / 2^k`.
#[inline(always)]
pub(crate) fn predictor1(x: i32, k: u32) -> i32 {
    x.wrapping_mul((1 << k) - 1) >> k
}

/// Maps signed residuals onto unsigned values: 1, -1, 2, -2 ... become 1, 2, 3, 4 ...
#[inline(always)]
pub(crate) fn zigzag_encode(x: i32) -> u32 {
    if x > 0 {
        (x as u32).wrapping_shl(1).wrapping_sub(1)
    } else {
        (x as u32).wrapping_shl(1).wrapping_neg()
    }
}

/// Inverse of [`zigzag_encode`].
#[inline(always)]
pub(crate) fn zigzag_decode(x: u32) -> i32 {
    if x & 1 != 0 {
        ((x >> 1) + 1) as i32
    } else {
        ((x >> 1) as i32).wrapping_neg()
    }
}

/// Integer division rounding towards positive infinity.
#[inline(always)]
pub(crate) fn div_ceil<T: PrimInt>(lhs: T, rhs: T) -> T {
    let quotient = lhs / rhs;
    if lhs % rhs != T::zero() {
        quotient + T::one()
    } else {
        quotient
    }
}
