//! Implements the adaptive hybrid filter and the per channel coding state.
//!
//! The filter is an 8 tap sign-sign LMS predictor. The taps `qm` are nudged by `dx`
//! (the scaled signs of the history in `dl`) after every sample, in the direction of
//! the sign of the previous residual.
use crate::rice_coder::RiceState;

/// Filter shift for 1, 2 and 3 byte samples.
const FILTER_SHIFT: [u32; 3] = [10, 9, 10];

/// Initial value of both adaptive Rice parameters.
const RICE_INITIAL_K: u32 = 10;

/// Returns the filter shift for the given sample depth in bytes.
pub(crate) fn filter_shift(depth: usize) -> u32 {
    FILTER_SHIFT[depth.clamp(1, FILTER_SHIFT.len()) - 1]
}

/// The adaptive hybrid filter.
#[derive(Clone, Debug)]
pub(crate) struct HybridFilter {
    error: i32,
    round: i32,
    shift: u32,
    qm: [i32; 8],
    dx: [i32; 8],
    dl: [i32; 8],
}

impl HybridFilter {
    pub(crate) fn new(shift: u32) -> Self {
        Self {
            error: 0,
            round: 1 << (shift - 1),
            shift,
            qm: [0; 8],
            dx: [0; 8],
            dl: [0; 8],
        }
    }

    /// Adapts the taps and returns the prediction of the next sample.
    fn predict(&mut self) -> i32 {
        if self.error < 0 {
            for (qm, dx) in self.qm.iter_mut().zip(self.dx.iter()) {
                *qm = qm.wrapping_sub(*dx);
            }
        } else if self.error > 0 {
            for (qm, dx) in self.qm.iter_mut().zip(self.dx.iter()) {
                *qm = qm.wrapping_add(*dx);
            }
        }

        let sum = self
            .dl
            .iter()
            .zip(self.qm.iter())
            .fold(self.round, |sum, (dl, qm)| {
                sum.wrapping_add(dl.wrapping_mul(*qm))
            });

        self.dx.copy_within(1..5, 0);
        self.dl.copy_within(1..5, 0);

        self.dx[4] = (self.dl[4] >> 30) | 1;
        self.dx[5] = ((self.dl[5] >> 30) | 2) & !1;
        self.dx[6] = ((self.dl[6] >> 30) | 2) & !1;
        self.dx[7] = ((self.dl[7] >> 30) | 4) & !3;

        sum >> self.shift
    }

    /// Pushes the reconstructed sample into the history.
    fn update(&mut self, value: i32) {
        self.dl[4] = self.dl[5].wrapping_neg();
        self.dl[5] = self.dl[6].wrapping_neg();
        self.dl[6] = value.wrapping_sub(self.dl[7]);
        self.dl[7] = value;
        self.dl[5] = self.dl[5].wrapping_add(self.dl[6]);
        self.dl[4] = self.dl[4].wrapping_add(self.dl[5]);
    }

    /// Filters a sample and returns the residual.
    pub(crate) fn encode(&mut self, value: i32) -> i32 {
        let prediction = self.predict();
        self.update(value);
        let residual = value.wrapping_sub(prediction);
        self.error = residual;
        residual
    }

    /// Reconstructs a sample from its residual.
    #[cfg(any(feature = "decoder", test))]
    pub(crate) fn decode(&mut self, residual: i32) -> i32 {
        let prediction = self.predict();
        let value = residual.wrapping_add(prediction);
        self.update(value);
        self.error = residual;
        value
    }
}

/// Coding state of a single channel. Reset at the start of every frame.
#[derive(Clone, Debug)]
pub(crate) struct ChannelCodec {
    pub(crate) filter: HybridFilter,
    pub(crate) rice: RiceState,
    pub(crate) prev: i32,
}

impl ChannelCodec {
    pub(crate) fn new(shift: u32) -> Self {
        Self {
            filter: HybridFilter::new(shift),
            rice: RiceState::new(RICE_INITIAL_K, RICE_INITIAL_K),
            prev: 0,
        }
    }
}
