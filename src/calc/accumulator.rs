//! Running aggregate with an explicit finalize/reset lifecycle.

/// Sum of `N`-wide samples plus the number of samples taken.
#[derive(Clone, Debug, PartialEq)]
pub struct Accumulator<const N: usize> {
    sum: [f64; N],
    samples: u32,
}

impl<const N: usize> Default for Accumulator<N> {
    fn default() -> Self {
        Self {
            sum: [0.0; N],
            samples: 0,
        }
    }
}

impl<const N: usize> Accumulator<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: [f64; N]) {
        for (s, x) in self.sum.iter_mut().zip(sample) {
            *s += x;
        }
        self.samples += 1;
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Time-average over `count` samples and start a fresh window.
    ///
    /// `count` is the configured measurement count, not necessarily
    /// [`samples`](Self::samples).
    pub fn finalize(&mut self, count: u32) -> [f64; N] {
        debug_assert!(count > 0);
        let scale = 1.0 / f64::from(count);
        let out = self.sum.map(|s| s * scale);
        self.reset();
        out
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
