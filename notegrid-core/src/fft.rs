//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-backed autocorrelation for the pitch detector. The NSDF numerator is
//! the linear (not circular) autocorrelation of one analysis window, which
//! is computed by zero-padding to at least twice the window length.

use rustfft::{FftPlanner, num_complex::Complex};

/// Computes linear autocorrelations, reusing FFT plans across calls.
pub struct Autocorrelator {
    planner: FftPlanner<f64>,
    buffer: Vec<Complex<f64>>,
}

impl Autocorrelator {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            buffer: Vec::new(),
        }
    }

    /// Writes `r[τ] = Σ x[i]·x[i+τ]` for `τ` in `0..signal.len()` into `out`.
    pub fn autocorrelate(&mut self, signal: &[f32], out: &mut Vec<f64>) {
        out.clear();
        let n = signal.len();
        if n == 0 {
            return;
        }

        let size = (2 * n).next_power_of_two();
        let forward = self.planner.plan_fft_forward(size);
        let inverse = self.planner.plan_fft_inverse(size);

        self.buffer.clear();
        self.buffer
            .extend(signal.iter().map(|&s| Complex { re: s as f64, im: 0.0 }));
        self.buffer.resize(size, Complex { re: 0.0, im: 0.0 });

        forward.process(&mut self.buffer);
        for bin in self.buffer.iter_mut() {
            *bin = Complex { re: bin.norm_sqr(), im: 0.0 };
        }
        inverse.process(&mut self.buffer);

        // rustfft leaves the inverse unnormalized.
        let scale = 1.0 / size as f64;
        out.extend(self.buffer.iter().take(n).map(|c| c.re * scale));
    }
}

impl Default for Autocorrelator {
    fn default() -> Self {
        Self::new()
    }
}
