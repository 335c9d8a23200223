//! # Pitch Detection Module
//!
//! Per-frame fundamental frequency estimation with the McLeod Pitch Method
//! (MPM), and the sliding-window driver that turns a whole recording into a
//! [`FrameStream`].
//!
//! ## Algorithm
//! 1. RMS gate: quiet frames short-circuit to `(0, 0)`, and so do frames
//!    whose halves differ too much in level. Those straddle a note boundary,
//!    and their centre time would misplace the onset or the release.
//! 2. Normalized Square Difference Function over every lag of the window.
//!    The cross term comes from an FFT autocorrelation, the energy term is
//!    updated incrementally per lag.
//! 3. Key maxima inside positive lobes; the first one reaching
//!    `cutoff × highest` wins, which keeps the lowest plausible fundamental.
//! 4. Parabolic interpolation around the chosen lag.
//!
//! Detection never fails: every degenerate case yields silence or an
//! unrefined lag.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TunableParams;
use crate::fft::Autocorrelator;
use crate::{FrameStream, PitchFrame};

/// Smallest interpolation denominator considered numerically significant.
const INTERPOLATION_EPSILON: f64 = 1e-4;

/// Raw detector output for one window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Hz, `0.0` when no pitch was found.
    pub frequency: f32,
    /// NSDF value at the chosen peak, `[0, 1]`.
    pub confidence: f32,
}

impl PitchEstimate {
    pub const SILENT: PitchEstimate = PitchEstimate {
        frequency: 0.0,
        confidence: 0.0,
    };

    pub fn is_voiced(&self) -> bool {
        self.frequency > 0.0
    }
}

enum Detection {
    Gated,
    Estimate(PitchEstimate),
}

/// Root-mean-square amplitude of a signal.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Whether an estimate survives the frequency band and confidence floor.
pub fn accepts(estimate: &PitchEstimate, params: &TunableParams) -> bool {
    estimate.is_voiced()
        && estimate.frequency >= params.min_frequency
        && estimate.frequency <= params.max_frequency
        && estimate.confidence > params.confidence_floor
}

/// MPM detector holding scratch buffers so consecutive frames don't reallocate.
pub struct PitchDetector {
    autocorrelator: Autocorrelator,
    acf: Vec<f64>,
    nsdf: Vec<f64>,
    peaks: Vec<usize>,
    cutoff: f64,
    rms_threshold: f32,
    min_balance: f32,
}

impl PitchDetector {
    pub fn new(params: &TunableParams) -> Self {
        Self {
            autocorrelator: Autocorrelator::new(),
            acf: Vec::new(),
            nsdf: Vec::new(),
            peaks: Vec::new(),
            cutoff: params.peak_cutoff as f64,
            rms_threshold: params.rms_silence_threshold,
            min_balance: params.min_window_balance,
        }
    }

    /// Estimates the fundamental of one window.
    ///
    /// # Arguments
    /// * `frame` - Samples of one analysis window
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// * `PitchEstimate` - `(0, 0)` for silence or when no peak exists
    pub fn detect(&mut self, frame: &[f32], sample_rate: u32) -> PitchEstimate {
        match self.analyze(frame, sample_rate) {
            Detection::Gated => PitchEstimate::SILENT,
            Detection::Estimate(estimate) => estimate,
        }
    }

    fn analyze(&mut self, frame: &[f32], sample_rate: u32) -> Detection {
        if rms(frame) < self.rms_threshold {
            return Detection::Gated;
        }
        if frame.len() < 3 {
            return Detection::Estimate(PitchEstimate::SILENT);
        }
        if !self.is_balanced(frame) {
            return Detection::Gated;
        }

        self.compute_nsdf(frame);
        self.collect_peaks();

        let Some(max_value) = self
            .peaks
            .iter()
            .map(|&tau| self.nsdf[tau])
            .max_by(|a, b| a.total_cmp(b))
        else {
            return Detection::Estimate(PitchEstimate::SILENT);
        };

        let threshold = max_value * self.cutoff;
        let Some(&tau) = self.peaks.iter().find(|&&tau| self.nsdf[tau] >= threshold) else {
            return Detection::Estimate(PitchEstimate::SILENT);
        };

        let refined = self.interpolate(tau);
        let frequency = sample_rate as f64 / refined;
        if !frequency.is_finite() || frequency <= 0.0 {
            return Detection::Estimate(PitchEstimate::SILENT);
        }

        Detection::Estimate(PitchEstimate {
            frequency: frequency as f32,
            confidence: self.nsdf[tau].clamp(0.0, 1.0) as f32,
        })
    }

    fn is_balanced(&self, frame: &[f32]) -> bool {
        let (head, tail) = frame.split_at(frame.len() / 2);
        let (a, b) = (rms(head), rms(tail));
        a.min(b) >= a.max(b) * self.min_balance
    }

    /// `nsdf(τ) = 2·r(τ) / m(τ)` with `m(τ) = Σ x[i]² + x[i+τ]²` over the overlap.
    fn compute_nsdf(&mut self, frame: &[f32]) {
        let n = frame.len();
        self.autocorrelator.autocorrelate(frame, &mut self.acf);

        self.nsdf.clear();
        let mut m = 2.0 * self.acf[0];
        for tau in 0..n {
            let value = if m > f64::EPSILON {
                2.0 * self.acf[tau] / m
            } else {
                0.0
            };
            self.nsdf.push(value);

            let head = frame[tau] as f64;
            let tail = frame[n - 1 - tau] as f64;
            m -= head * head + tail * tail;
        }
    }

    /// Local maxima inside positive lobes, starting after the first
    /// negative-to-positive crossing (which skips the lobe around lag 0).
    fn collect_peaks(&mut self) {
        self.peaks.clear();
        let nsdf = &self.nsdf;
        let mut past_first_lobe = false;

        for tau in 1..nsdf.len() - 1 {
            let (prev, cur, next) = (nsdf[tau - 1], nsdf[tau], nsdf[tau + 1]);
            if prev < 0.0 && cur >= 0.0 {
                past_first_lobe = true;
            }
            if past_first_lobe && cur > 0.0 && cur > prev && cur > next {
                self.peaks.push(tau);
            }
        }
    }

    fn interpolate(&self, tau: usize) -> f64 {
        let s0 = self.nsdf[tau - 1];
        let s1 = self.nsdf[tau];
        let s2 = self.nsdf[tau + 1];

        let denominator = 2.0 * s1 - s2 - s0;
        if denominator.abs() > INTERPOLATION_EPSILON {
            let adjustment = (s2 - s0) / (2.0 * denominator);
            if adjustment.abs() < 1.0 {
                return tau as f64 + adjustment;
            }
        }
        tau as f64
    }
}

/// Convenience wrapper for one-off detection.
pub fn detect(frame: &[f32], sample_rate: u32, params: &TunableParams) -> PitchEstimate {
    PitchDetector::new(params).detect(frame, sample_rate)
}

/// Runs the detector over the whole buffer with the configured frame and hop.
///
/// Frame and hop are durations, so a take is cut into the same number of
/// frames at any sample rate. Windows start at `0, hop, 2·hop, …` while a
/// full window fits. Each frame's time is the centre of its window. Frames
/// outside the frequency band or under the confidence floor are stored as
/// silence; their raw estimates are kept alongside, as is the RMS of a short
/// window around each frame's centre.
pub fn frame_stream(buffer: &[f32], sample_rate: u32, params: &TunableParams) -> FrameStream {
    let mut detector = PitchDetector::new(params);
    let frame_size = params.frame_samples(sample_rate);
    let hop_size = params.hop_samples(sample_rate);
    let half_level = params.level_window_samples(sample_rate) / 2;
    let rate = sample_rate as f64;

    let mut frames = Vec::new();
    let mut raw = Vec::new();
    let mut levels = Vec::new();
    let mut gated_frames = 0;

    let mut start = 0;
    while start + frame_size <= buffer.len() {
        let window = &buffer[start..start + frame_size];
        let estimate = match detector.analyze(window, sample_rate) {
            Detection::Gated => {
                gated_frames += 1;
                PitchEstimate::SILENT
            }
            Detection::Estimate(estimate) => estimate,
        };
        let accepted = if accepts(&estimate, params) {
            estimate
        } else {
            PitchEstimate::SILENT
        };

        let centre = start + frame_size / 2;
        let level_end = (centre + half_level).min(buffer.len());
        let level_window = &buffer[centre.saturating_sub(half_level)..level_end];
        frames.push(PitchFrame {
            time: centre as f64 / rate,
            frequency: accepted.frequency,
            confidence: accepted.confidence,
        });
        raw.push(estimate);
        levels.push(rms(level_window));
        start += hop_size;
    }

    debug!(
        frames = frames.len(),
        gated_frames,
        voiced = frames.iter().filter(|f| f.is_voiced()).count(),
        "Built frame stream"
    );

    FrameStream {
        hop_seconds: hop_size as f64 / rate,
        duration_seconds: buffer.len() as f64 / rate,
        frames,
        raw,
        levels,
        gated_frames,
    }
}
