//! # Onset Alignment
//!
//! Finds where sound starts in a take and turns that into the time origin
//! the segmenter measures slots from.
//!
//! Energy is measured as window RMS against a dBFS threshold. The first
//! window above threshold is the onset; the configured [`AnchorMode`] and
//! pull-back constant turn it into the effective origin.

use crate::config::{AnchorMode, TunableParams};
use crate::pitch::rms;

/// Converts a level in dB relative to full scale to linear amplitude.
pub fn db_to_amplitude(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Scans a buffer for energy onsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetAligner {
    threshold: f32,
    window: usize,
}

impl OnsetAligner {
    pub fn new(threshold_db: f32, window: usize) -> Self {
        Self {
            threshold: db_to_amplitude(threshold_db),
            window: window.max(1),
        }
    }

    /// Aligner for one take; the scan window is `onset_window_ms` at `sample_rate`.
    pub fn from_params(params: &TunableParams, sample_rate: u32) -> Self {
        Self::new(params.onset_threshold_db, params.onset_window_samples(sample_rate))
    }

    /// Start time of the first window whose RMS exceeds the threshold.
    ///
    /// # Returns
    /// * Offset in seconds, or `0.0` when nothing in the buffer is loud enough
    pub fn align_origin(&self, buffer: &[f32], sample_rate: u32) -> f64 {
        buffer
            .chunks(self.window)
            .position(|chunk| rms(chunk) > self.threshold)
            .map(|index| (index * self.window) as f64 / sample_rate as f64)
            .unwrap_or(0.0)
    }

    /// Every rising threshold crossing, at least `min_gap_seconds` apart.
    ///
    /// Used by latency calibration, where the capture holds a train of clicks.
    pub fn find_onsets(&self, buffer: &[f32], sample_rate: u32, min_gap_seconds: f64) -> Vec<f64> {
        let mut onsets: Vec<f64> = Vec::new();
        let mut above = false;

        for (index, chunk) in buffer.chunks(self.window).enumerate() {
            let loud = rms(chunk) > self.threshold;
            if loud && !above {
                let time = (index * self.window) as f64 / sample_rate as f64;
                let clear = onsets
                    .last()
                    .is_none_or(|&last| time - last >= min_gap_seconds);
                if clear {
                    onsets.push(time);
                }
            }
            above = loud;
        }
        onsets
    }
}

/// Free-function form of [`OnsetAligner::align_origin`] with the default window.
pub fn align_origin(buffer: &[f32], sample_rate: u32, threshold_db: f32) -> f64 {
    let window = TunableParams::default().onset_window_samples(sample_rate);
    OnsetAligner::new(threshold_db, window).align_origin(buffer, sample_rate)
}

/// Effective origin for the segmenter: the anchored onset plus pull-back.
pub fn anchor_origin(onset_seconds: f64, slot_seconds: f64, params: &TunableParams) -> f64 {
    let anchored = match params.anchor {
        AnchorMode::GridPhase => {
            onset_seconds - (onset_seconds / slot_seconds).round() * slot_seconds
        }
        AnchorMode::FirstOnset => onset_seconds,
        AnchorMode::BufferStart => 0.0,
    };
    anchored + params.pull_back_ms / 1000.0
}
