//! # Latency Calibration
//!
//! Derives the pull-back constant from measurement instead of guesswork.
//!
//! ## Procedure
//! 1. Play clicks at known transport times through the same capture path
//!    used for takes (a loopback cable or the room microphone).
//! 2. Find every onset in the capture with [`OnsetAligner::find_onsets`].
//! 3. Pair each expected click with the first onset at or after it.
//! 4. Fit `detected = slope × expected + intercept` by least squares.
//!
//! The intercept is the capture latency and becomes `pull_back_ms` for
//! [`AnchorMode::BufferStart`] anchoring. A slope away from 1 means the
//! capture clock drifts against the transport.

use std::path::Path;

use linreg::linear_regression;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AnchorMode, TunableParams};
use crate::error::Result;
use crate::json::{load_json, save_json};
use crate::onset::OnsetAligner;

/// Longest latency a click may show and still be paired.
pub const MAX_LATENCY_SECONDS: f64 = 0.5;
/// How early an onset may appear relative to its click (detector jitter).
const EARLY_SLACK_SECONDS: f64 = 0.02;
/// Refractory gap between detected clicks.
const MIN_CLICK_GAP_SECONDS: f64 = 0.05;

/// One expected click and where it showed up in the capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyMeasurement {
    pub expected_seconds: f64,
    pub detected_seconds: f64,
}

impl LatencyMeasurement {
    pub fn latency(&self) -> f64 {
        self.detected_seconds - self.expected_seconds
    }
}

/// Measurements for one capture setup and the line fitted through them.
/// This is what gets saved to and loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub measurements: Vec<LatencyMeasurement>,
    pub latency_seconds: Option<f64>,
    pub drift: Option<f64>,
}

/// Pairs each expected time with the first unused onset in
/// `[expected - slack, expected + MAX_LATENCY_SECONDS]`.
pub fn pair_onsets(expected: &[f64], detected: &[f64]) -> Vec<LatencyMeasurement> {
    let mut next = 0;
    let mut pairs = Vec::new();
    for &time in expected {
        while next < detected.len() && detected[next] < time - EARLY_SLACK_SECONDS {
            next += 1;
        }
        if next < detected.len() && detected[next] <= time + MAX_LATENCY_SECONDS {
            pairs.push(LatencyMeasurement {
                expected_seconds: time,
                detected_seconds: detected[next],
            });
            next += 1;
        }
    }
    pairs
}

impl LatencyProfile {
    pub fn from_measurements(measurements: Vec<LatencyMeasurement>) -> Self {
        let mut profile = Self {
            measurements,
            ..Default::default()
        };
        profile.fit();
        profile
    }

    /// Measures a capture of clicks played at `expected` transport times.
    pub fn from_capture(buffer: &[f32], sample_rate: u32, expected: &[f64], params: &TunableParams) -> Self {
        let onsets =
            OnsetAligner::from_params(params, sample_rate).find_onsets(buffer, sample_rate, MIN_CLICK_GAP_SECONDS);
        let measurements = pair_onsets(expected, &onsets);
        if measurements.len() < expected.len() {
            warn!(
                expected = expected.len(),
                paired = measurements.len(),
                "Some clicks were not found in the capture"
            );
        }
        Self::from_measurements(measurements)
    }

    /// Fits the latency line; needs at least 3 measurements.
    pub fn fit(&mut self) -> Option<f64> {
        self.latency_seconds = None;
        self.drift = None;
        if self.measurements.len() < 3 {
            return None;
        }

        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .measurements
            .iter()
            .map(|m| (m.expected_seconds, m.detected_seconds))
            .unzip();

        if let Ok((slope, intercept)) = linear_regression::<_, _, f64>(&xs, &ys) {
            self.latency_seconds = Some(intercept);
            self.drift = Some(slope - 1.0);
            info!(latency_ms = intercept * 1000.0, slope, "Fitted capture latency");
        }
        self.latency_seconds
    }

    pub fn suggested_pull_back_ms(&self) -> Option<f64> {
        self.latency_seconds.map(|latency| latency * 1000.0)
    }

    /// Returns `params` set up to anchor at buffer start shifted by the
    /// measured latency.
    pub fn apply(&self, params: &TunableParams) -> Option<TunableParams> {
        self.suggested_pull_back_ms().map(|pull_back_ms| TunableParams {
            anchor: AnchorMode::BufferStart,
            pull_back_ms,
            ..params.clone()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

/// A click track: short decaying bursts at each of `times`.
pub fn click_track(times: &[f64], sample_rate: u32, duration_seconds: f64) -> Vec<f32> {
    let len = (duration_seconds * sample_rate as f64).round() as usize;
    let click_len = (sample_rate / 100) as usize;
    let mut buffer = vec![0.0f32; len];
    for &time in times {
        let start = (time * sample_rate as f64).round() as usize;
        for (i, sample) in buffer.iter_mut().skip(start).take(click_len).enumerate() {
            let decay = 1.0 - i as f32 / click_len as f32;
            *sample = if i % 2 == 0 { 0.8 * decay } else { -0.8 * decay };
        }
    }
    buffer
}
