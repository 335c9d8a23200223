//! # Tunable Parameters
//!
//! Every threshold the transcription engine uses lives in [`TunableParams`].
//! A parameter set is an immutable value passed by reference into each call,
//! so concurrent calls with different sets never interfere.
//!
//! Parameter files are JSON. Fields missing from a file fall back to their
//! defaults, so an experiment file only needs to name what it changes:
//!
//! ```json
//! { "confidence_floor": 0.3, "anchor": "first_onset" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscriptionError};
use crate::json::{load_json, save_json};

/// How the onset found by the aligner is turned into the segmenter's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// The first onset fixes the grid phase. Whole slots of leading silence
    /// stay in the take and come out as a rest.
    #[default]
    GridPhase,
    /// The first onset lands on slot 0.
    FirstOnset,
    /// Sample 0 is slot 0; only the pull-back constant shifts the grid.
    BufferStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunableParams {
    /// Frames with RMS below this never reach the NSDF.
    pub rms_silence_threshold: f32,
    /// Detector window length in milliseconds, converted to samples per take.
    pub frame_ms: f64,
    /// Distance between consecutive detector windows in milliseconds.
    pub hop_ms: f64,
    /// Windows whose quieter half has less than this share of the louder
    /// half's RMS are only partly filled with sound and are gated.
    pub min_window_balance: f32,
    /// Span of the short RMS window centred on each frame, in milliseconds.
    pub level_window_ms: f64,
    /// Fraction of the highest NSDF peak the first accepted peak must reach.
    pub peak_cutoff: f32,
    /// Grid slots per beat; 4 gives sixteenth-note slots.
    pub slots_per_beat: u32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// A frame is voiced only when its confidence is strictly above this.
    pub confidence_floor: f32,
    /// Notes whose every frame reaches this are tagged `high`.
    pub high_confidence_floor: f32,
    pub max_merge_slots: u32,
    pub standard_durations: Vec<u32>,
    pub short_note_max_slots: u32,
    pub short_note_target_slots: u32,
    pub standard_tolerance_slots: u32,
    pub short_tolerance_slots: u32,
    pub min_split_slots: u32,
    /// Interior slots with a voiced share below this count as an energy dip.
    pub split_dip_occupancy: f32,
    /// A frame level under this share of the note's running peak starts a
    /// volume dip.
    pub split_dip_level: f32,
    /// Share of the running peak the level must climb back to after a dip
    /// before the note is re-struck there.
    pub split_recover_level: f32,
    /// Share of rejected-but-pitched frames a silent run needs before a pitch
    /// is guessed for it.
    pub gap_voiced_ratio: f32,
    pub max_gap_fill_slots: u32,
    pub max_gap_interval: u32,
    /// Onset threshold in dB relative to full scale.
    pub onset_threshold_db: f32,
    /// Onset scan window in milliseconds.
    pub onset_window_ms: f64,
    pub anchor: AnchorMode,
    /// Signed latency constant added to the anchored origin, in milliseconds.
    pub pull_back_ms: f64,
}

impl Default for TunableParams {
    fn default() -> Self {
        Self {
            rms_silence_threshold: 0.005,
            frame_ms: 90.0,
            hop_ms: 10.0,
            min_window_balance: 0.5,
            level_window_ms: 25.0,
            peak_cutoff: 0.5,
            slots_per_beat: 4,
            min_frequency: 80.0,
            max_frequency: 2000.0,
            confidence_floor: 0.2,
            high_confidence_floor: 0.8,
            max_merge_slots: 6,
            standard_durations: vec![3, 4, 6, 8, 12, 16],
            short_note_max_slots: 2,
            short_note_target_slots: 4,
            standard_tolerance_slots: 2,
            short_tolerance_slots: 3,
            min_split_slots: 4,
            split_dip_occupancy: 0.4,
            split_dip_level: 0.4,
            split_recover_level: 0.7,
            gap_voiced_ratio: 0.5,
            max_gap_fill_slots: 3,
            max_gap_interval: 7,
            onset_threshold_db: -35.0,
            onset_window_ms: 10.0,
            anchor: AnchorMode::GridPhase,
            pull_back_ms: 0.0,
        }
    }
}

impl TunableParams {
    /// Rejects parameter sets the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(TranscriptionError::InvalidParams(msg));

        if !(self.hop_ms > 0.0 && self.hop_ms <= self.frame_ms) {
            return fail(format!(
                "hop_ms must be in (0, {}], got {}",
                self.frame_ms, self.hop_ms
            ));
        }
        if !(self.level_window_ms > 0.0 && self.onset_window_ms > 0.0) {
            return fail("level_window_ms and onset_window_ms must be positive".into());
        }
        if !(self.peak_cutoff > 0.0 && self.peak_cutoff <= 1.0) {
            return fail(format!("peak_cutoff must be in (0, 1], got {}", self.peak_cutoff));
        }
        if self.slots_per_beat == 0 {
            return fail("slots_per_beat must be positive".into());
        }
        if !(self.min_frequency > 0.0 && self.min_frequency < self.max_frequency) {
            return fail(format!(
                "frequency band [{}, {}] is empty",
                self.min_frequency, self.max_frequency
            ));
        }
        if self.frame_ms * self.min_frequency as f64 / 1000.0 < 2.0 {
            return fail(format!(
                "frame_ms {} cannot hold two periods of {} Hz",
                self.frame_ms, self.min_frequency
            ));
        }
        for (name, value) in [
            ("rms_silence_threshold", self.rms_silence_threshold),
            ("confidence_floor", self.confidence_floor),
            ("high_confidence_floor", self.high_confidence_floor),
            ("min_window_balance", self.min_window_balance),
            ("split_dip_occupancy", self.split_dip_occupancy),
            ("split_dip_level", self.split_dip_level),
            ("split_recover_level", self.split_recover_level),
            ("gap_voiced_ratio", self.gap_voiced_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} must be in [0, 1], got {value}"));
            }
        }
        if self.confidence_floor > self.high_confidence_floor {
            return fail("confidence_floor is above high_confidence_floor".into());
        }
        if self.split_dip_level > self.split_recover_level {
            return fail("split_dip_level is above split_recover_level".into());
        }
        if self.max_merge_slots == 0 {
            return fail("max_merge_slots must be positive".into());
        }
        if self.standard_durations.is_empty() || self.standard_durations.contains(&0) {
            return fail("standard_durations must be non-empty and positive".into());
        }
        if !self.standard_durations.contains(&self.short_note_target_slots) {
            return fail(format!(
                "short_note_target_slots {} is not a standard duration",
                self.short_note_target_slots
            ));
        }
        if !self.onset_threshold_db.is_finite() || !self.pull_back_ms.is_finite() {
            return fail("onset_threshold_db and pull_back_ms must be finite".into());
        }
        Ok(())
    }

    /// Detector window length in samples at `sample_rate`.
    pub fn frame_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.frame_ms, sample_rate)
    }

    pub fn hop_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.hop_ms, sample_rate).max(1)
    }

    pub fn level_window_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.level_window_ms, sample_rate).max(1)
    }

    pub fn onset_window_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.onset_window_ms, sample_rate).max(1)
    }

    /// Loads and validates a parameter file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let params: TunableParams = load_json(path.as_ref())?;
        params.validate()?;
        Ok(params)
    }

    /// Saves the full parameter set as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }
}

fn ms_to_samples(ms: f64, sample_rate: u32) -> usize {
    (ms * sample_rate as f64 / 1000.0).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TunableParams::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let params: TunableParams =
            serde_json::from_str(r#"{ "confidence_floor": 0.3, "anchor": "first_onset" }"#).unwrap();
        assert_eq!(params.confidence_floor, 0.3);
        assert_eq!(params.anchor, AnchorMode::FirstOnset);
        assert_eq!(params.frame_ms, 90.0);
        assert_eq!(params.standard_durations, vec![3, 4, 6, 8, 12, 16]);
    }

    #[test]
    fn test_validate_rejects_bad_hop() {
        let params = TunableParams { hop_ms: 120.0, ..Default::default() };
        assert!(matches!(params.validate(), Err(TranscriptionError::InvalidParams(_))));
    }

    #[test]
    fn test_validate_rejects_window_too_short_for_band() {
        // 20 ms holds only 1.6 periods of 80 Hz.
        let params = TunableParams { frame_ms: 20.0, hop_ms: 5.0, ..Default::default() };
        assert!(params.validate().is_err());
        let raised = TunableParams { min_frequency: 100.0, ..params };
        assert!(raised.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_split_levels() {
        let params = TunableParams {
            split_dip_level: 0.8,
            split_recover_level: 0.6,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_windows_keep_their_duration_across_rates() {
        let params = TunableParams::default();
        assert_eq!((params.frame_samples(8_000), params.hop_samples(8_000)), (720, 80));
        assert_eq!((params.frame_samples(44_100), params.hop_samples(44_100)), (3969, 441));
        assert_eq!((params.frame_samples(48_000), params.hop_samples(48_000)), (4320, 480));
        assert_eq!(params.level_window_samples(16_000), 400);
        assert_eq!(params.onset_window_samples(44_100), 441);
    }

    #[test]
    fn test_validate_rejects_inverted_band() {
        let params = TunableParams {
            min_frequency: 2000.0,
            max_frequency: 80.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_requires_standard_short_target() {
        let params = TunableParams { short_note_target_slots: 5, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let params = TunableParams {
            pull_back_ms: 120.0,
            anchor: AnchorMode::BufferStart,
            ..Default::default()
        };
        params.save(&path).unwrap();
        assert_eq!(TunableParams::load(&path).unwrap(), params);
    }
}
