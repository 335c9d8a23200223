//! # Snapshots
//!
//! Flat JSON records of a take's frame stream and of a transcription,
//! used by the regression harness to pin inputs and expected outputs.
//! A frame snapshot can be re-segmented later without the audio.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TunableParams;
use crate::error::Result;
use crate::json::{load_json, save_json};
use crate::pipeline::{Transcription, grid_for, transcribe_frames};
use crate::{FrameStream, QuantizedNote};

/// Detector output for one take, plus what is needed to replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub sample_rate: u32,
    /// Onset found by the aligner when the snapshot was taken.
    pub onset_seconds: f64,
    #[serde(flatten)]
    pub stream: FrameStream,
}

/// A transcription with the grid it was made on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSnapshot {
    pub bpm: f64,
    pub beats_per_measure: u32,
    pub slots_per_measure: u32,
    pub start_measure: u32,
    pub notes: Vec<QuantizedNote>,
}

impl FrameSnapshot {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

impl TranscriptionSnapshot {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

/// Re-runs segmentation over a stored frame stream.
pub fn segment_snapshot(
    snapshot: &FrameSnapshot,
    bpm: f64,
    beats_per_measure: u32,
    start_measure: u32,
    params: &TunableParams,
) -> Result<Transcription> {
    params.validate()?;
    let grid = grid_for(bpm, beats_per_measure, params)?;
    Ok(transcribe_frames(
        &snapshot.stream,
        snapshot.onset_seconds,
        &grid,
        start_measure,
        params,
    ))
}
