// notegrid-core/src/lib.rs

//! The core logic for the notegrid transcriber.
//! This crate turns a captured monophonic recording into a sequence of
//! notes and rests quantized to a measure/slot grid. It is completely
//! headless: callers hand in decoded samples and get notes back.
//!
//! The flow is [`pitch`] (MPM frames) → [`onset`] (origin) →
//! [`segment`] (ordered correction passes) → [`pipeline::transcribe`].

pub mod audio;
pub mod batch;
pub mod calibration;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fft;
mod json;
pub mod onset;
pub mod pipeline;
pub mod pitch;
pub mod segment;
pub mod snapshot;
pub mod tuning;

use serde::{Deserialize, Serialize};

pub use config::{AnchorMode, TunableParams};
pub use diagnostics::Diagnostics;
pub use error::{Result, TranscriptionError};
pub use pipeline::{Transcription, transcribe, transcribe_with_diagnostics};
pub use pitch::PitchEstimate;
pub use tuning::Pitch;

/// One detector output, after band and confidence filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchFrame {
    /// Seconds since buffer start, at the centre of the analysis window.
    pub time: f64,
    /// Hz; `0.0` means silence or no usable pitch.
    pub frequency: f32,
    pub confidence: f32,
}

impl PitchFrame {
    pub fn is_voiced(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Pitch frames for a whole recording, in strictly increasing time order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameStream {
    pub hop_seconds: f64,
    pub duration_seconds: f64,
    pub frames: Vec<PitchFrame>,
    /// Detector output before filtering, one per frame. Empty when the
    /// stream was built from frames alone.
    #[serde(default)]
    pub raw: Vec<PitchEstimate>,
    /// RMS of a short window around each frame's centre. Empty when the
    /// stream was built from frames alone.
    #[serde(default)]
    pub levels: Vec<f32>,
    /// Frames gated before the NSDF ran: too quiet, or only partly filled.
    #[serde(default)]
    pub gated_frames: usize,
}

impl FrameStream {
    /// Wraps already-filtered frames, e.g. from a snapshot or a test.
    pub fn from_frames(frames: Vec<PitchFrame>, hop_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            hop_seconds,
            duration_seconds,
            frames,
            raw: Vec::new(),
            levels: Vec::new(),
            gated_frames: 0,
        }
    }

    /// Raw detector output for frame `index`, falling back to the filtered frame.
    pub fn raw_estimate(&self, index: usize) -> PitchEstimate {
        self.raw.get(index).copied().unwrap_or_else(|| {
            let frame = self.frames[index];
            PitchEstimate {
                frequency: frame.frequency,
                confidence: frame.confidence,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// How much a note can be trusted; ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    /// Guessed into an ambiguous gap; needs human confirmation.
    Excluded,
    Medium,
    High,
}

/// Written note value for a slot count (sixteenth-note slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    pub fn from_slots(slot_count: u32) -> Self {
        match slot_count {
            16.. => NoteValue::Whole,
            8..=15 => NoteValue::Half,
            4..=7 => NoteValue::Quarter,
            2..=3 => NoteValue::Eighth,
            _ => NoteValue::Sixteenth,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NoteValue::Whole => "w",
            NoteValue::Half => "h",
            NoteValue::Quarter => "q",
            NoteValue::Eighth => "8",
            NoteValue::Sixteenth => "16",
        }
    }
}

/// A note or rest placed on the measure/slot grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedNote {
    /// `None` for rests.
    pub pitch: Option<Pitch>,
    pub measure_index: u32,
    /// Position inside the measure, `0..slots_per_measure`.
    pub slot_index: u32,
    pub slot_count: u32,
    pub is_rest: bool,
    pub confidence: ConfidenceTier,
}

impl QuantizedNote {
    pub fn absolute_slot(&self, slots_per_measure: u32) -> u32 {
        self.measure_index * slots_per_measure + self.slot_index
    }

    pub fn end_slot(&self, slots_per_measure: u32) -> u32 {
        self.absolute_slot(slots_per_measure) + self.slot_count
    }

    pub fn note_value(&self) -> NoteValue {
        NoteValue::from_slots(self.slot_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        assert!(ConfidenceTier::Excluded < ConfidenceTier::Medium);
        assert!(ConfidenceTier::Medium < ConfidenceTier::High);
        assert_eq!(
            serde_json::to_string(&ConfidenceTier::Excluded).unwrap(),
            "\"excluded\""
        );
    }

    #[test]
    fn test_note_values() {
        assert_eq!(NoteValue::from_slots(16).label(), "w");
        assert_eq!(NoteValue::from_slots(12).label(), "h");
        assert_eq!(NoteValue::from_slots(6).label(), "q");
        assert_eq!(NoteValue::from_slots(3).label(), "8");
        assert_eq!(NoteValue::from_slots(1).label(), "16");
    }

    #[test]
    fn test_raw_estimate_falls_back_to_frame() {
        let stream = FrameStream::from_frames(
            vec![PitchFrame { time: 0.0, frequency: 220.0, confidence: 0.9 }],
            0.01,
            0.1,
        );
        assert_eq!(stream.raw_estimate(0).frequency, 220.0);
    }
}
