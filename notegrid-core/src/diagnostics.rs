//! Observational counters collected during one transcription call.
//! Nothing in the engine branches on these; they feed calibration tooling.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub frames_total: usize,
    /// Frames rejected by the RMS gate before the NSDF ran.
    pub frames_rms_gated: usize,
    /// Frames that produced a pitch but fell outside the band or floor.
    pub frames_filtered: usize,
    pub onset_seconds: f64,
    pub origin_offset: f64,
    pub notes_merged: usize,
    pub notes_split: usize,
    pub gaps_filled: usize,
    pub notes_quantized: usize,
    pub notes_overlap_corrected: usize,
}

impl Diagnostics {
    /// Adds another call's counters, for batch summaries.
    pub fn accumulate(&mut self, other: &Diagnostics) {
        self.frames_total += other.frames_total;
        self.frames_rms_gated += other.frames_rms_gated;
        self.frames_filtered += other.frames_filtered;
        self.notes_merged += other.notes_merged;
        self.notes_split += other.notes_split;
        self.gaps_filled += other.gaps_filled;
        self.notes_quantized += other.notes_quantized;
        self.notes_overlap_corrected += other.notes_overlap_corrected;
    }
}
