//! # Note Segmentation
//!
//! Turns a [`FrameStream`] into grid-quantized notes and rests.
//!
//! Segmentation starts with raw framing (runs of identical pitch become
//! [`RawNote`]s), then hands the note list through an ordered list of
//! [`NotePass`]es, and finally projects the survivors onto
//! `(measure, slot)` positions. Each pass takes the list by value and returns
//! a new one, so every pass can be tested on its own.
//!
//! Default pass order:
//! 1. [`FuzzyMergePass`] - rejoin notes fragmented by semitone jitter
//! 2. [`GapFillPass`] - tag ambiguous interior gaps as `excluded` notes
//! 3. [`SplitPass`] - split long notes at swallowed re-articulations
//! 4. [`QuantizePass`] - snap durations to standard values
//! 5. [`OverlapPass`] - restore the non-overlap invariant

mod framing;
mod gap_fill;
mod merge;
mod overlap;
mod projection;
mod quantize;
mod split;

pub use framing::frame_notes;
pub use gap_fill::GapFillPass;
pub use merge::FuzzyMergePass;
pub use overlap::OverlapPass;
pub use projection::project;
pub use quantize::{QuantizePass, quantize_slot_count};
pub use split::SplitPass;

use tracing::debug;

use crate::config::TunableParams;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, TranscriptionError};
use crate::tuning::Pitch;
use crate::{ConfidenceTier, FrameStream, QuantizedNote};

/// Tempo and meter of the slot grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotGrid {
    pub bpm: f64,
    pub beats_per_measure: u32,
    pub slots_per_measure: u32,
}

impl SlotGrid {
    pub fn new(bpm: f64, beats_per_measure: u32, slots_per_measure: u32) -> Result<Self> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(TranscriptionError::InvalidTempo(bpm));
        }
        if beats_per_measure == 0 || slots_per_measure == 0 {
            return Err(TranscriptionError::InvalidMeter {
                beats_per_measure,
                slots_per_measure,
            });
        }
        Ok(Self {
            bpm,
            beats_per_measure,
            slots_per_measure,
        })
    }

    /// Length of one slot: `(60 / bpm) × beats_per_measure / slots_per_measure`.
    pub fn slot_seconds(&self) -> f64 {
        (60.0 / self.bpm) * (self.beats_per_measure as f64 / self.slots_per_measure as f64)
    }

    /// Splits an absolute slot into `(measure_index, slot_index)`.
    pub fn position(&self, absolute_slot: u32) -> (u32, u32) {
        (
            absolute_slot / self.slots_per_measure,
            absolute_slot % self.slots_per_measure,
        )
    }
}

/// Intermediate note. Slots are absolute, counted from the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNote {
    /// `None` for rests.
    pub pitch: Option<Pitch>,
    pub start_slot: u32,
    pub slot_count: u32,
    pub tier: ConfidenceTier,
    /// Slots inside the note where a short silence was swallowed by rounding.
    pub articulations: Vec<u32>,
    /// For rests: the pitch most rejected frames in the run pointed at.
    pub guess: Option<Pitch>,
}

impl RawNote {
    pub fn note(pitch: Pitch, start_slot: u32, slot_count: u32, tier: ConfidenceTier) -> Self {
        Self {
            pitch: Some(pitch),
            start_slot,
            slot_count,
            tier,
            articulations: Vec::new(),
            guess: None,
        }
    }

    pub fn rest(start_slot: u32, slot_count: u32) -> Self {
        Self {
            pitch: None,
            start_slot,
            slot_count,
            tier: ConfidenceTier::High,
            articulations: Vec::new(),
            guess: None,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.pitch.is_none()
    }

    pub fn end_slot(&self) -> u32 {
        self.start_slot + self.slot_count
    }
}

/// Per-slot voiced share and per-frame levels, used to find dips inside notes.
#[derive(Debug, Clone, Default)]
pub struct SlotProfile {
    voiced: Vec<u32>,
    total: Vec<u32>,
    /// `(slot position, level)` for every frame that carries a level, in time order.
    levels: Vec<(f64, f32)>,
}

impl SlotProfile {
    /// Frames before the origin or past the end of the take are ignored.
    pub fn build(stream: &FrameStream, origin: f64, slot_seconds: f64) -> Self {
        let span = ((stream.duration_seconds - origin) / slot_seconds).ceil();
        let slot_limit = if span.is_finite() && span > 0.0 { span as usize + 1 } else { 0 };

        let mut profile = SlotProfile::default();
        for (index, frame) in stream.frames.iter().enumerate() {
            let position = (frame.time - origin) / slot_seconds;
            if !(position >= 0.0 && position < slot_limit as f64) {
                continue;
            }
            let slot = position.floor() as usize;
            if slot >= profile.total.len() {
                profile.total.resize(slot + 1, 0);
                profile.voiced.resize(slot + 1, 0);
            }
            profile.total[slot] += 1;
            if frame.is_voiced() {
                profile.voiced[slot] += 1;
            }
            if let Some(&level) = stream.levels.get(index) {
                profile.levels.push((position, level));
            }
        }
        profile
    }

    /// Fraction of voiced frames in a slot; slots without frames count as full.
    pub fn occupancy(&self, slot: u32) -> f32 {
        let slot = slot as usize;
        match self.total.get(slot) {
            Some(&total) if total > 0 => self.voiced[slot] as f32 / total as f32,
            _ => 1.0,
        }
    }

    /// Slot where the level inside `[start, end)` first drops under `dip` of
    /// its running peak, provided it later climbs back to `recover` of that
    /// peak. Dips that round onto the note's own boundaries are skipped.
    pub fn level_dip(&self, start: u32, end: u32, dip: f32, recover: f32) -> Option<u32> {
        let first = self.levels.partition_point(|&(p, _)| p < start as f64);
        let mut peak = 0.0_f32;
        let mut dip_at: Option<f64> = None;

        for &(position, level) in self.levels[first..].iter().take_while(|&&(p, _)| p < end as f64) {
            match dip_at {
                None if level < peak * dip => dip_at = Some(position),
                None => peak = peak.max(level),
                Some(at) if level >= peak * recover => {
                    let slot = at.round() as u32;
                    if slot > start && slot < end {
                        return Some(slot);
                    }
                    dip_at = None;
                    peak = level;
                }
                Some(_) => {}
            }
        }
        None
    }
}

/// Everything a pass may read besides the note list.
pub struct PassContext<'a> {
    pub params: &'a TunableParams,
    pub grid: SlotGrid,
    pub profile: &'a SlotProfile,
}

/// One correction step over the note list.
pub trait NotePass: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, notes: Vec<RawNote>, ctx: &PassContext<'_>, stats: &mut Diagnostics) -> Vec<RawNote>;
}

/// Runs framing, the pass list and projection.
pub struct NoteSegmenter {
    passes: Vec<Box<dyn NotePass>>,
}

impl Default for NoteSegmenter {
    fn default() -> Self {
        Self::with_passes(vec![
            Box::new(FuzzyMergePass),
            Box::new(GapFillPass),
            Box::new(SplitPass),
            Box::new(QuantizePass),
            Box::new(OverlapPass),
        ])
    }
}

impl NoteSegmenter {
    pub fn with_passes(passes: Vec<Box<dyn NotePass>>) -> Self {
        Self { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(
        &self,
        stream: &FrameStream,
        grid: &SlotGrid,
        origin_offset: f64,
        params: &TunableParams,
        diagnostics: &mut Diagnostics,
    ) -> Vec<QuantizedNote> {
        let slot_seconds = grid.slot_seconds();
        let profile = SlotProfile::build(stream, origin_offset, slot_seconds);
        let ctx = PassContext {
            params,
            grid: *grid,
            profile: &profile,
        };

        let mut notes = frame_notes(stream, origin_offset, grid, params);
        debug!(notes = notes.len(), "Raw framing");

        for pass in &self.passes {
            let before = notes.len();
            notes = pass.apply(notes, &ctx, diagnostics);
            debug!(pass = pass.name(), before, after = notes.len(), "Pass applied");
        }

        let empty_span = ((stream.duration_seconds - origin_offset) / slot_seconds)
            .round()
            .max(1.0) as u32;
        project(notes, grid, empty_span)
    }
}

/// Segments a frame stream onto a grid with the default pass list.
///
/// # Arguments
/// * `stream` - Filtered pitch frames for the whole take
/// * `bpm`, `beats_per_measure`, `slots_per_measure` - Grid definition
/// * `origin_offset` - Buffer time, in seconds, of slot 0
/// * `params` - Thresholds for every pass
pub fn segment(
    stream: &FrameStream,
    bpm: f64,
    beats_per_measure: u32,
    slots_per_measure: u32,
    origin_offset: f64,
    params: &TunableParams,
) -> Result<Vec<QuantizedNote>> {
    params.validate()?;
    let grid = SlotGrid::new(bpm, beats_per_measure, slots_per_measure)?;
    let mut diagnostics = Diagnostics::default();
    Ok(NoteSegmenter::default().run(stream, &grid, origin_offset, params, &mut diagnostics))
}
