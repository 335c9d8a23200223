//! Raw framing: runs of frames with the same discrete pitch become notes.

use crate::config::TunableParams;
use crate::tuning::Pitch;
use crate::{ConfidenceTier, FrameStream};

use super::{RawNote, SlotGrid};

/// A maximal run of consecutive frames sharing one discrete pitch (or silence).
struct Run {
    pitch: Option<Pitch>,
    first: usize,
    last: usize,
    min_confidence: f32,
}

fn runs(stream: &FrameStream) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (index, frame) in stream.frames.iter().enumerate() {
        let pitch = Pitch::from_frequency(frame.frequency);
        match runs.last_mut() {
            Some(run) if run.pitch == pitch => {
                run.last = index;
                run.min_confidence = run.min_confidence.min(frame.confidence);
            }
            _ => runs.push(Run {
                pitch,
                first: index,
                last: index,
                min_confidence: frame.confidence,
            }),
        }
    }
    runs
}

/// Median raw pitch of a silent run, if enough of its frames were pitched
/// before filtering rejected them.
fn gap_guess(stream: &FrameStream, run: &Run, params: &TunableParams) -> Option<Pitch> {
    let total = run.last - run.first + 1;
    let mut midis: Vec<u8> = (run.first..=run.last)
        .filter_map(|index| Pitch::from_frequency(stream.raw_estimate(index).frequency))
        .map(Pitch::midi)
        .collect();

    if midis.is_empty() || (midis.len() as f32) < params.gap_voiced_ratio * total as f32 {
        return None;
    }
    midis.sort_unstable();
    Pitch::from_midi(midis[midis.len() / 2])
}

/// Groups frames into raw notes on the slot grid.
///
/// A run covering `[t_first, t_last + hop)` maps to slots
/// `[round((t_first - origin) / slot), round((t_last + hop - origin) / slot))`,
/// clamped to the slots the take spans. Runs rounding to zero slots are dropped; when a
/// dropped silent run separated two runs of one pitch, they join and the
/// boundary is kept as an articulation point.
pub fn frame_notes(
    stream: &FrameStream,
    origin: f64,
    grid: &SlotGrid,
    params: &TunableParams,
) -> Vec<RawNote> {
    let slot_seconds = grid.slot_seconds();
    let last_slot = ((stream.duration_seconds + stream.hop_seconds - origin) / slot_seconds).ceil();
    let to_slot = |time: f64| ((time - origin) / slot_seconds).round().max(0.0).min(last_slot) as u32;

    let mut notes: Vec<RawNote> = Vec::new();
    let mut swallowed_silence: Option<u32> = None;

    for run in runs(stream) {
        let mut start = to_slot(stream.frames[run.first].time);
        let end = to_slot(stream.frames[run.last].time + stream.hop_seconds);
        if let Some(prev) = notes.last() {
            start = start.max(prev.end_slot());
        }

        if end <= start {
            if run.pitch.is_none() {
                swallowed_silence = Some(start);
            }
            continue;
        }

        let tier = if run.pitch.is_none() || run.min_confidence >= params.high_confidence_floor {
            ConfidenceTier::High
        } else {
            ConfidenceTier::Medium
        };
        let guess = match run.pitch {
            None => gap_guess(stream, &run, params),
            Some(_) => None,
        };

        match notes.last_mut() {
            Some(prev) if prev.pitch == run.pitch && prev.end_slot() == start => {
                prev.slot_count = end - prev.start_slot;
                prev.tier = prev.tier.min(tier);
                prev.guess = prev.guess.or(guess);
                if let (Some(_), Some(slot)) = (prev.pitch, swallowed_silence) {
                    prev.articulations.push(slot);
                }
            }
            _ => notes.push(RawNote {
                pitch: run.pitch,
                start_slot: start,
                slot_count: end - start,
                tier,
                articulations: Vec::new(),
                guess,
            }),
        }
        swallowed_silence = None;
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PitchFrame;
    use crate::pitch::PitchEstimate;
    use crate::segment::test_support::{grid_4_4, pitch};

    const HOP: f64 = 0.03125;

    /// Frames every `HOP` seconds, from `(frequency, confidence, count)` spans.
    fn stream(spans: &[(f32, f32, usize)]) -> FrameStream {
        let mut frames = Vec::new();
        for &(frequency, confidence, count) in spans {
            for _ in 0..count {
                frames.push(PitchFrame {
                    time: frames.len() as f64 * HOP,
                    frequency,
                    confidence: if frequency > 0.0 { confidence } else { 0.0 },
                });
            }
        }
        let duration = frames.len() as f64 * HOP;
        FrameStream::from_frames(frames, HOP, duration)
    }

    #[test]
    fn test_groups_runs_into_slots() {
        // Four frames per slot at 120 bpm.
        let s = stream(&[(261.63, 0.95, 8), (0.0, 0.0, 4), (293.66, 0.6, 8)]);
        let notes = frame_notes(&s, 0.0, &grid_4_4(), &TunableParams::default());

        assert_eq!(notes.len(), 3);
        assert_eq!((notes[0].pitch, notes[0].start_slot, notes[0].slot_count), (Some(pitch("C4")), 0, 2));
        assert_eq!(notes[0].tier, ConfidenceTier::High);
        assert!(notes[1].is_rest());
        assert_eq!((notes[1].start_slot, notes[1].slot_count), (2, 1));
        assert_eq!((notes[2].pitch, notes[2].start_slot, notes[2].slot_count), (Some(pitch("D4")), 3, 2));
        assert_eq!(notes[2].tier, ConfidenceTier::Medium);
    }

    #[test]
    fn test_swallowed_silence_becomes_articulation() {
        // One silent frame rounds to zero slots between two C4 runs.
        let s = stream(&[(261.63, 0.95, 8), (0.0, 0.0, 1), (261.63, 0.95, 7)]);
        let notes = frame_notes(&s, 0.0, &grid_4_4(), &TunableParams::default());

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].slot_count, 4);
        // Silent frame spans [0.25, 0.28125), which rounds to slots 2..2.
        assert_eq!(notes[0].articulations, vec![2]);
    }

    #[test]
    fn test_jitter_frame_joins_without_articulation() {
        let s = stream(&[(261.63, 0.95, 8), (277.18, 0.95, 1), (261.63, 0.95, 7)]);
        let notes = frame_notes(&s, 0.0, &grid_4_4(), &TunableParams::default());
        assert_eq!(notes.len(), 1);
        assert!(notes[0].articulations.is_empty());
    }

    #[test]
    fn test_origin_shifts_slots_and_clamps() {
        let s = stream(&[(0.0, 0.0, 8), (440.0, 0.9, 8)]);
        let notes = frame_notes(&s, 0.25, &grid_4_4(), &TunableParams::default());
        // Leading silence sits before the origin and disappears.
        assert_eq!(notes.len(), 1);
        assert_eq!((notes[0].start_slot, notes[0].slot_count), (0, 2));
    }

    #[test]
    fn test_gap_guess_from_rejected_frames() {
        let mut s = stream(&[(440.0, 0.9, 8), (0.0, 0.0, 4), (440.0, 0.9, 8)]);
        s.raw = s
            .frames
            .iter()
            .map(|f| PitchEstimate { frequency: f.frequency, confidence: f.confidence })
            .collect();
        // The silent run was a quiet B4 the confidence floor rejected.
        for index in 8..11 {
            s.raw[index] = PitchEstimate { frequency: 493.88, confidence: 0.15 };
        }
        let notes = frame_notes(&s, 0.0, &grid_4_4(), &TunableParams::default());
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[1].guess, Some(pitch("B4")));
    }

    #[test]
    fn test_no_guess_when_mostly_unvoiced() {
        let mut s = stream(&[(440.0, 0.9, 8), (0.0, 0.0, 4), (440.0, 0.9, 8)]);
        s.raw = vec![PitchEstimate::SILENT; s.frames.len()];
        s.raw[8] = PitchEstimate { frequency: 493.88, confidence: 0.15 };
        let notes = frame_notes(&s, 0.0, &grid_4_4(), &TunableParams::default());
        assert_eq!(notes[1].guess, None);
    }

    #[test]
    fn test_empty_stream() {
        let s = FrameStream::from_frames(Vec::new(), HOP, 1.0);
        assert!(frame_notes(&s, 0.0, &grid_4_4(), &TunableParams::default()).is_empty());
    }
}
