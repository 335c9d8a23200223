//! Intra-note split detection.
//!
//! A repeated note played without a full silence between strikes often
//! survives framing as one long note. Three kinds of evidence split it,
//! checked in this order:
//! 1. articulation points recorded during framing;
//! 2. a volume dip the frames stayed voiced through: the level falls under
//!    `split_dip_level` of its running peak and climbs back to
//!    `split_recover_level`, and the second note starts at the dip;
//! 3. a run of interior slots whose voiced share drops below
//!    `split_dip_occupancy`; those slots become a gap.

use crate::diagnostics::Diagnostics;

use super::{NotePass, PassContext, RawNote};

pub struct SplitPass;

fn piece(template: &RawNote, start_slot: u32, slot_count: u32) -> RawNote {
    RawNote {
        start_slot,
        slot_count,
        articulations: Vec::new(),
        guess: None,
        ..template.clone()
    }
}

/// Splits at every articulation point strictly inside the note.
fn split_at_articulations(note: RawNote) -> Vec<RawNote> {
    let mut cuts: Vec<u32> = note
        .articulations
        .iter()
        .copied()
        .filter(|&slot| slot > note.start_slot && slot < note.end_slot())
        .collect();
    if cuts.is_empty() {
        return vec![note];
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = note.start_slot;
    for cut in cuts.into_iter().chain(std::iter::once(note.end_slot())) {
        pieces.push(piece(&note, start, cut - start));
        start = cut;
    }
    pieces
}

/// Splits where the level dips and recovers; the pieces stay contiguous.
fn split_at_level(note: RawNote, ctx: &PassContext<'_>) -> Vec<RawNote> {
    let params = ctx.params;
    let cut = ctx.profile.level_dip(
        note.start_slot,
        note.end_slot(),
        params.split_dip_level,
        params.split_recover_level,
    );
    match cut {
        Some(cut) => vec![
            piece(&note, note.start_slot, cut - note.start_slot),
            piece(&note, cut, note.end_slot() - cut),
        ],
        None => vec![note],
    }
}

/// Splits around the first interior dip; the dip slots become a gap.
fn split_at_dip(note: RawNote, ctx: &PassContext<'_>) -> Vec<RawNote> {
    let count = note.slot_count;
    let mut dip: Option<(u32, u32)> = None;

    for offset in 1..count.saturating_sub(1) {
        if ctx.profile.occupancy(note.start_slot + offset) < ctx.params.split_dip_occupancy {
            dip = Some(match dip {
                Some((first, _)) => (first, offset),
                None => (offset, offset),
            });
        } else if dip.is_some() {
            break;
        }
    }

    match dip {
        Some((first, last)) => vec![
            piece(&note, note.start_slot, first),
            piece(&note, note.start_slot + last + 1, count - last - 1),
        ],
        None => vec![note],
    }
}

impl NotePass for SplitPass {
    fn name(&self) -> &'static str {
        "split"
    }

    fn apply(&self, notes: Vec<RawNote>, ctx: &PassContext<'_>, stats: &mut Diagnostics) -> Vec<RawNote> {
        let min_slots = ctx.params.min_split_slots;
        let mut out = Vec::with_capacity(notes.len());

        for note in notes {
            if note.is_rest() || note.slot_count < min_slots {
                out.push(note);
                continue;
            }
            let before = out.len();
            for part in split_at_articulations(note) {
                if part.slot_count < min_slots {
                    out.push(part);
                    continue;
                }
                for section in split_at_level(part, ctx) {
                    if section.slot_count < min_slots {
                        out.push(section);
                    } else {
                        out.extend(split_at_dip(section, ctx));
                    }
                }
            }
            stats.notes_split += out.len() - before - 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunableParams;
    use crate::segment::SlotProfile;
    use crate::segment::test_support::{note, run_pass, run_pass_with_profile};
    use crate::{FrameStream, PitchFrame};

    /// Profile with four frames per 0.125 s slot; `silent` slots are unvoiced.
    fn profile(slots: u32, silent: &[u32]) -> SlotProfile {
        let frames = (0..slots * 4)
            .map(|i| PitchFrame {
                time: i as f64 * 0.03125,
                frequency: if silent.contains(&(i / 4)) { 0.0 } else { 440.0 },
                confidence: 0.9,
            })
            .collect();
        let stream = FrameStream::from_frames(frames, 0.03125, slots as f64 * 0.125);
        SlotProfile::build(&stream, 0.0, 0.125)
    }

    /// Fully voiced profile whose level drops to `floor` for the given frames.
    fn level_profile(slots: u32, quiet: std::ops::Range<u32>, floor: f32) -> SlotProfile {
        let frames = (0..slots * 4)
            .map(|i| PitchFrame { time: i as f64 * 0.03125, frequency: 440.0, confidence: 0.9 })
            .collect();
        let mut stream = FrameStream::from_frames(frames, 0.03125, slots as f64 * 0.125);
        stream.levels = (0..slots * 4).map(|i| if quiet.contains(&i) { floor } else { 0.35 }).collect();
        SlotProfile::build(&stream, 0.0, 0.125)
    }

    #[test]
    fn test_splits_at_articulation() {
        let mut long = note("E4", 0, 8);
        long.articulations = vec![4];
        let (out, stats) = run_pass(&SplitPass, vec![long], &TunableParams::default());
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].start_slot, out[0].slot_count), (0, 4));
        assert_eq!((out[1].start_slot, out[1].slot_count), (4, 4));
        assert_eq!(stats.notes_split, 1);
    }

    #[test]
    fn test_ignores_articulation_on_boundary() {
        let mut long = note("E4", 2, 6);
        long.articulations = vec![2, 8];
        let (out, _) = run_pass(&SplitPass, vec![long], &TunableParams::default());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_splits_at_energy_dip() {
        let profile = profile(8, &[3]);
        let (out, stats) =
            run_pass_with_profile(&SplitPass, vec![note("G4", 0, 8)], &TunableParams::default(), &profile);
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].start_slot, out[0].slot_count), (0, 3));
        assert_eq!((out[1].start_slot, out[1].slot_count), (4, 4));
        assert_eq!(stats.notes_split, 1);
    }

    #[test]
    fn test_splits_voiced_volume_dip() {
        // Two quiet frames at the start of slot 4; every frame stays voiced.
        let profile = level_profile(8, 16..18, 0.02);
        let (out, stats) =
            run_pass_with_profile(&SplitPass, vec![note("A4", 0, 8)], &TunableParams::default(), &profile);
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].start_slot, out[0].slot_count), (0, 4));
        assert_eq!((out[1].start_slot, out[1].slot_count), (4, 4));
        assert!(out.iter().all(|n| n.pitch == note("A4", 0, 1).pitch));
        assert_eq!(stats.notes_split, 1);
    }

    #[test]
    fn test_shallow_level_wobble_is_kept() {
        let profile = level_profile(8, 16..18, 0.2);
        let (out, _) =
            run_pass_with_profile(&SplitPass, vec![note("A4", 0, 8)], &TunableParams::default(), &profile);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_dip_at_edges_is_ignored() {
        let profile = profile(8, &[0, 7]);
        let (out, _) =
            run_pass_with_profile(&SplitPass, vec![note("G4", 0, 8)], &TunableParams::default(), &profile);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_short_notes_untouched() {
        let profile = profile(4, &[1]);
        let (out, _) =
            run_pass_with_profile(&SplitPass, vec![note("G4", 0, 3)], &TunableParams::default(), &profile);
        assert_eq!(out.len(), 1);
    }
}
