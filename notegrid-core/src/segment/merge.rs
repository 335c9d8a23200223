//! Fuzzy pitch merge.
//!
//! Detector jitter at note boundaries can misread a sustained pitch as its
//! neighbour semitone for a few frames, cutting one long note into pieces.
//! This pass rejoins such pieces, scanning from the end backward.

use crate::ConfidenceTier;
use crate::diagnostics::Diagnostics;

use super::{NotePass, PassContext, RawNote};

pub struct FuzzyMergePass;

fn mergeable(left: &RawNote, right: &RawNote, max_slots: u32) -> bool {
    let (Some(a), Some(b)) = (left.pitch, right.pitch) else {
        return false;
    };
    if left.tier == ConfidenceTier::Excluded || right.tier == ConfidenceTier::Excluded {
        return false;
    }
    a.semitones_to(b).abs() == 1
        && right.start_slot >= left.end_slot()
        && right.start_slot - left.end_slot() <= 1
        && right.end_slot() - left.start_slot <= max_slots
}

/// The longer part names the merged note; on equal length the more
/// confident part wins, and the earlier one after that.
fn merge(left: &RawNote, right: &RawNote) -> RawNote {
    let dominant = if right.slot_count > left.slot_count
        || (right.slot_count == left.slot_count && right.tier > left.tier)
    {
        right
    } else {
        left
    };

    let mut articulations = left.articulations.clone();
    articulations.extend_from_slice(&right.articulations);

    RawNote {
        pitch: dominant.pitch,
        start_slot: left.start_slot,
        slot_count: right.end_slot() - left.start_slot,
        tier: left.tier.min(right.tier),
        articulations,
        guess: None,
    }
}

impl NotePass for FuzzyMergePass {
    fn name(&self) -> &'static str {
        "fuzzy_merge"
    }

    fn apply(&self, mut notes: Vec<RawNote>, ctx: &PassContext<'_>, stats: &mut Diagnostics) -> Vec<RawNote> {
        let max_slots = ctx.params.max_merge_slots;
        let mut right = notes.len().saturating_sub(1);

        while right > 0 {
            // A rest of at most one slot may sit between the two parts.
            let bridged = right >= 2 && notes[right - 1].is_rest() && notes[right - 1].slot_count <= 1;
            let left = if bridged { right - 2 } else { right - 1 };

            if mergeable(&notes[left], &notes[right], max_slots) {
                let merged = merge(&notes[left], &notes[right]);
                notes.splice(left..=right, [merged]);
                stats.notes_merged += 1;
                right = left;
            } else {
                right -= 1;
            }
        }
        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunableParams;
    use crate::segment::test_support::{note, pitch, run_pass};

    #[test]
    fn test_merges_semitone_neighbours() {
        let notes = vec![note("C4", 0, 3), note("C#4", 3, 1)];
        let (out, stats) = run_pass(&FuzzyMergePass, notes, &TunableParams::default());
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].pitch, out[0].start_slot, out[0].slot_count), (Some(pitch("C4")), 0, 4));
        assert_eq!(stats.notes_merged, 1);
    }

    #[test]
    fn test_longer_part_wins() {
        let notes = vec![note("E4", 0, 1), note("F4", 1, 4)];
        let (out, _) = run_pass(&FuzzyMergePass, notes, &TunableParams::default());
        assert_eq!(out[0].pitch, Some(pitch("F4")));
    }

    #[test]
    fn test_tie_goes_to_higher_tier() {
        let mut left = note("E4", 0, 2);
        left.tier = ConfidenceTier::Medium;
        let notes = vec![left, note("F4", 2, 2)];
        let (out, _) = run_pass(&FuzzyMergePass, notes, &TunableParams::default());
        assert_eq!(out[0].pitch, Some(pitch("F4")));
        assert_eq!(out[0].tier, ConfidenceTier::Medium);
    }

    #[test]
    fn test_bridges_one_slot_rest() {
        let notes = vec![note("G4", 0, 2), RawNote::rest(2, 1), note("G#4", 3, 1)];
        let (out, _) = run_pass(&FuzzyMergePass, notes, &TunableParams::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].slot_count, 4);
    }

    #[test]
    fn test_leaves_whole_steps_and_long_gaps() {
        let params = TunableParams::default();
        let (out, _) = run_pass(&FuzzyMergePass, vec![note("C4", 0, 2), note("D4", 2, 2)], &params);
        assert_eq!(out.len(), 2);

        let gapped = vec![note("C4", 0, 2), RawNote::rest(2, 2), note("C#4", 4, 2)];
        let (out, _) = run_pass(&FuzzyMergePass, gapped, &params);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_respects_max_merge_slots() {
        let params = TunableParams::default();
        let notes = vec![note("A4", 0, 4), note("A#4", 4, 3)];
        let (out, stats) = run_pass(&FuzzyMergePass, notes, &params);
        assert_eq!(out.len(), 2);
        assert_eq!(stats.notes_merged, 0);
    }

    #[test]
    fn test_chain_never_exceeds_limit() {
        let params = TunableParams::default();
        let notes = vec![
            note("A4", 0, 2),
            note("A#4", 2, 2),
            note("A4", 4, 2),
            note("A#4", 6, 2),
            note("A4", 8, 2),
        ];
        let (out, _) = run_pass(&FuzzyMergePass, notes, &params);
        assert!(out.iter().all(|n| n.slot_count <= params.max_merge_slots));
        assert_eq!(out.iter().map(|n| n.slot_count).sum::<u32>(), 10);
    }

    #[test]
    fn test_skips_excluded_notes() {
        let mut guessed = note("D4", 2, 1);
        guessed.tier = ConfidenceTier::Excluded;
        let (out, _) = run_pass(&FuzzyMergePass, vec![note("C#4", 0, 2), guessed], &TunableParams::default());
        assert_eq!(out.len(), 2);
    }
}
