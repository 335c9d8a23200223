//! Projection from absolute slots onto `(measure, slot)` positions.

use crate::tuning::Pitch;
use crate::{ConfidenceTier, QuantizedNote};

use super::{RawNote, SlotGrid};

fn place(grid: &SlotGrid, pitch: Option<Pitch>, start: u32, count: u32, tier: ConfidenceTier) -> QuantizedNote {
    let (measure_index, slot_index) = grid.position(start);
    QuantizedNote {
        pitch,
        measure_index,
        slot_index,
        slot_count: count,
        is_rest: pitch.is_none(),
        confidence: tier,
    }
}

/// Builds the final sequence from the pitched notes.
///
/// Rests are regenerated from the gaps between pitched notes (and before
/// the first one), so adjacent rests always come out merged. Nothing is
/// emitted after the last pitched note. With no pitched note at all the
/// result is a single rest of `empty_span` slots.
pub fn project(notes: Vec<RawNote>, grid: &SlotGrid, empty_span: u32) -> Vec<QuantizedNote> {
    let mut pitched: Vec<RawNote> = notes
        .into_iter()
        .filter(|note| !note.is_rest() && note.slot_count > 0)
        .collect();
    pitched.sort_by_key(|note| note.start_slot);

    if pitched.is_empty() {
        return vec![place(grid, None, 0, empty_span.max(1), ConfidenceTier::High)];
    }

    let mut out = Vec::with_capacity(pitched.len() * 2);
    let mut cursor = 0;
    for note in pitched {
        if note.start_slot < cursor {
            continue;
        }
        if note.start_slot > cursor {
            out.push(place(grid, None, cursor, note.start_slot - cursor, ConfidenceTier::High));
        }
        out.push(place(grid, note.pitch, note.start_slot, note.slot_count, note.tier));
        cursor = note.end_slot();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::test_support::{grid_4_4, note};

    #[test]
    fn test_fills_gaps_and_drops_trailing_rest() {
        let notes = vec![
            RawNote::rest(0, 2),
            RawNote::rest(2, 2),
            note("C4", 4, 4),
            note("E4", 12, 8),
            RawNote::rest(20, 12),
        ];
        let out = project(notes, &grid_4_4(), 32);
        let summary: Vec<_> = out
            .iter()
            .map(|n| (n.is_rest, n.measure_index, n.slot_index, n.slot_count))
            .collect();
        assert_eq!(
            summary,
            vec![(true, 0, 0, 4), (false, 0, 4, 4), (true, 0, 8, 4), (false, 0, 12, 8)]
        );
    }

    #[test]
    fn test_wraps_measures() {
        let out = project(vec![note("G4", 18, 4)], &grid_4_4(), 0);
        assert_eq!((out[1].measure_index, out[1].slot_index), (1, 2));
        assert_eq!((out[0].measure_index, out[0].slot_index, out[0].slot_count), (0, 0, 18));
    }

    #[test]
    fn test_all_rest_input() {
        let out = project(vec![RawNote::rest(0, 7)], &grid_4_4(), 32);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_rest);
        assert_eq!(out[0].slot_count, 32);
        assert_eq!(out[0].confidence, ConfidenceTier::High);
    }

    #[test]
    fn test_empty_span_is_at_least_one_slot() {
        let out = project(Vec::new(), &grid_4_4(), 0);
        assert_eq!(out[0].slot_count, 1);
    }
}
