//! Duration quantization.

use std::cmp::Reverse;

use crate::config::TunableParams;
use crate::diagnostics::Diagnostics;

use super::{NotePass, PassContext, RawNote};

pub struct QuantizePass;

/// Snaps a slot count to a standard duration when one is within tolerance.
///
/// Counts that are already standard stay put. Short counts lean toward
/// the short-note target with a wider tolerance, since fragmentation makes
/// notes come out too short far more often than too long. Otherwise the
/// nearest standard value wins, the longer one on a tie.
pub fn quantize_slot_count(slot_count: u32, params: &TunableParams) -> u32 {
    let standards = &params.standard_durations;
    if standards.contains(&slot_count) {
        return slot_count;
    }

    if slot_count <= params.short_note_max_slots {
        let target = params.short_note_target_slots;
        if target.abs_diff(slot_count) <= params.short_tolerance_slots {
            return target;
        }
    }

    standards
        .iter()
        .copied()
        .min_by_key(|&standard| (standard.abs_diff(slot_count), Reverse(standard)))
        .filter(|standard| standard.abs_diff(slot_count) <= params.standard_tolerance_slots)
        .unwrap_or(slot_count)
}

impl NotePass for QuantizePass {
    fn name(&self) -> &'static str {
        "quantize"
    }

    fn apply(&self, mut notes: Vec<RawNote>, ctx: &PassContext<'_>, stats: &mut Diagnostics) -> Vec<RawNote> {
        for note in notes.iter_mut().filter(|note| !note.is_rest()) {
            let snapped = quantize_slot_count(note.slot_count, ctx.params);
            if snapped != note.slot_count {
                note.slot_count = snapped;
                stats.notes_quantized += 1;
            }
        }
        notes
    }
}
