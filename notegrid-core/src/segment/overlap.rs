//! Overlap resolution.
//!
//! Quantization can stretch a note past the start of what follows it.
//! Walking left to right, a note that overruns a rest eats into the rest;
//! a note that overruns another note is cut back to that note's start.
//! Anything left with zero slots is dropped.

use crate::diagnostics::Diagnostics;

use super::{NotePass, PassContext, RawNote};

pub struct OverlapPass;

impl NotePass for OverlapPass {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn apply(&self, mut notes: Vec<RawNote>, _ctx: &PassContext<'_>, stats: &mut Diagnostics) -> Vec<RawNote> {
        for i in 0..notes.len() {
            if notes[i].is_rest() || notes[i].slot_count == 0 {
                continue;
            }
            let end = notes[i].end_slot();

            for j in i + 1..notes.len() {
                if notes[j].slot_count == 0 {
                    continue;
                }
                if notes[j].start_slot >= end {
                    break;
                }
                if notes[j].is_rest() {
                    let overlap = (end - notes[j].start_slot).min(notes[j].slot_count);
                    notes[j].start_slot += overlap;
                    notes[j].slot_count -= overlap;
                } else {
                    notes[i].slot_count = notes[j].start_slot.saturating_sub(notes[i].start_slot);
                    stats.notes_overlap_corrected += 1;
                    break;
                }
            }
        }

        notes.retain(|note| note.slot_count > 0);
        notes
    }
}
