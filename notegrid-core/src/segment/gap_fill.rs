//! Ambiguous gap fill.
//!
//! A short rest between two pitched notes whose frames mostly carried a
//! pitch the filters rejected is more likely a quiet note than silence.
//! The guessed pitch is emitted tagged `excluded` so an editor can ask a
//! human to confirm it.

use crate::ConfidenceTier;
use crate::diagnostics::Diagnostics;

use super::{NotePass, PassContext, RawNote};

pub struct GapFillPass;

impl NotePass for GapFillPass {
    fn name(&self) -> &'static str {
        "gap_fill"
    }

    fn apply(&self, mut notes: Vec<RawNote>, ctx: &PassContext<'_>, stats: &mut Diagnostics) -> Vec<RawNote> {
        let params = ctx.params;

        for i in 1..notes.len().saturating_sub(1) {
            let (before, rest) = notes.split_at_mut(i);
            let (gap, after) = rest.split_at_mut(1);
            let (prev, gap, next) = (&before[i - 1], &mut gap[0], &after[0]);

            let Some(guess) = gap.guess else { continue };
            let (Some(left), Some(right)) = (prev.pitch, next.pitch) else {
                continue;
            };
            if !gap.is_rest()
                || gap.slot_count > params.max_gap_fill_slots
                || left.semitones_to(right).unsigned_abs() > params.max_gap_interval
            {
                continue;
            }

            gap.pitch = Some(guess);
            gap.tier = ConfidenceTier::Excluded;
            gap.guess = None;
            stats.gaps_filled += 1;
        }
        notes
    }
}
