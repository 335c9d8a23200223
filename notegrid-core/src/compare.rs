//! # Note Comparison
//!
//! Diffs a detected note sequence against a reference take and scores it.
//! Rests are ignored; pitched notes are matched one-to-one by nearest grid
//! position within a slot tolerance.

use serde::{Deserialize, Serialize};

use crate::QuantizedNote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Same pitch, position and length.
    Exact,
    /// Same pitch, different position or length.
    PitchOnly,
    /// Same position, different pitch.
    TimingOnly,
    /// Matched by proximity, but pitch and position both differ.
    Mismatch,
    /// Detected with no reference counterpart.
    Extra,
    /// Reference note nothing was detected for.
    Missed,
}

/// One row of a comparison. Differences are `reference - detected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMatch {
    pub detected: Option<QuantizedNote>,
    pub reference: Option<QuantizedNote>,
    pub match_type: MatchType,
    pub pitch_diff: Option<i32>,
    pub timing_diff: Option<i32>,
    pub duration_diff: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    pub slots_per_measure: u32,
    /// Largest position difference, in slots, that still counts as a match.
    pub tolerance_slots: u32,
    /// Shift the detected sequence so first notes line up, when they are
    /// at most `align_window_slots` apart.
    pub auto_align: bool,
    pub align_window_slots: u32,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            slots_per_measure: 16,
            tolerance_slots: 2,
            auto_align: true,
            align_window_slots: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub total_detected: usize,
    pub total_reference: usize,
    pub matched: usize,
    /// Percentages over matched notes.
    pub pitch_accuracy: f64,
    pub timing_accuracy: f64,
    pub duration_accuracy: f64,
    pub overall_accuracy: f64,
    /// Matched share of reference notes, in percent.
    pub recall: f64,
    pub missed: usize,
    pub extra: usize,
    /// Pitch off by one or two octaves.
    pub octave_errors: usize,
    /// Pitch off by anything other than whole octaves.
    pub pitch_errors: usize,
    pub timing_errors: usize,
    pub duration_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Slots subtracted from every detected position before matching.
    pub alignment_shift: i64,
    pub matches: Vec<NoteMatch>,
    pub report: AccuracyReport,
}

fn pitched_sorted(notes: &[QuantizedNote], slots_per_measure: u32) -> Vec<(i64, QuantizedNote)> {
    let mut out: Vec<(i64, QuantizedNote)> = notes
        .iter()
        .filter(|note| !note.is_rest && note.pitch.is_some())
        .map(|note| (note.absolute_slot(slots_per_measure) as i64, note.clone()))
        .collect();
    out.sort_by_key(|(slot, _)| *slot);
    out
}

/// Matches detected notes to reference notes and scores the result.
pub fn compare_notes(
    detected: &[QuantizedNote],
    reference: &[QuantizedNote],
    options: &CompareOptions,
) -> Comparison {
    let mut detected = pitched_sorted(detected, options.slots_per_measure);
    let reference = pitched_sorted(reference, options.slots_per_measure);

    let mut alignment_shift = 0;
    let first_detected = detected.first().map(|(slot, _)| *slot);
    let first_reference = reference.first().map(|(slot, _)| *slot);
    if let (true, Some(first_detected), Some(first_reference)) =
        (options.auto_align, first_detected, first_reference)
    {
        let delta = first_detected - first_reference;
        if delta != 0 && delta.unsigned_abs() <= options.align_window_slots as u64 {
            alignment_shift = delta;
            for (slot, _) in detected.iter_mut() {
                *slot -= delta;
            }
        }
    }

    let tolerance = options.tolerance_slots as i64;
    let mut taken = vec![false; reference.len()];
    let mut matches = Vec::with_capacity(detected.len() + reference.len());

    for (slot, note) in &detected {
        let best = reference
            .iter()
            .enumerate()
            .filter(|(index, (ref_slot, _))| !taken[*index] && (ref_slot - slot).abs() <= tolerance)
            .min_by_key(|(_, (ref_slot, _))| (ref_slot - slot).abs());

        match best {
            Some((index, (ref_slot, ref_note))) => {
                taken[index] = true;
                let pitch_diff = match (note.pitch, ref_note.pitch) {
                    (Some(a), Some(b)) => a.semitones_to(b),
                    _ => 0,
                };
                let timing_diff = (ref_slot - slot) as i32;
                let duration_diff = ref_note.slot_count as i32 - note.slot_count as i32;

                let match_type = match (pitch_diff, timing_diff, duration_diff) {
                    (0, 0, 0) => MatchType::Exact,
                    (0, _, _) => MatchType::PitchOnly,
                    (_, 0, _) => MatchType::TimingOnly,
                    _ => MatchType::Mismatch,
                };
                matches.push(NoteMatch {
                    detected: Some(note.clone()),
                    reference: Some(ref_note.clone()),
                    match_type,
                    pitch_diff: Some(pitch_diff),
                    timing_diff: Some(timing_diff),
                    duration_diff: Some(duration_diff),
                });
            }
            None => matches.push(NoteMatch {
                detected: Some(note.clone()),
                reference: None,
                match_type: MatchType::Extra,
                pitch_diff: None,
                timing_diff: None,
                duration_diff: None,
            }),
        }
    }

    for (index, (_, ref_note)) in reference.iter().enumerate() {
        if !taken[index] {
            matches.push(NoteMatch {
                detected: None,
                reference: Some(ref_note.clone()),
                match_type: MatchType::Missed,
                pitch_diff: None,
                timing_diff: None,
                duration_diff: None,
            });
        }
    }

    let report = analyze(&matches, detected.len(), reference.len());
    Comparison {
        alignment_shift,
        matches,
        report,
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn analyze(matches: &[NoteMatch], total_detected: usize, total_reference: usize) -> AccuracyReport {
    let paired: Vec<(i32, i32, i32, MatchType)> = matches
        .iter()
        .filter_map(|m| match (m.pitch_diff, m.timing_diff, m.duration_diff) {
            (Some(p), Some(t), Some(d)) => Some((p, t, d, m.match_type)),
            _ => None,
        })
        .collect();
    let matched = paired.len();
    let count = |pred: &dyn Fn(&(i32, i32, i32, MatchType)) -> bool| paired.iter().filter(|&m| pred(m)).count();

    let is_octave = |p: i32| matches!(p.abs(), 12 | 24);

    AccuracyReport {
        total_detected,
        total_reference,
        matched,
        pitch_accuracy: percent(count(&|m| m.0 == 0), matched),
        timing_accuracy: percent(count(&|m| m.1 == 0), matched),
        duration_accuracy: percent(count(&|m| m.2 == 0), matched),
        overall_accuracy: percent(count(&|m| m.3 == MatchType::Exact), matched),
        recall: percent(matched, total_reference),
        missed: matches.iter().filter(|m| m.match_type == MatchType::Missed).count(),
        extra: matches.iter().filter(|m| m.match_type == MatchType::Extra).count(),
        octave_errors: count(&|m| is_octave(m.0)),
        pitch_errors: count(&|m| m.0 != 0 && !is_octave(m.0)),
        timing_errors: count(&|m| m.1 != 0),
        duration_errors: count(&|m| m.2 != 0),
    }
}

impl AccuracyReport {
    /// Pools several reports, weighting percentages by matched notes.
    pub fn combine<'a>(reports: impl IntoIterator<Item = &'a AccuracyReport>) -> AccuracyReport {
        let mut total = AccuracyReport::default();
        let mut weighted = [0.0f64; 4];
        for report in reports {
            let weight = report.matched as f64;
            weighted[0] += report.pitch_accuracy * weight;
            weighted[1] += report.timing_accuracy * weight;
            weighted[2] += report.duration_accuracy * weight;
            weighted[3] += report.overall_accuracy * weight;
            total.total_detected += report.total_detected;
            total.total_reference += report.total_reference;
            total.matched += report.matched;
            total.missed += report.missed;
            total.extra += report.extra;
            total.octave_errors += report.octave_errors;
            total.pitch_errors += report.pitch_errors;
            total.timing_errors += report.timing_errors;
            total.duration_errors += report.duration_errors;
        }
        if total.matched > 0 {
            let matched = total.matched as f64;
            total.pitch_accuracy = weighted[0] / matched;
            total.timing_accuracy = weighted[1] / matched;
            total.duration_accuracy = weighted[2] / matched;
            total.overall_accuracy = weighted[3] / matched;
        }
        total.recall = percent(total.matched, total.total_reference);
        total
    }
}
