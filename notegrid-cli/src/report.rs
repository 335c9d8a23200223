//! Plain-text rendering of notes and accuracy reports for the terminal.

use std::fmt::Write;

use notegrid_core::compare::{AccuracyReport, Comparison, MatchType, NoteMatch};
use notegrid_core::{ConfidenceTier, Diagnostics, QuantizedNote};

fn tier_label(tier: ConfidenceTier) -> &'static str {
    match tier {
        ConfidenceTier::High => "high",
        ConfidenceTier::Medium => "medium",
        ConfidenceTier::Excluded => "excluded",
    }
}

fn pitch_label(note: &QuantizedNote) -> String {
    note.pitch.map(|p| p.name()).unwrap_or_else(|| "rest".to_string())
}

fn match_label(match_type: MatchType) -> &'static str {
    match match_type {
        MatchType::Exact => "exact",
        MatchType::PitchOnly => "pitch only",
        MatchType::TimingOnly => "timing only",
        MatchType::Mismatch => "mismatch",
        MatchType::Extra => "extra",
        MatchType::Missed => "missed",
    }
}

pub fn notes_table(notes: &[QuantizedNote]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>7} {:>4} {:>4} {:>5}  {:<6} {}", "measure", "slot", "len", "value", "pitch", "tier");
    for note in notes {
        let _ = writeln!(
            out,
            "{:>7} {:>4} {:>4} {:>5}  {:<6} {}",
            note.measure_index,
            note.slot_index,
            note.slot_count,
            note.note_value().label(),
            pitch_label(note),
            tier_label(note.confidence),
        );
    }
    out
}

fn position(note: &Option<QuantizedNote>) -> String {
    match note {
        Some(n) => format!("{}@{}:{}+{}", pitch_label(n), n.measure_index, n.slot_index, n.slot_count),
        None => "-".to_string(),
    }
}

fn diff(value: Option<i32>) -> String {
    value.map(|v| format!("{v:+}")).unwrap_or_else(|| "-".to_string())
}

fn match_row(m: &NoteMatch) -> String {
    format!(
        "{:<12} {:<16} {:<16} {:>5} {:>5} {:>5}",
        match_label(m.match_type),
        position(&m.detected),
        position(&m.reference),
        diff(m.pitch_diff),
        diff(m.timing_diff),
        diff(m.duration_diff),
    )
}

pub fn comparison_table(comparison: &Comparison) -> String {
    let mut out = String::new();
    if comparison.alignment_shift != 0 {
        let _ = writeln!(out, "aligned by {} slots", comparison.alignment_shift);
    }
    let _ = writeln!(
        out,
        "{:<12} {:<16} {:<16} {:>5} {:>5} {:>5}",
        "match", "detected", "reference", "pitch", "time", "dur"
    );
    for m in &comparison.matches {
        let _ = writeln!(out, "{}", match_row(m));
    }
    out.push_str(&accuracy_summary(&comparison.report));
    out
}

pub fn accuracy_summary(report: &AccuracyReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "matched {}/{} reference notes ({:.1}% recall), {} extra, {} missed",
        report.matched, report.total_reference, report.recall, report.extra, report.missed
    );
    let _ = writeln!(
        out,
        "pitch {:.1}%  timing {:.1}%  duration {:.1}%  overall {:.1}%",
        report.pitch_accuracy, report.timing_accuracy, report.duration_accuracy, report.overall_accuracy
    );
    if report.octave_errors + report.pitch_errors > 0 {
        let _ = writeln!(
            out,
            "octave errors {}  other pitch errors {}",
            report.octave_errors, report.pitch_errors
        );
    }
    out
}

pub fn diagnostics_line(diagnostics: &Diagnostics) -> String {
    format!(
        "frames {} (gated {}, filtered {}), onset {:.3}s, merged {}, split {}, gaps filled {}, quantized {}, overlaps {}",
        diagnostics.frames_total,
        diagnostics.frames_rms_gated,
        diagnostics.frames_filtered,
        diagnostics.onset_seconds,
        diagnostics.notes_merged,
        diagnostics.notes_split,
        diagnostics.gaps_filled,
        diagnostics.notes_quantized,
        diagnostics.notes_overlap_corrected,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegrid_core::compare::{CompareOptions, compare_notes};

    fn note(name: Option<&str>, slot: u32, count: u32) -> QuantizedNote {
        QuantizedNote {
            pitch: name.map(|n| n.parse().unwrap()),
            measure_index: 1,
            slot_index: slot,
            slot_count: count,
            is_rest: name.is_none(),
            confidence: ConfidenceTier::Medium,
        }
    }

    #[test]
    fn test_notes_table_rows() {
        let table = notes_table(&[note(Some("F#3"), 0, 4), note(None, 4, 8)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("F#3"));
        assert!(lines[1].contains("medium"));
        assert!(lines[2].contains("rest"));
        assert!(lines[2].contains(" h "));
    }

    #[test]
    fn test_comparison_table_marks_missed() {
        let reference = vec![note(Some("C4"), 0, 4), note(Some("D4"), 8, 4)];
        let detected = vec![note(Some("C4"), 0, 4)];
        let comparison = compare_notes(&detected, &reference, &CompareOptions::default());
        let table = comparison_table(&comparison);
        assert!(table.contains("exact"));
        assert!(table.contains("missed"));
        assert!(table.contains("D4@1:8+4"));
        assert!(table.contains("50.0% recall"));
    }

    #[test]
    fn test_signed_diffs() {
        assert_eq!(diff(Some(2)), "+2");
        assert_eq!(diff(Some(-1)), "-1");
        assert_eq!(diff(None), "-");
    }
}
