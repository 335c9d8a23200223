//! # Transcription Pipeline
//!
//! The single entry point external callers use. One call is a pure,
//! synchronous computation over one buffer: it either returns the full note
//! sequence or an input error, never a partial result.

use tracing::{info, warn};

use crate::config::TunableParams;
use crate::diagnostics::Diagnostics;
use crate::error::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, Result, TranscriptionError};
use crate::onset::{OnsetAligner, anchor_origin};
use crate::pitch::frame_stream;
use crate::segment::{NoteSegmenter, SlotGrid};
use crate::{FrameStream, QuantizedNote};

/// Notes plus the counters gathered while producing them.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub notes: Vec<QuantizedNote>,
    pub diagnostics: Diagnostics,
}

fn validate_input(buffer: &[f32], sample_rate: u32) -> Result<()> {
    if buffer.is_empty() {
        return Err(TranscriptionError::EmptyBuffer);
    }
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(TranscriptionError::UnsupportedSampleRate(sample_rate));
    }
    Ok(())
}

/// Builds the grid for a meter, `slots_per_beat` slots to each beat.
///
/// A meter whose slot count does not fit in a `u32` is an invalid meter.
pub fn grid_for(bpm: f64, beats_per_measure: u32, params: &TunableParams) -> Result<SlotGrid> {
    let slots_per_measure = beats_per_measure
        .checked_mul(params.slots_per_beat)
        .ok_or(TranscriptionError::InvalidMeter {
            beats_per_measure,
            slots_per_measure: beats_per_measure.saturating_mul(params.slots_per_beat),
        })?;
    SlotGrid::new(bpm, beats_per_measure, slots_per_measure)
}

/// Raw estimates that were pitched but fell outside the band or under the
/// confidence floor. Zero when the stream carries no raw estimates.
fn filtered_frames(stream: &FrameStream) -> usize {
    stream
        .raw
        .iter()
        .zip(&stream.frames)
        .filter(|(raw, frame)| raw.is_voiced() && !frame.is_voiced())
        .count()
}

/// Transcribes a mono take into grid-quantized notes and rests.
///
/// # Arguments
/// * `buffer` - Mono samples, read-only for the duration of the call
/// * `sample_rate` - Sample rate in Hz
/// * `bpm` - Tempo of the take
/// * `beats_per_measure` - Meter numerator; the grid has
///   `beats_per_measure × slots_per_beat` slots per measure
/// * `start_measure` - Added to every note's measure index
/// * `params` - Parameter snapshot used for the whole call
pub fn transcribe(
    buffer: &[f32],
    sample_rate: u32,
    bpm: f64,
    beats_per_measure: u32,
    start_measure: u32,
    params: &TunableParams,
) -> Result<Vec<QuantizedNote>> {
    transcribe_with_diagnostics(buffer, sample_rate, bpm, beats_per_measure, start_measure, params)
        .map(|transcription| transcription.notes)
}

/// Same as [`transcribe`], also returning diagnostic counters.
pub fn transcribe_with_diagnostics(
    buffer: &[f32],
    sample_rate: u32,
    bpm: f64,
    beats_per_measure: u32,
    start_measure: u32,
    params: &TunableParams,
) -> Result<Transcription> {
    validate_input(buffer, sample_rate)?;
    params.validate()?;
    let grid = grid_for(bpm, beats_per_measure, params)?;

    let stream = frame_stream(buffer, sample_rate, params);
    let onset = OnsetAligner::from_params(params, sample_rate).align_origin(buffer, sample_rate);

    let transcription = transcribe_frames(&stream, onset, &grid, start_measure, params);

    info!(
        sample_rate,
        seconds = stream.duration_seconds,
        bpm,
        notes = transcription.notes.len(),
        rests = transcription.notes.iter().filter(|n| n.is_rest).count(),
        "Transcription complete"
    );
    Ok(transcription)
}

/// Segments an existing frame stream given the onset already found for it.
///
/// This is the audio-free half of the pipeline, used when replaying a
/// frame snapshot.
pub fn transcribe_frames(
    stream: &FrameStream,
    onset_seconds: f64,
    grid: &SlotGrid,
    start_measure: u32,
    params: &TunableParams,
) -> Transcription {
    let origin = anchor_origin(onset_seconds, grid.slot_seconds(), params);
    if stream.frames.iter().all(|frame| !frame.is_voiced()) {
        warn!(frames = stream.frames.len(), "No voiced frames; emitting a single rest");
    }

    let mut diagnostics = Diagnostics {
        frames_total: stream.frames.len(),
        frames_rms_gated: stream.gated_frames,
        frames_filtered: filtered_frames(stream),
        onset_seconds,
        origin_offset: origin,
        ..Default::default()
    };

    let mut notes = NoteSegmenter::default().run(stream, grid, origin, params, &mut diagnostics);
    for note in &mut notes {
        note.measure_index += start_measure;
    }

    Transcription { notes, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_buffer() {
        let err = transcribe(&[], 44_100, 120.0, 4, 0, &TunableParams::default()).unwrap_err();
        assert!(matches!(err, TranscriptionError::EmptyBuffer));
    }

    #[test]
    fn test_rejects_sample_rate() {
        let buffer = vec![0.0; 1000];
        for rate in [0, 4_000, 384_000] {
            let err = transcribe(&buffer, rate, 120.0, 4, 0, &TunableParams::default()).unwrap_err();
            assert!(matches!(err, TranscriptionError::UnsupportedSampleRate(r) if r == rate));
        }
    }

    #[test]
    fn test_rejects_tempo_and_meter() {
        let buffer = vec![0.0; 1000];
        let params = TunableParams::default();
        assert!(matches!(
            transcribe(&buffer, 44_100, -5.0, 4, 0, &params),
            Err(TranscriptionError::InvalidTempo(_))
        ));
        assert!(matches!(
            transcribe(&buffer, 44_100, 120.0, 0, 0, &params),
            Err(TranscriptionError::InvalidMeter { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_params() {
        let params = TunableParams { hop_ms: 0.0, ..Default::default() };
        assert!(matches!(
            transcribe(&[0.0; 10], 44_100, 120.0, 4, 0, &params),
            Err(TranscriptionError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_grid_for_meter() {
        let params = TunableParams::default();
        assert_eq!(grid_for(120.0, 4, &params).unwrap().slots_per_measure, 16);
        assert_eq!(grid_for(120.0, 3, &params).unwrap().slots_per_measure, 12);
    }

    #[test]
    fn test_oversized_meter_is_rejected() {
        let params = TunableParams::default();
        assert!(matches!(
            grid_for(120.0, u32::MAX / 2, &params),
            Err(TranscriptionError::InvalidMeter { beats_per_measure, .. }) if beats_per_measure == u32::MAX / 2
        ));
        assert!(matches!(
            transcribe(&[0.0; 1000], 44_100, 120.0, u32::MAX / 2, 0, &params),
            Err(TranscriptionError::InvalidMeter { .. })
        ));
    }

    #[test]
    fn test_filtered_frames_are_counted_without_audio() {
        use crate::PitchFrame;
        use crate::pitch::PitchEstimate;

        // Two frames the band filter threw away, one kept.
        let mut stream = FrameStream::from_frames(
            vec![
                PitchFrame { time: 0.0, frequency: 0.0, confidence: 0.0 },
                PitchFrame { time: 0.01, frequency: 0.0, confidence: 0.0 },
                PitchFrame { time: 0.02, frequency: 440.0, confidence: 0.9 },
            ],
            0.01,
            0.5,
        );
        stream.raw = vec![
            PitchEstimate { frequency: 40.0, confidence: 0.9 },
            PitchEstimate { frequency: 3000.0, confidence: 0.9 },
            PitchEstimate { frequency: 440.0, confidence: 0.9 },
        ];
        let params = TunableParams::default();
        let grid = grid_for(120.0, 4, &params).unwrap();
        let transcription = transcribe_frames(&stream, 0.0, &grid, 0, &params);
        assert_eq!(transcription.diagnostics.frames_filtered, 2);
        assert_eq!(transcription.diagnostics.frames_total, 3);
    }

    #[test]
    fn test_short_buffer_is_one_rest() {
        // 62.5 ms is shorter than one detector window: no frames, one rest.
        let notes = transcribe(&vec![0.0; 1000], 16_000, 120.0, 4, 0, &TunableParams::default()).unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].is_rest);
        assert_eq!(notes[0].slot_count, 1);
    }
}
