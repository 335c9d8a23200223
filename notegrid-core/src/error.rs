//! Error types for notegrid

use thiserror::Error;

/// Lowest sample rate accepted by [`crate::pipeline::transcribe`].
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest sample rate accepted by [`crate::pipeline::transcribe`].
pub const MAX_SAMPLE_RATE: u32 = 192_000;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Sample buffer is empty")]
    EmptyBuffer,
    #[error("Unsupported sample rate: {0} Hz (expected {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE})")]
    UnsupportedSampleRate(u32),
    #[error("Invalid tempo: {0} bpm")]
    InvalidTempo(f64),
    #[error("Invalid meter: {beats_per_measure} beats over {slots_per_measure} slots")]
    InvalidMeter {
        beats_per_measure: u32,
        slots_per_measure: u32,
    },
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Invalid pitch name: {0:?}")]
    InvalidPitch(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, TranscriptionError>;
