//! # Audio File Module
//!
//! WAV decoding for harness callers. The engine itself only ever sees a
//! mono `f32` slice; this module gets one out of a file on disk.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::error::{Result, TranscriptionError};

/// A decoded mono recording.
#[derive(Debug, Clone, PartialEq)]
pub struct MonoBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoBuffer {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Averages interleaved channels down to one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Reads a WAV file (integer or float PCM, any channel count) as mono `f32`.
pub fn load_wav(path: impl AsRef<Path>) -> Result<MonoBuffer> {
    let reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    if interleaved.is_empty() {
        return Err(TranscriptionError::EmptyBuffer);
    }

    let samples = downmix(&interleaved, spec.channels as usize);
    debug!(
        path = %path.as_ref().display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = samples.len(),
        "Loaded WAV"
    );
    Ok(MonoBuffer {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Writes mono samples as 16-bit PCM.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25, -0.25], 1), vec![0.25, -0.25]);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0) - 0.5).collect();

        write_wav(&path, &samples, 22_050).unwrap();
        let loaded = load_wav(&path).unwrap();

        assert_eq!(loaded.sample_rate, 22_050);
        assert_eq!(loaded.samples.len(), samples.len());
        for (a, b) in loaded.samples.iter().zip(&samples) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_load_stereo_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-0.1f32).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = load_wav(&path).unwrap();
        assert_eq!(loaded.samples.len(), 10);
        assert!(loaded.samples.iter().all(|s| (s - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(load_wav("/nonexistent/take.wav"), Err(TranscriptionError::Wav(_))));
    }
}
