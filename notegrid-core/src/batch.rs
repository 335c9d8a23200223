//! # Batch Transcription
//!
//! Runs many independent takes through the pipeline on a small worker pool.
//! Each call to [`transcribe`](crate::transcribe) is pure and owns no shared
//! state, so takes are fanned out over a crossbeam channel and results are
//! collected back into submission order.

use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::QuantizedNote;
use crate::compare::{CompareOptions, Comparison, compare_notes};
use crate::config::TunableParams;
use crate::error::Result;
use crate::pipeline::{Transcription, grid_for, transcribe_with_diagnostics};

/// One take to transcribe.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub name: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub bpm: f64,
    pub beats_per_measure: u32,
    pub start_measure: u32,
    /// Expected notes; when present the result carries a comparison.
    pub reference: Option<Vec<QuantizedNote>>,
}

#[derive(Debug)]
pub struct BatchResult {
    pub name: String,
    pub transcription: Result<Transcription>,
    pub comparison: Option<Comparison>,
}

fn run_job(job: BatchJob, params: &TunableParams) -> BatchResult {
    let transcription = transcribe_with_diagnostics(
        &job.samples,
        job.sample_rate,
        job.bpm,
        job.beats_per_measure,
        job.start_measure,
        params,
    );

    let comparison = match (&transcription, &job.reference) {
        (Ok(result), Some(reference)) => grid_for(job.bpm, job.beats_per_measure, params).ok().map(|grid| {
            let options = CompareOptions {
                slots_per_measure: grid.slots_per_measure,
                ..Default::default()
            };
            compare_notes(&result.notes, reference, &options)
        }),
        _ => None,
    };

    if let Err(e) = &transcription {
        warn!(job = %job.name, error = %e, "Batch job failed");
    }

    BatchResult {
        name: job.name,
        transcription,
        comparison,
    }
}

fn worker(id: usize, jobs: Receiver<(usize, BatchJob)>, results: Sender<(usize, BatchResult)>, params: TunableParams) {
    while let Ok((index, job)) = jobs.recv() {
        debug!(worker = id, job = %job.name, "Transcribing");
        if results.send((index, run_job(job, &params))).is_err() {
            break;
        }
    }
}

/// Transcribes every job with up to `workers` threads.
///
/// # Returns
/// * One result per job, in the order the jobs were given. A failing job
///   does not affect the others.
pub fn transcribe_batch(jobs: Vec<BatchJob>, params: &TunableParams, workers: usize) -> Vec<BatchResult> {
    let total = jobs.len();
    let workers = workers.clamp(1, total.max(1));

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, BatchJob)>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, BatchResult)>();

    let handles: Vec<_> = (0..workers)
        .map(|id| {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let params = params.clone();
            thread::spawn(move || worker(id, jobs, results, params))
        })
        .collect();
    drop(job_rx);
    drop(result_tx);

    for job in jobs.into_iter().enumerate() {
        // Workers only stop once the job channel closes, so this cannot fail.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let mut slots: Vec<Option<BatchResult>> = (0..total).map(|_| None).collect();
    for (index, result) in result_rx.iter() {
        slots[index] = Some(result);
    }

    for handle in handles {
        if handle.join().is_err() {
            warn!("Batch worker panicked");
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscriptionError;

    fn tone(frequency: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let len = (seconds * sample_rate as f32) as usize;
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn job(name: &str, samples: Vec<f32>) -> BatchJob {
        BatchJob {
            name: name.to_string(),
            samples,
            sample_rate: 16_000,
            bpm: 120.0,
            beats_per_measure: 4,
            start_measure: 0,
            reference: None,
        }
    }

    #[test]
    fn test_results_keep_job_order() {
        let jobs: Vec<BatchJob> = (0..6)
            .map(|k| job(&format!("take-{k}"), vec![0.0; 4000 + k * 1000]))
            .collect();
        let results = transcribe_batch(jobs, &TunableParams::default(), 3);
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["take-0", "take-1", "take-2", "take-3", "take-4", "take-5"]);
        assert!(results.iter().all(|r| r.transcription.is_ok()));
    }

    #[test]
    fn test_failure_is_isolated() {
        let jobs = vec![job("empty", Vec::new()), job("silence", vec![0.0; 8000])];
        let results = transcribe_batch(jobs, &TunableParams::default(), 2);
        assert!(matches!(results[0].transcription, Err(TranscriptionError::EmptyBuffer)));
        assert!(results[1].transcription.is_ok());
        assert!(results[0].comparison.is_none());
    }

    #[test]
    fn test_oversized_meter_fails_only_its_job() {
        let mut huge = job("huge", vec![0.0; 8000]);
        huge.beats_per_measure = u32::MAX / 2;
        huge.reference = Some(Vec::new());
        let results = transcribe_batch(vec![huge, job("ok", vec![0.0; 8000])], &TunableParams::default(), 2);
        assert!(matches!(results[0].transcription, Err(TranscriptionError::InvalidMeter { .. })));
        assert!(results[0].comparison.is_none());
        assert!(results[1].transcription.is_ok());
    }

    #[test]
    fn test_matches_single_call() {
        let samples = tone(440.0, 16_000, 1.0);
        let params = TunableParams::default();
        let single = crate::transcribe(&samples, 16_000, 120.0, 4, 0, &params).unwrap();

        let mut with_reference = job("a4", samples);
        with_reference.reference = Some(single.clone());
        let results = transcribe_batch(vec![with_reference], &params, 4);

        let batch = results[0].transcription.as_ref().unwrap();
        assert_eq!(batch.notes, single);
        let comparison = results[0].comparison.as_ref().unwrap();
        assert_eq!(comparison.report.missed, 0);
        assert_eq!(comparison.report.extra, 0);
    }

    #[test]
    fn test_empty_batch() {
        assert!(transcribe_batch(Vec::new(), &TunableParams::default(), 4).is_empty());
    }
}
