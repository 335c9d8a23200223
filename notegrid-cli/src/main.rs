//! # notegrid - Command-line harness for the transcription engine
//!
//! Wraps `notegrid-core` for offline use: transcribing WAV takes, dumping
//! and replaying frame streams, scoring batches against reference
//! transcriptions, and measuring capture latency.
//!
//! Logs go to stderr through `tracing`; `RUST_LOG` overrides the default
//! level. Results go to stdout.

mod cli;
mod manifest;
mod report;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, GridArgs};
use manifest::Manifest;
use notegrid_core::audio::{MonoBuffer, load_wav, write_wav};
use notegrid_core::calibration::{LatencyProfile, click_track};
use notegrid_core::compare::{AccuracyReport, CompareOptions, compare_notes};
use notegrid_core::onset::OnsetAligner;
use notegrid_core::pipeline::grid_for;
use notegrid_core::pitch::frame_stream;
use notegrid_core::snapshot::{FrameSnapshot, TranscriptionSnapshot, segment_snapshot};
use notegrid_core::{Diagnostics, QuantizedNote, TunableParams, batch, transcribe_with_diagnostics};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(format!("notegrid={level}").parse()?)
            .add_directive(format!("notegrid_core={level}").parse()?))
        .init();

    match cli.command {
        Commands::Transcribe { wav, grid, params, json, output } => {
            run_transcribe(&wav, grid, params.as_deref(), json, output.as_deref())
        }
        Commands::Frames { wav, params, output } => run_frames(&wav, params.as_deref(), &output),
        Commands::Replay { frames, grid, params, reference } => {
            run_replay(&frames, grid, params.as_deref(), reference.as_deref())
        }
        Commands::Batch { manifest, params, workers } => run_batch(&manifest, params.as_deref(), workers),
        Commands::Calibrate { wav, clicks, params, output, write_params } => run_calibrate(
            &wav,
            &clicks,
            params.as_deref(),
            output.as_deref(),
            write_params.as_deref(),
        ),
        Commands::ClickTrack { bpm, count, start, sample_rate, output, times } => {
            run_click_track(bpm, count, start, sample_rate, &output, &times)
        }
        Commands::Params { output } => run_params(output.as_deref()),
    }
}

fn load_params(path: Option<&Path>) -> Result<TunableParams> {
    match path {
        Some(path) => TunableParams::load(path)
            .with_context(|| format!("Failed to load parameters from {}", path.display())),
        None => Ok(TunableParams::default()),
    }
}

fn load_take(path: &Path) -> Result<MonoBuffer> {
    let buffer = load_wav(path).with_context(|| format!("Failed to load {}", path.display()))?;
    info!(
        path = %path.display(),
        seconds = buffer.duration_seconds(),
        sample_rate = buffer.sample_rate,
        "Loaded take"
    );
    Ok(buffer)
}

fn snapshot_for(grid: GridArgs, params: &TunableParams, notes: Vec<QuantizedNote>) -> Result<TranscriptionSnapshot> {
    Ok(TranscriptionSnapshot {
        bpm: grid.bpm,
        beats_per_measure: grid.beats,
        slots_per_measure: grid_for(grid.bpm, grid.beats, params)?.slots_per_measure,
        start_measure: grid.start_measure,
        notes,
    })
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    eprintln!("{}", report::diagnostics_line(diagnostics));
}

fn run_transcribe(
    wav: &Path,
    grid: GridArgs,
    params_path: Option<&Path>,
    json: bool,
    output: Option<&Path>,
) -> Result<()> {
    let params = load_params(params_path)?;
    let buffer = load_take(wav)?;
    let transcription = transcribe_with_diagnostics(
        &buffer.samples,
        buffer.sample_rate,
        grid.bpm,
        grid.beats,
        grid.start_measure,
        &params,
    )
    .context("Transcription failed")?;

    let snapshot = snapshot_for(grid, &params, transcription.notes)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", report::notes_table(&snapshot.notes));
        print_diagnostics(&transcription.diagnostics);
    }
    if let Some(path) = output {
        snapshot
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Saved transcription snapshot");
    }
    Ok(())
}

fn run_frames(wav: &Path, params_path: Option<&Path>, output: &Path) -> Result<()> {
    let params = load_params(params_path)?;
    params.validate()?;
    let buffer = load_take(wav)?;

    let snapshot = FrameSnapshot {
        sample_rate: buffer.sample_rate,
        onset_seconds: OnsetAligner::from_params(&params, buffer.sample_rate)
            .align_origin(&buffer.samples, buffer.sample_rate),
        stream: frame_stream(&buffer.samples, buffer.sample_rate, &params),
    };
    snapshot
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        frames = snapshot.stream.len(),
        onset = snapshot.onset_seconds,
        path = %output.display(),
        "Saved frame snapshot"
    );
    Ok(())
}

fn run_replay(frames: &Path, grid: GridArgs, params_path: Option<&Path>, reference: Option<&Path>) -> Result<()> {
    let params = load_params(params_path)?;
    let snapshot = FrameSnapshot::load(frames).with_context(|| format!("Failed to load {}", frames.display()))?;
    let transcription = segment_snapshot(&snapshot, grid.bpm, grid.beats, grid.start_measure, &params)?;

    print!("{}", report::notes_table(&transcription.notes));
    print_diagnostics(&transcription.diagnostics);

    if let Some(path) = reference {
        let expected = TranscriptionSnapshot::load(path)
            .with_context(|| format!("Failed to load reference {}", path.display()))?;
        let slots_per_measure = grid_for(grid.bpm, grid.beats, &params)?.slots_per_measure;
        if expected.slots_per_measure != slots_per_measure {
            warn!(
                reference = expected.slots_per_measure,
                replay = slots_per_measure,
                "Reference was made on a different grid"
            );
        }
        let options = CompareOptions {
            slots_per_measure,
            ..Default::default()
        };
        let comparison = compare_notes(&transcription.notes, &expected.notes, &options);
        println!();
        print!("{}", report::comparison_table(&comparison));
    }
    Ok(())
}

fn run_batch(manifest_path: &Path, params_path: Option<&Path>, workers: usize) -> Result<()> {
    let params = load_params(params_path)?;
    let manifest = Manifest::load(manifest_path)?;
    let jobs = manifest.jobs()?;
    info!(cases = jobs.len(), workers, "Running batch");

    let results = batch::transcribe_batch(jobs, &params, workers);

    let mut failures = 0;
    let mut diagnostics = Diagnostics::default();
    let mut reports = Vec::new();
    for result in &results {
        match &result.transcription {
            Ok(transcription) => {
                diagnostics.accumulate(&transcription.diagnostics);
                match &result.comparison {
                    Some(comparison) => {
                        println!(
                            "{:<24} {:>3} notes  overall {:>5.1}%  recall {:>5.1}%",
                            result.name,
                            transcription.notes.len(),
                            comparison.report.overall_accuracy,
                            comparison.report.recall
                        );
                        reports.push(comparison.report.clone());
                    }
                    None => println!("{:<24} {:>3} notes", result.name, transcription.notes.len()),
                }
            }
            Err(e) => {
                failures += 1;
                println!("{:<24} FAILED: {e}", result.name);
            }
        }
    }

    if !reports.is_empty() {
        println!();
        print!("{}", report::accuracy_summary(&AccuracyReport::combine(&reports)));
    }
    print_diagnostics(&diagnostics);

    if failures > 0 {
        bail!("{failures} of {} cases failed", results.len());
    }
    Ok(())
}

fn run_calibrate(
    wav: &Path,
    clicks: &Path,
    params_path: Option<&Path>,
    output: Option<&Path>,
    write_params: Option<&Path>,
) -> Result<()> {
    let params = load_params(params_path)?;
    let buffer = load_take(wav)?;
    let data = std::fs::read_to_string(clicks).with_context(|| format!("Failed to read {}", clicks.display()))?;
    let expected: Vec<f64> = serde_json::from_str(&data).context("Click times must be a JSON array of seconds")?;

    let profile = LatencyProfile::from_capture(&buffer.samples, buffer.sample_rate, &expected, &params);
    let Some(latency) = profile.latency_seconds else {
        bail!(
            "Only {} of {} clicks were found; at least 3 are needed",
            profile.measurements.len(),
            expected.len()
        );
    };

    println!("paired {} of {} clicks", profile.measurements.len(), expected.len());
    println!("latency {:.1} ms", latency * 1000.0);
    if let Some(drift) = profile.drift {
        println!("drift {:+.5} s/s", drift);
    }

    if let Some(path) = output {
        profile
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let (Some(path), Some(calibrated)) = (write_params, profile.apply(&params)) {
        calibrated
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), pull_back_ms = calibrated.pull_back_ms, "Saved calibrated parameters");
    }
    Ok(())
}

fn run_click_track(bpm: f64, count: usize, start: f64, sample_rate: u32, output: &Path, times_path: &Path) -> Result<()> {
    if !(bpm.is_finite() && bpm > 0.0) {
        bail!("Tempo must be positive, got {bpm}");
    }
    let interval = 60.0 / bpm;
    let times: Vec<f64> = (0..count).map(|k| start + k as f64 * interval).collect();
    let duration = start + count as f64 * interval + 1.0;

    let samples = click_track(&times, sample_rate, duration);
    write_wav(output, &samples, sample_rate).with_context(|| format!("Failed to write {}", output.display()))?;
    std::fs::write(times_path, serde_json::to_string_pretty(&times)?)
        .with_context(|| format!("Failed to write {}", times_path.display()))?;
    info!(clicks = count, path = %output.display(), "Wrote click track");
    Ok(())
}

fn run_params(output: Option<&Path>) -> Result<()> {
    let params = TunableParams::default();
    match output {
        Some(path) => params
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", serde_json::to_string_pretty(&params)?),
    }
    Ok(())
}
