use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "notegrid")]
#[command(about = "Transcribe monophonic takes into grid-quantized notes", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging for the transcription engine
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Tempo and meter of a take.
#[derive(Args, Debug, Clone, Copy)]
pub struct GridArgs {
    /// Tempo in beats per minute
    #[arg(long, default_value = "120")]
    pub bpm: f64,

    /// Beats per measure (meter numerator)
    #[arg(long, default_value = "4")]
    pub beats: u32,

    /// Measure index of the first slot
    #[arg(long, default_value = "0")]
    pub start_measure: u32,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe a WAV file and print the notes
    Transcribe {
        wav: PathBuf,

        #[command(flatten)]
        grid: GridArgs,

        /// Parameter file (JSON); missing fields take their defaults
        #[arg(short, long)]
        params: Option<PathBuf>,

        /// Print a transcription snapshot instead of a table
        #[arg(long)]
        json: bool,

        /// Also write the transcription snapshot to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run pitch detection only and save the frame stream
    Frames {
        wav: PathBuf,

        #[arg(short, long)]
        params: Option<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Re-segment a saved frame stream
    Replay {
        frames: PathBuf,

        #[command(flatten)]
        grid: GridArgs,

        #[arg(short, long)]
        params: Option<PathBuf>,

        /// Reference transcription snapshot to compare against
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },

    /// Transcribe every case in a manifest and report accuracy
    Batch {
        manifest: PathBuf,

        #[arg(short, long)]
        params: Option<PathBuf>,

        #[arg(short, long, default_value = "4")]
        workers: usize,
    },

    /// Measure capture latency from a recorded click track
    Calibrate {
        wav: PathBuf,

        /// JSON array of the expected click times in seconds
        #[arg(long)]
        clicks: PathBuf,

        #[arg(short, long)]
        params: Option<PathBuf>,

        /// Save the latency profile here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a parameter file with the measured pull-back applied
        #[arg(long)]
        write_params: Option<PathBuf>,
    },

    /// Write a click track for calibration, with its click times
    ClickTrack {
        #[arg(long, default_value = "120")]
        bpm: f64,

        #[arg(long, default_value = "16")]
        count: usize,

        /// Time of the first click in seconds
        #[arg(long, default_value = "0.5")]
        start: f64,

        #[arg(long, default_value = "44100")]
        sample_rate: u32,

        #[arg(short, long)]
        output: PathBuf,

        /// Where to write the click times (JSON)
        #[arg(long)]
        times: PathBuf,
    },

    /// Print or write the default parameter file
    Params {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
