//! Batch manifests: a JSON list of takes, each with its grid and an optional
//! reference transcription. Relative paths resolve against the manifest's
//! own directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use notegrid_core::audio::load_wav;
use notegrid_core::batch::BatchJob;
use notegrid_core::snapshot::TranscriptionSnapshot;

fn default_beats() -> u32 {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCase {
    pub name: String,
    pub wav: PathBuf,
    pub bpm: f64,
    #[serde(default = "default_beats")]
    pub beats_per_measure: u32,
    #[serde(default)]
    pub start_measure: u32,
    /// Transcription snapshot with the expected notes.
    #[serde(default)]
    pub reference: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub cases: Vec<ManifestCase>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let mut manifest: Manifest =
            serde_json::from_str(&data).with_context(|| format!("Invalid manifest {}", path.display()))?;
        manifest.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Decodes every case into a job.
    pub fn jobs(&self) -> Result<Vec<BatchJob>> {
        self.cases
            .iter()
            .map(|case| {
                let wav = self.resolve(&case.wav);
                let buffer = load_wav(&wav).with_context(|| format!("Failed to load {}", wav.display()))?;
                let reference = match &case.reference {
                    Some(path) => {
                        let path = self.resolve(path);
                        let snapshot = TranscriptionSnapshot::load(&path)
                            .with_context(|| format!("Failed to load reference {}", path.display()))?;
                        Some(snapshot.notes)
                    }
                    None => None,
                };
                Ok(BatchJob {
                    name: case.name.clone(),
                    samples: buffer.samples,
                    sample_rate: buffer.sample_rate,
                    bpm: case.bpm,
                    beats_per_measure: case.beats_per_measure,
                    start_measure: case.start_measure,
                    reference,
                })
            })
            .collect()
    }
}
