use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Annotation, Channel, Recording, RecordingReference};

/// Loads and persists recordings
pub trait RecordingStore: Send + Sync {
    fn load(&self, reference: &RecordingReference) -> Result<Recording>;

    fn save(&self, recording: &Recording, path: &Path) -> Result<()>;
}

/// On-disk layout of a JSON recording
#[derive(Debug, Deserialize)]
struct RecordingFile {
    sampling_rate: f64,
    channels: Vec<Channel>,
    #[serde(default)]
    bad_channels: BTreeSet<String>,
    #[serde(default)]
    annotations: Vec<Annotation>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecordingFileRef<'a> {
    sampling_rate: f64,
    channels: &'a [Channel],
    bad_channels: &'a BTreeSet<String>,
    annotations: &'a [Annotation],
    description: Option<&'a str>,
}

/// Stores recordings as JSON documents (`*-raw.json`)
#[derive(Debug, Clone, Default)]
pub struct JsonRecordingStore;

impl RecordingStore for JsonRecordingStore {
    fn load(&self, reference: &RecordingReference) -> Result<Recording> {
        let path = &reference.path;
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
        let file: RecordingFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse recording: {:?}", path))?;

        check_recording(&file).with_context(|| format!("Invalid recording: {:?}", path))?;

        let mut recording = Recording::new(reference.clone(), file.sampling_rate, file.channels);
        recording.bad_channels = file.bad_channels;
        recording.annotations = file.annotations;
        recording.description = file.description;
        Ok(recording)
    }

    fn save(&self, recording: &Recording, path: &Path) -> Result<()> {
        let file = RecordingFileRef {
            sampling_rate: recording.sampling_rate,
            channels: &recording.channels,
            bad_channels: &recording.bad_channels,
            annotations: &recording.annotations,
            description: recording.description.as_deref(),
        };
        let bytes = serde_json::to_vec(&file).context("Failed to serialize recording")?;
        atomic_write(path, &bytes).with_context(|| format!("Failed to write file: {:?}", path))
    }
}

fn check_recording(file: &RecordingFile) -> Result<()> {
    if !(file.sampling_rate > 0.0) {
        bail!("sampling rate must be positive, got {}", file.sampling_rate);
    }

    let mut names = BTreeSet::new();
    for channel in &file.channels {
        if !names.insert(channel.name.as_str()) {
            bail!("duplicate channel name '{}'", channel.name);
        }
    }

    if let Some(first) = file.channels.first() {
        let n = first.samples.len();
        if let Some(other) = file.channels.iter().find(|c| c.samples.len() != n) {
            bail!(
                "channel '{}' has {} samples, '{}' has {}",
                other.name,
                other.samples.len(),
                first.name,
                n
            );
        }
    }

    Ok(())
}

/// Write through a temporary sibling file and rename it into place, so a
/// reader never observes a partial file
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

    let written = write_and_rename(&tmp, path, bytes);
    if written.is_err() {
        // best effort, the write error is the one worth reporting
        let _ = fs::remove_file(&tmp);
    }
    written.with_context(|| format!("Failed to write file: {:?}", path))
}

fn write_and_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}
