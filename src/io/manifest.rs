//! Timestamped, durable record of a batch run.
//!
//! The creation time is embedded in the file name
//! (`preprocess_14h-05mn-17-10-2026.json`) and parsed back when reading.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, Timelike};
use tracing::info;

use super::store::atomic_write;
use crate::error::ManifestError;
use crate::models::JobResult;

/// Suffix appended to the manifest stem
pub const TIMESTAMP_FORMAT: &str = "_%Hh-%Mmn-%d-%m-%Y";

const TIMESTAMP_PATTERN: &str = "%Hh-%Mmn-%d-%m-%Y";
const EXTENSION: &str = "json";

/// Which results to keep when reading a manifest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultFilter {
    #[default]
    All,
    SuccessOnly,
    FailureOnly,
}

impl ResultFilter {
    fn keep(&self, result: &JobResult) -> bool {
        match self {
            ResultFilter::All => true,
            ResultFilter::SuccessOnly => result.is_success(),
            ResultFilter::FailureOnly => !result.is_success(),
        }
    }
}

/// A manifest read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ResultManifest {
    pub created_at: NaiveDateTime,
    pub results: Vec<JobResult>,
}

impl ResultManifest {
    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.results.len() - self.successes()
    }
}

fn check_extension(path: &Path) -> Result<(), ManifestError> {
    if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
        Ok(())
    } else {
        Err(ManifestError::Format {
            path: path.to_path_buf(),
            reason: format!("extension must be .{}", EXTENSION),
        })
    }
}

/// Fail fast if a manifest cannot be written at `path`
pub fn check_writable(path: &Path) -> Result<(), ManifestError> {
    check_extension(path)?;

    let io_err = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = parent.unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(io_err)?;

    let scratch = dir.join(format!(".{}.check", uuid::Uuid::new_v4()));
    fs::write(&scratch, b"").map_err(io_err)?;
    fs::remove_file(&scratch).map_err(io_err)?;
    Ok(())
}

/// Name of the manifest created at `created_at` for the requested `path`
pub fn timestamped_path(path: &Path, created_at: NaiveDateTime) -> Result<PathBuf, ManifestError> {
    check_extension(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ManifestError::Format {
            path: path.to_path_buf(),
            reason: "missing file stem".to_string(),
        })?;

    let name = format!(
        "{}{}.{}",
        stem,
        created_at.format(TIMESTAMP_FORMAT),
        EXTENSION
    );
    Ok(path.with_file_name(name))
}

/// Parse the creation time out of a manifest file name
pub fn parse_timestamp(path: &Path) -> Result<NaiveDateTime, ManifestError> {
    check_extension(path)?;
    let format_err = |reason: String| ManifestError::Format {
        path: path.to_path_buf(),
        reason,
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| format_err("missing file stem".to_string()))?;
    let (_, timestamp) = stem
        .rsplit_once('_')
        .ok_or_else(|| format_err("no timestamp in file name".to_string()))?;

    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_PATTERN)
        .map_err(|err| format_err(format!("invalid timestamp '{}': {}", timestamp, err)))
}

/// Write the results, stamped with the current local time.
/// Returns the path actually written.
pub fn write_results(results: &[JobResult], path: &Path) -> Result<PathBuf, ManifestError> {
    write_results_at(results, path, Local::now().naive_local())
}

pub fn write_results_at(
    results: &[JobResult],
    path: &Path,
    created_at: NaiveDateTime,
) -> Result<PathBuf, ManifestError> {
    let created_at = truncate_to_minute(created_at);
    let target = timestamped_path(path, created_at)?;

    let bytes = serde_json::to_vec_pretty(results).map_err(|source| ManifestError::Serialization {
        path: target.clone(),
        source,
    })?;
    atomic_write(&target, &bytes).map_err(|err| ManifestError::Io {
        path: target.clone(),
        source: std::io::Error::other(err),
    })?;

    info!("Wrote {} results to {:?}", results.len(), target);
    Ok(target)
}

/// Read a manifest written by [`write_results`]
pub fn read_results(path: &Path, filter: ResultFilter) -> Result<ResultManifest, ManifestError> {
    let created_at = parse_timestamp(path)?;

    let content = fs::read(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let results: Vec<JobResult> =
        serde_json::from_slice(&content).map_err(|source| ManifestError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(ResultManifest {
        created_at,
        results: results.into_iter().filter(|r| filter.keep(r)).collect(),
    })
}

fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
