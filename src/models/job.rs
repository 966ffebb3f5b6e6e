use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::RecordingReference;

/// Stage-specific data collected while processing one recording, keyed by
/// stage name
pub type JobPayload = BTreeMap<String, serde_json::Value>;

/// One unit of batch work: one recording, from load to persisted output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub reference: RecordingReference,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
}

impl Job {
    pub fn new(
        reference: RecordingReference,
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reference,
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Output path mirroring the input path under the output root
    pub fn output_path(&self) -> Result<PathBuf> {
        mirrored_path(&self.input_root, &self.output_root, &self.reference.path)
    }
}

/// Map a path under `input_root` to the same relative path under `output_root`
pub fn mirrored_path(input_root: &Path, output_root: &Path, path: &Path) -> Result<PathBuf> {
    let relative = path
        .strip_prefix(input_root)
        .with_context(|| format!("{:?} is not inside {:?}", path, input_root))?;
    Ok(output_root.join(relative))
}

/// Outcome of one job; the payload only exists on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success {
        #[serde(default)]
        payload: JobPayload,
    },
    Failure {
        error_trace: String,
    },
}

/// Result record of one job, created exactly once by the worker that ran it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Input recording processed
    pub path: PathBuf,
    pub outcome: JobOutcome,
}

impl JobResult {
    pub fn success(path: impl Into<PathBuf>, payload: JobPayload) -> Self {
        Self {
            path: path.into(),
            outcome: JobOutcome::Success { payload },
        }
    }

    pub fn failure(path: impl Into<PathBuf>, error_trace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            outcome: JobOutcome::Failure {
                error_trace: error_trace.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&JobPayload> {
        match &self.outcome {
            JobOutcome::Success { payload } => Some(payload),
            JobOutcome::Failure { .. } => None,
        }
    }

    pub fn error_trace(&self) -> Option<&str> {
        match &self.outcome {
            JobOutcome::Success { .. } => None,
            JobOutcome::Failure { error_trace } => Some(error_trace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordingKind;

    #[test]
    fn test_output_path_mirrors_input() {
        let job = Job::new(
            RecordingReference {
                participant_id: 57,
                session_id: 1,
                kind: RecordingKind::Calibration,
                run_index: 1,
                path: PathBuf::from("/data/in/057/Session 1/Calibration/1-calibration-raw.json"),
            },
            "/data/in",
            "/data/out",
        );

        assert_eq!(
            job.output_path().unwrap(),
            PathBuf::from("/data/out/057/Session 1/Calibration/1-calibration-raw.json")
        );
    }

    #[test]
    fn test_failure_has_no_payload() {
        let result = JobResult::failure("a.json", "boom");
        assert!(!result.is_success());
        assert!(result.payload().is_none());
        assert_eq!(result.error_trace(), Some("boom"));
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let result = JobResult::success("a.json", JobPayload::new());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["status"], "success");
    }
}
