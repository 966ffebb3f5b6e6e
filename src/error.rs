//! Error taxonomy for the preprocessing pipeline.
//!
//! Errors local to one recording (`ProtocolError`, `StageError`) are turned
//! into failed job results by the orchestrator. Errors about the batch itself
//! (`ConfigError`, `ManifestError`) abort before any job is dispatched.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{EventKind, RecordingKind};

/// A discovered path does not follow the recording naming convention
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path:?} does not follow the recording naming convention: {reason}")]
pub struct DiscoveryError {
    /// Offending path
    pub path: PathBuf,
    /// What part of the convention is violated
    pub reason: String,
}

impl DiscoveryError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The event-marker stream does not match the protocol of its recording kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Distinct codes or their counts differ from the protocol
    #[error("structural mismatch in {kind} recording: {reason}")]
    StructuralMismatch { kind: RecordingKind, reason: String },

    /// Counts match but the temporal placement of a code group is wrong
    #[error("ordering mismatch in {kind} recording: {reason}")]
    OrderingMismatch { kind: RecordingKind, reason: String },
}

/// A conditioning stage failed; the remaining stages are skipped
#[derive(Debug, Error)]
#[error("stage '{stage}' failed")]
pub struct StageError {
    /// Name of the failing stage
    pub stage: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl StageError {
    pub fn new(
        stage: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            stage: stage.into(),
            source: source.into(),
        }
    }
}

/// Invalid batch configuration, detected before any job starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "n_jobs must be -1 (all cores) or between 1 and {available}, got {requested}"
    )]
    InvalidWorkerCount { requested: i64, available: usize },

    #[error("participant ID must be strictly positive, got {0}")]
    InvalidParticipant(u32),

    #[error("session ID must be between 1 and 15 included, got {0}")]
    InvalidSession(u32),

    #[error("input directory {0:?} does not exist")]
    MissingInputRoot(PathBuf),

    #[error("file {0:?} does not exist")]
    MissingFile(PathBuf),

    #[error("file {file:?} is not inside the input directory {root:?}")]
    FileOutsideRoot { file: PathBuf, root: PathBuf },

    #[error("file {file:?} was filtered out: {reason}")]
    FileNotSelected { file: PathBuf, reason: String },

    #[error(
        "no recording to process under {root:?} ({skipped_existing} already processed, {skipped_excluded} excluded)"
    )]
    NothingSelected {
        root: PathBuf,
        skipped_existing: usize,
        skipped_excluded: usize,
    },

    #[error("invalid filter arguments: {0}")]
    InvalidFilter(String),

    #[error("event code {code} is already used by {taken_by}, cannot assign it to {event}")]
    DuplicateEventCode {
        code: u32,
        event: EventKind,
        taken_by: EventKind,
    },

    #[error("invalid {kind} protocol: {reason}")]
    InvalidProtocol { kind: RecordingKind, reason: String },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Unreadable or unwritable result manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest path {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("manifest IO error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {path:?} could not be (de)serialized")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A recording cannot be segmented into phase windows
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("only neurofeedback recordings are segmented, got {0}")]
    UnsupportedKind(RecordingKind),

    #[error("unexpected event markers: {0}")]
    UnexpectedMarkers(String),

    #[error("invalid sliding window: duration {duration_secs}s, overlap {overlap_secs}s")]
    InvalidWindowing { duration_secs: f64, overlap_secs: f64 },
}
