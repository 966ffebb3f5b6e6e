pub mod error;
pub mod events;
pub mod io;
pub mod models;
pub mod orchestrator;
pub mod stages;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{ConfigError, DiscoveryError, ManifestError, ProtocolError, SegmentError, StageError};
pub use events::{
    find_events, CodeRewrite, EventDecoder, PhaseSegmenter, ProtocolValidator, TriggerChannelDecoder,
    ValidationOutcome,
};
pub use io::{
    check_writable, read_results, write_results, ExclusionSet, FileSelector, JsonRecordingStore,
    RecordingStore, ResultFilter, ResultManifest, Selection, SelectionConfig, SelectionFilter,
};
pub use models::{
    Job, JobOutcome, JobPayload, JobResult, Phase, PhaseWindows, ProtocolTable, Recording,
    RecordingKind, RecordingReference, SegmentConfig, Window,
};
pub use orchestrator::{build_jobs, run_batch, JobRunner, ALL_WORKERS};
pub use stages::{Stage, StagePipeline};
