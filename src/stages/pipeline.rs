use anyhow::Result;
use tracing::debug;

use crate::error::StageError;
use crate::models::{JobPayload, Recording};

/// One named conditioning step applied to a recording in place.
///
/// A stage may return a JSON value describing what it did; it is stored in
/// the job payload under the stage name.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>>;
}

/// Ordered sequence of stages.
///
/// Holds no per-recording state, so one pipeline can serve every worker.
#[derive(Default)]
pub struct StagePipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl StagePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Apply every stage in order. The first failure aborts the remaining
    /// stages; nothing is retried.
    pub fn run(&self, recording: &mut Recording) -> Result<JobPayload, StageError> {
        let mut payload = JobPayload::new();

        for stage in &self.stages {
            debug!("{:?}: stage '{}'", recording.reference.path, stage.name());
            let value = stage
                .apply(recording)
                .map_err(|err| StageError::new(stage.name(), err))?;
            if let Some(value) = value {
                payload.insert(stage.name().to_string(), value);
            }
        }

        Ok(payload)
    }
}
