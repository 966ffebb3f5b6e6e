use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::events::{EventDecoder, ProtocolValidator};
use crate::io::RecordingStore;
use crate::models::{Job, JobPayload, JobResult};
use crate::stages::StagePipeline;

/// Payload key holding the code rewrites applied by the protocol validator
pub const PROTOCOL_PAYLOAD_KEY: &str = "protocol";

/// Runs one job from load to persisted output.
///
/// Shared read-only by every worker; each job owns its recording.
pub struct JobRunner {
    store: Arc<dyn RecordingStore>,
    decoder: Arc<dyn EventDecoder>,
    validator: ProtocolValidator,
    pipeline: StagePipeline,
    write_output: bool,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn RecordingStore>,
        decoder: Arc<dyn EventDecoder>,
        validator: ProtocolValidator,
        pipeline: StagePipeline,
    ) -> Self {
        Self {
            store,
            decoder,
            validator,
            pipeline,
            write_output: true,
        }
    }

    /// Run without persisting outputs
    pub fn dry_run(mut self) -> Self {
        self.write_output = false;
        self
    }

    /// Run a job. Every error is caught here and turned into a failed result
    /// carrying the full error chain.
    pub fn run(&self, job: &Job) -> JobResult {
        let path = &job.reference.path;

        match self.execute(job) {
            Ok(payload) => {
                info!("{:?}: done", path);
                JobResult::success(path, payload)
            }
            Err(err) => {
                let trace = format!("{:?}", err);
                error!("{:?} failed: {}", path, trace);
                JobResult::failure(path, trace)
            }
        }
    }

    fn execute(&self, job: &Job) -> Result<JobPayload> {
        let reference = &job.reference;
        info!("Processing {}", reference.description());

        let mut recording = self.store.load(reference)?;
        recording.event_markers = self
            .decoder
            .decode(&recording)
            .context("Failed to decode events")?;

        // A structurally invalid recording never reaches the pipeline
        let rewrites = self.validator.validate(&mut recording).into_result()?;

        let mut payload = self.pipeline.run(&mut recording)?;
        if !rewrites.is_empty() {
            payload.insert(
                PROTOCOL_PAYLOAD_KEY.to_string(),
                serde_json::to_value(&rewrites)?,
            );
        }

        if self.write_output {
            let output = job.output_path()?;
            self.store
                .save(&recording, &output)
                .with_context(|| format!("Failed to save output: {:?}", output))?;
        }

        Ok(payload)
    }
}
