use anyhow::Result;

use super::Stage;
use crate::models::Recording;

/// Writes the measurement description ("Subject 57 - Session 1 - Online 2")
/// into the recording
#[derive(Debug, Clone, Default)]
pub struct DescribeRecording;

impl Stage for DescribeRecording {
    fn name(&self) -> &str {
        "describe"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        recording.description = Some(recording.reference.description());
        Ok(None)
    }
}
