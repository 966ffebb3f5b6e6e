use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::debug;

use super::Stage;
use crate::models::{Annotation, ProtocolTable, Recording};

/// Turns the event markers into annotations carrying the nominal duration
/// and the meaning of each code
#[derive(Debug, Clone, Default)]
pub struct AnnotateEvents {
    table: ProtocolTable,
}

impl AnnotateEvents {
    pub fn new(table: ProtocolTable) -> Self {
        Self { table }
    }
}

impl Stage for AnnotateEvents {
    fn name(&self) -> &str {
        "annotate"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        let mut annotations = Vec::with_capacity(recording.event_markers.len());

        for marker in &recording.event_markers {
            let event = self.table.event_for_code(marker.code).ok_or_else(|| {
                anyhow!(
                    "Unknown event code {} at sample {}",
                    marker.code,
                    marker.sample
                )
            })?;
            annotations.push(Annotation {
                onset_secs: marker.sample as f64 / recording.sampling_rate,
                duration_secs: self.table.duration_secs(event),
                description: event.label().to_string(),
            });
        }

        debug!("{} annotations", annotations.len());
        let count = annotations.len();
        recording.annotations.extend(annotations);

        Ok(Some(json!(count)))
    }
}
