use anyhow::Result;
use tracing::info;

use super::Stage;
use crate::events::PhaseSegmenter;
use crate::models::{Phase, Recording, RecordingKind};

/// Runs the phase segmenter on neurofeedback recordings and reports the
/// windows in the payload. Other recording kinds pass through.
pub struct SegmentStage {
    segmenter: PhaseSegmenter,
}

impl SegmentStage {
    pub fn new(segmenter: PhaseSegmenter) -> Self {
        Self { segmenter }
    }
}

impl Stage for SegmentStage {
    fn name(&self) -> &str {
        "segment"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        if recording.reference.kind != RecordingKind::Neurofeedback {
            return Ok(None);
        }

        let windows = self.segmenter.segment(recording)?;
        info!(
            "{:?}: {} non-regulation and {} regulation windows",
            recording.reference.path,
            windows.count(Phase::NonRegulation),
            windows.count(Phase::Regulation)
        );

        Ok(Some(serde_json::to_value(&windows)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::models::{PhaseWindows, ProtocolTable, SegmentConfig};

    fn stage() -> SegmentStage {
        SegmentStage::new(PhaseSegmenter::new(
            &ProtocolTable::default(),
            SegmentConfig::default(),
        ))
    }

    #[test]
    fn test_payload_holds_windows() {
        let mut recording = fixtures::recording(
            RecordingKind::Neurofeedback,
            fixtures::neurofeedback_markers(6, 5),
        );

        let payload = stage().apply(&mut recording).unwrap().unwrap();
        let windows: PhaseWindows = serde_json::from_value(payload).unwrap();

        assert_eq!(windows.count(Phase::Regulation), 10);
        assert_eq!(windows.total_windows(), 20);
    }

    #[test]
    fn test_other_kinds_pass_through() {
        let mut recording =
            fixtures::recording(RecordingKind::Calibration, fixtures::calibration_markers(2, 1, 4));

        assert!(stage().apply(&mut recording).unwrap().is_none());
    }

    #[test]
    fn test_bad_markers_fail() {
        let mut recording = fixtures::recording(
            RecordingKind::Neurofeedback,
            fixtures::neurofeedback_markers(5, 6),
        );

        assert!(stage().apply(&mut recording).is_err());
    }
}
