use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::Stage;
use crate::models::Recording;

/// Components removed by an artifact remover, by origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedComponents {
    /// Ocular components
    pub eog: usize,
    /// Cardiac components
    pub ecg: usize,
}

impl RemovedComponents {
    pub fn total(&self) -> usize {
        self.eog + self.ecg
    }
}

/// Decomposes the recording, removes artifact components and reconstructs
/// the signal in place
pub trait ArtifactRemover: Send + Sync {
    fn remove(&self, recording: &mut Recording) -> Result<RemovedComponents>;
}

/// Limits on the number of components an artifact pass may remove
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub max_eog: usize,
    pub max_ecg: usize,
    /// Fail when nothing was removed
    pub require_any: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            max_eog: 2,
            max_ecg: 1,
            require_any: true,
        }
    }
}

pub struct ArtifactStage {
    remover: Box<dyn ArtifactRemover>,
    config: ArtifactConfig,
}

impl ArtifactStage {
    pub fn new(remover: impl ArtifactRemover + 'static, config: ArtifactConfig) -> Self {
        Self {
            remover: Box::new(remover),
            config,
        }
    }
}

impl Stage for ArtifactStage {
    fn name(&self) -> &str {
        "artifacts"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        let removed = self.remover.remove(recording)?;

        if removed.eog > self.config.max_eog {
            bail!(
                "{} EOG components removed, at most {} expected",
                removed.eog,
                self.config.max_eog
            );
        }
        if removed.ecg > self.config.max_ecg {
            bail!(
                "{} ECG components removed, at most {} expected",
                removed.ecg,
                self.config.max_ecg
            );
        }
        if self.config.require_any && removed.total() == 0 {
            bail!("No artifact component was removed");
        }

        info!(
            "{:?}: removed {} EOG and {} ECG components",
            recording.reference.path, removed.eog, removed.ecg
        );
        Ok(Some(json!(removed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::models::RecordingKind;

    struct Fixed(RemovedComponents);

    impl ArtifactRemover for Fixed {
        fn remove(&self, _recording: &mut Recording) -> Result<RemovedComponents> {
            Ok(self.0)
        }
    }

    fn run(eog: usize, ecg: usize) -> Result<Option<serde_json::Value>> {
        let stage = ArtifactStage::new(Fixed(RemovedComponents { eog, ecg }), ArtifactConfig::default());
        let mut recording =
            fixtures::recording(RecordingKind::Calibration, fixtures::calibration_markers(2, 1, 4));
        stage.apply(&mut recording)
    }

    #[test]
    fn test_accepted_removal() {
        let payload = run(2, 1).unwrap().unwrap();
        assert_eq!(payload, json!({ "eog": 2, "ecg": 1 }));
    }

    #[test]
    fn test_too_many_components() {
        assert!(run(3, 0).unwrap_err().to_string().contains("EOG"));
        assert!(run(1, 2).unwrap_err().to_string().contains("ECG"));
    }

    #[test]
    fn test_nothing_removed() {
        assert!(run(0, 0).is_err());
    }
}
