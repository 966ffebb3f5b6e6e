use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Stage;
use crate::models::Recording;

/// Reference applied to the EEG channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMethod {
    /// Mean of all good EEG channels
    CommonAverage,
    /// Mean of the named channels (e.g. mastoids)
    Channels(Vec<String>),
}

pub trait Rereferencer: Send + Sync {
    fn rereference(&self, recording: &mut Recording, method: &ReferenceMethod) -> Result<()>;
}

/// Subtracts the mean of the reference channels from every EEG channel
#[derive(Debug, Clone, Default)]
pub struct MeanReferencer;

impl Rereferencer for MeanReferencer {
    fn rereference(&self, recording: &mut Recording, method: &ReferenceMethod) -> Result<()> {
        let sources = match method {
            ReferenceMethod::CommonAverage => recording.eeg_indices(true),
            ReferenceMethod::Channels(names) => names
                .iter()
                .map(|name| {
                    recording
                        .channels
                        .iter()
                        .position(|c| &c.name == name)
                        .with_context(|| format!("Reference channel '{}' not found", name))
                })
                .collect::<Result<Vec<_>>>()?,
        };
        if sources.is_empty() {
            bail!("No channel available to build the reference");
        }

        let mut reference = vec![0.0; recording.n_samples()];
        for &i in &sources {
            for (acc, s) in reference.iter_mut().zip(&recording.channels[i].samples) {
                *acc += s;
            }
        }
        let n = sources.len() as f64;
        reference.iter_mut().for_each(|r| *r /= n);

        for i in recording.eeg_indices(false) {
            for (s, r) in recording.channels[i].samples.iter_mut().zip(&reference) {
                *s -= r;
            }
        }
        Ok(())
    }
}

pub struct RereferenceStage {
    referencer: Box<dyn Rereferencer>,
    method: ReferenceMethod,
}

impl RereferenceStage {
    pub fn new(referencer: impl Rereferencer + 'static, method: ReferenceMethod) -> Self {
        Self {
            referencer: Box::new(referencer),
            method,
        }
    }
}

impl Default for RereferenceStage {
    fn default() -> Self {
        Self::new(MeanReferencer, ReferenceMethod::CommonAverage)
    }
}

impl Stage for RereferenceStage {
    fn name(&self) -> &str {
        "rereference"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        self.referencer.rereference(recording, &self.method)?;
        Ok(Some(json!(self.method)))
    }
}
