use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde_json::json;
use tracing::info;

use super::Stage;
use crate::models::{ChannelKind, Recording};

/// Reconstructs bad channels from the good ones
pub trait ChannelInterpolator: Send + Sync {
    /// Interpolate `channels` in place and return the names that were
    /// reconstructed
    fn interpolate(&self, recording: &mut Recording, channels: &BTreeSet<String>) -> Result<Vec<String>>;
}

/// Replaces each bad EEG channel with the mean of the good EEG channels.
/// Bad channels of other kinds are left as they are.
#[derive(Debug, Clone, Default)]
pub struct MeanInterpolator;

impl ChannelInterpolator for MeanInterpolator {
    fn interpolate(&self, recording: &mut Recording, channels: &BTreeSet<String>) -> Result<Vec<String>> {
        let targets: Vec<usize> = recording
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ChannelKind::Eeg && channels.contains(&c.name))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let sources: Vec<usize> = recording
            .eeg_indices(false)
            .into_iter()
            .filter(|i| !channels.contains(&recording.channels[*i].name))
            .collect();
        if sources.is_empty() {
            bail!("No good EEG channel left to interpolate from");
        }

        let n_samples = recording.n_samples();
        let mut mean = vec![0.0; n_samples];
        for &i in &sources {
            for (acc, s) in mean.iter_mut().zip(&recording.channels[i].samples) {
                *acc += s;
            }
        }
        let n_sources = sources.len() as f64;
        mean.iter_mut().for_each(|m| *m /= n_sources);

        let mut interpolated = Vec::with_capacity(targets.len());
        for i in targets {
            recording.channels[i].samples = mean.clone();
            interpolated.push(recording.channels[i].name.clone());
        }
        Ok(interpolated)
    }
}

/// Interpolates the recording's bad channels and clears them from the bad set
pub struct InterpolateStage {
    interpolator: Box<dyn ChannelInterpolator>,
}

impl InterpolateStage {
    pub fn new(interpolator: impl ChannelInterpolator + 'static) -> Self {
        Self {
            interpolator: Box::new(interpolator),
        }
    }
}

impl Default for InterpolateStage {
    fn default() -> Self {
        Self::new(MeanInterpolator)
    }
}

impl Stage for InterpolateStage {
    fn name(&self) -> &str {
        "interpolate"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        if recording.bad_channels.is_empty() {
            return Ok(None);
        }

        let bads = recording.bad_channels.clone();
        let interpolated = self.interpolator.interpolate(recording, &bads)?;
        for name in &interpolated {
            recording.bad_channels.remove(name);
        }
        info!("Interpolated {} channels", interpolated.len());

        Ok(Some(json!(interpolated)))
    }
}
