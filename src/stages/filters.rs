use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::Stage;
use crate::error::ConfigError;
use crate::models::{ChannelKind, Recording};

/// Channels a filter applies to. The stim channel is never selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelector {
    Eeg,
    /// EOG and ECG channels
    Auxiliary,
    All,
    Named(Vec<String>),
}

impl ChannelSelector {
    /// Indices of the selected channels in acquisition order
    pub fn indices(&self, recording: &Recording) -> Result<Vec<usize>> {
        let selectable = |kind: ChannelKind| kind != ChannelKind::Stim;

        let indices = match self {
            ChannelSelector::Eeg => kind_indices(recording, |k| k == ChannelKind::Eeg),
            ChannelSelector::Auxiliary => {
                kind_indices(recording, |k| matches!(k, ChannelKind::Eog | ChannelKind::Ecg))
            }
            ChannelSelector::All => kind_indices(recording, selectable),
            ChannelSelector::Named(names) => names
                .iter()
                .map(|name| {
                    recording
                        .channels
                        .iter()
                        .position(|c| &c.name == name && selectable(c.kind))
                        .with_context(|| format!("No filterable channel named '{}'", name))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(indices)
    }
}

fn kind_indices(recording: &Recording, keep: impl Fn(ChannelKind) -> bool) -> Vec<usize> {
    recording
        .channels
        .iter()
        .enumerate()
        .filter(|(_, c)| keep(c.kind))
        .map(|(i, _)| i)
        .collect()
}

/// Frequency-domain filtering capability
pub trait SignalFilter: Send + Sync {
    fn bandpass(
        &self,
        recording: &mut Recording,
        low_hz: f64,
        high_hz: f64,
        channels: &[usize],
    ) -> Result<()>;

    fn notch(&self, recording: &mut Recording, freqs_hz: &[f64], channels: &[usize]) -> Result<()>;
}

/// Configuration for the bandpass stage
#[derive(Debug, Clone)]
pub struct BandpassConfig {
    pub low_hz: f64,
    pub high_hz: f64,
    pub channels: ChannelSelector,
}

impl Default for BandpassConfig {
    fn default() -> Self {
        Self {
            low_hz: 1.0,
            high_hz: 40.0,
            channels: ChannelSelector::Eeg,
        }
    }
}

/// Configuration for the notch stage (power line and harmonics)
#[derive(Debug, Clone)]
pub struct NotchConfig {
    pub freqs_hz: Vec<f64>,
    pub channels: ChannelSelector,
}

impl Default for NotchConfig {
    fn default() -> Self {
        Self {
            freqs_hz: vec![50.0, 100.0, 150.0],
            channels: ChannelSelector::All,
        }
    }
}

fn check_below_nyquist(recording: &Recording, freq_hz: f64) -> Result<()> {
    let nyquist = recording.sampling_rate / 2.0;
    if freq_hz >= nyquist {
        bail!(
            "{} Hz is above the Nyquist frequency ({} Hz) of the recording",
            freq_hz,
            nyquist
        );
    }
    Ok(())
}

pub struct BandpassFilterStage {
    filter: Box<dyn SignalFilter>,
    config: BandpassConfig,
}

impl BandpassFilterStage {
    pub fn new(
        filter: impl SignalFilter + 'static,
        config: BandpassConfig,
    ) -> Result<Self, ConfigError> {
        if !(config.low_hz > 0.0 && config.low_hz < config.high_hz) {
            return Err(ConfigError::InvalidFilter(format!(
                "bandpass needs 0 < low < high, got {} - {} Hz",
                config.low_hz, config.high_hz
            )));
        }
        Ok(Self {
            filter: Box::new(filter),
            config,
        })
    }
}

impl Stage for BandpassFilterStage {
    fn name(&self) -> &str {
        "bandpass"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        check_below_nyquist(recording, self.config.high_hz)?;
        let channels = self.config.channels.indices(recording)?;

        info!(
            "Bandpass {} - {} Hz on {} channels",
            self.config.low_hz,
            self.config.high_hz,
            channels.len()
        );
        self.filter
            .bandpass(recording, self.config.low_hz, self.config.high_hz, &channels)?;

        Ok(Some(json!({
            "low_hz": self.config.low_hz,
            "high_hz": self.config.high_hz,
            "channels": channels.len(),
        })))
    }
}

pub struct NotchFilterStage {
    filter: Box<dyn SignalFilter>,
    config: NotchConfig,
}

impl NotchFilterStage {
    pub fn new(filter: impl SignalFilter + 'static, config: NotchConfig) -> Result<Self, ConfigError> {
        if config.freqs_hz.is_empty() || config.freqs_hz.iter().any(|f| !(*f > 0.0)) {
            return Err(ConfigError::InvalidFilter(format!(
                "notch needs positive frequencies, got {:?}",
                config.freqs_hz
            )));
        }
        Ok(Self {
            filter: Box::new(filter),
            config,
        })
    }
}

impl Stage for NotchFilterStage {
    fn name(&self) -> &str {
        "notch"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        // Harmonics above Nyquist cannot be represented; drop them
        let nyquist = recording.sampling_rate / 2.0;
        let freqs: Vec<f64> = self
            .config
            .freqs_hz
            .iter()
            .copied()
            .filter(|f| *f < nyquist)
            .collect();
        if freqs.is_empty() {
            return Ok(None);
        }

        let channels = self.config.channels.indices(recording)?;
        info!("Notch {:?} Hz on {} channels", freqs, channels.len());
        self.filter.notch(recording, &freqs, &channels)?;

        Ok(Some(json!({ "freqs_hz": freqs })))
    }
}
