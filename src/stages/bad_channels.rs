use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::Stage;
use crate::models::Recording;

/// Detects channels that should be excluded from analysis
pub trait BadChannelDetector: Send + Sync {
    fn detect(&self, recording: &Recording) -> Result<BTreeSet<String>>;
}

/// Flags EEG channels that are flat or whose amplitude is an outlier.
///
/// Outliers are found on the per-channel standard deviation with a robust
/// z-score (median and median absolute deviation).
#[derive(Debug, Clone)]
pub struct DeviationDetector {
    /// Channels with a standard deviation below this are flat
    pub flat_std: f64,
    /// Robust z-score above which a channel is an outlier
    pub z_threshold: f64,
}

impl Default for DeviationDetector {
    fn default() -> Self {
        Self {
            flat_std: 1e-12,
            z_threshold: 5.0,
        }
    }
}

impl BadChannelDetector for DeviationDetector {
    fn detect(&self, recording: &Recording) -> Result<BTreeSet<String>> {
        let indices = recording.eeg_indices(false);
        let stds: Vec<f64> = indices
            .iter()
            .map(|&i| std_dev(&recording.channels[i].samples))
            .collect();

        let mut bads = BTreeSet::new();
        for (&i, &std) in indices.iter().zip(&stds) {
            if std < self.flat_std {
                bads.insert(recording.channels[i].name.clone());
            }
        }

        let center = median(&stds);
        let deviations: Vec<f64> = stds.iter().map(|s| (s - center).abs()).collect();
        let mad = median(&deviations);
        if mad > 0.0 {
            for (&i, &std) in indices.iter().zip(&stds) {
                // 0.6745 scales the MAD to a standard deviation for normal data
                let z = 0.6745 * (std - center) / mad;
                if z.abs() > self.z_threshold {
                    bads.insert(recording.channels[i].name.clone());
                }
            }
        }

        Ok(bads)
    }
}

fn std_dev(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    (samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Adds detected channels to the recording's bad set
pub struct BadChannelStage {
    detector: Box<dyn BadChannelDetector>,
}

impl BadChannelStage {
    pub fn new(detector: impl BadChannelDetector + 'static) -> Self {
        Self {
            detector: Box::new(detector),
        }
    }
}

impl Default for BadChannelStage {
    fn default() -> Self {
        Self::new(DeviationDetector::default())
    }
}

impl Stage for BadChannelStage {
    fn name(&self) -> &str {
        "bad_channels"
    }

    fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
        let detected = self.detector.detect(recording)?;
        if !detected.is_empty() {
            info!(
                "{:?}: bad channels {:?}",
                recording.reference.path, detected
            );
        }
        recording.bad_channels.extend(detected);

        Ok(Some(json!(recording.bad_channels)))
    }
}
