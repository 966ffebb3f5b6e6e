use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::EventKind;

/// Configuration for phase segmentation
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Extension of the first non-regulation phase in seconds (protocol warm-up)
    pub first_phase_extension_secs: f64,
    /// Re-tile each phase into fixed-length sub-windows when set
    pub fixed_length: Option<FixedLengthConfig>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            first_phase_extension_secs: 7.0,
            fixed_length: None,
        }
    }
}

/// Sliding window parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedLengthConfig {
    /// Sub-window length in seconds
    pub duration_secs: f64,
    /// Overlap between consecutive sub-windows in seconds
    pub overlap_secs: f64,
}

impl Default for FixedLengthConfig {
    fn default() -> Self {
        Self {
            duration_secs: 4.0,
            overlap_secs: 3.0,
        }
    }
}

/// Phase of a neurofeedback run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    NonRegulation,
    Regulation,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        self.event().label()
    }

    /// Event opening this phase
    pub fn event(&self) -> EventKind {
        match self {
            Phase::NonRegulation => EventKind::NonRegulation,
            Phase::Regulation => EventKind::Regulation,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A labeled analysis window, in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub phase: Phase,
    /// Index of the non-regulation / regulation pair (0 to 9)
    pub block_index: usize,
    /// First sample of the window
    pub start: u64,
    /// Length of the window in samples
    pub duration: u64,
}

impl Window {
    /// Exclusive end sample
    pub fn end(&self) -> u64 {
        self.start + self.duration
    }

    pub fn duration_secs(&self, sampling_rate: f64) -> f64 {
        self.duration as f64 / sampling_rate
    }

    /// Check if a sample falls inside this window
    pub fn contains(&self, sample: u64) -> bool {
        sample >= self.start && sample < self.end()
    }
}

/// Windows of a segmented recording, grouped by phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseWindows {
    pub sampling_rate: f64,
    windows: BTreeMap<Phase, Vec<Window>>,
}

impl PhaseWindows {
    pub fn new(sampling_rate: f64) -> Self {
        Self {
            sampling_rate,
            windows: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, window: Window) {
        self.windows.entry(window.phase).or_default().push(window);
    }

    /// Windows of one phase, in temporal order
    pub fn get(&self, phase: Phase) -> &[Window] {
        self.windows.get(&phase).map_or(&[], Vec::as_slice)
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.get(phase).len()
    }

    /// Total number of windows
    pub fn total_windows(&self) -> usize {
        self.windows.values().map(Vec::len).sum()
    }

    /// Windows of one phase and one block
    pub fn block(&self, phase: Phase, block_index: usize) -> impl Iterator<Item = &Window> {
        self.get(phase)
            .iter()
            .filter(move |w| w.block_index == block_index)
    }

    /// Concatenated length of all windows of a phase, in samples
    pub fn total_duration(&self, phase: Phase) -> u64 {
        self.get(phase).iter().map(|w| w.duration).sum()
    }

    /// All windows across phases, ordered on the experimental timeline
    pub fn timeline(&self) -> Vec<Window> {
        let mut all: Vec<Window> = self.windows.values().flatten().copied().collect();
        all.sort_by_key(|w| (w.start, w.phase));
        all
    }
}
