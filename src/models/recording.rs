use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of recording acquired during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingKind {
    /// Blink paradigm followed by 75 rest / audio stimuli
    Calibration,
    /// Single eyes-open resting-state block
    RestingState,
    /// Online run alternating non-regulation and regulation phases
    Neurofeedback,
}

impl RecordingKind {
    pub const ALL: [RecordingKind; 3] = [
        RecordingKind::Calibration,
        RecordingKind::RestingState,
        RecordingKind::Neurofeedback,
    ];

    /// Name of the session sub-directory holding this kind of recording
    pub fn directory_name(&self) -> &'static str {
        match self {
            RecordingKind::Calibration => "Calibration",
            RecordingKind::RestingState => "RestingState",
            RecordingKind::Neurofeedback => "Online",
        }
    }

    /// Kind token used in recording file names (`<run>-<token>-raw...`)
    pub fn file_token(&self) -> &'static str {
        match self {
            RecordingKind::Calibration => "calibration",
            RecordingKind::RestingState => "rs",
            RecordingKind::Neurofeedback => "online",
        }
    }

    pub fn from_directory_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.directory_name() == name)
    }

    pub fn from_file_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.file_token() == token)
    }
}

impl fmt::Display for RecordingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingKind::Calibration => "calibration",
            RecordingKind::RestingState => "resting-state",
            RecordingKind::Neurofeedback => "neurofeedback",
        };
        f.write_str(name)
    }
}

/// Logical coordinates of one recording file, derived from its path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingReference {
    /// Participant ID (strictly positive)
    pub participant_id: u32,
    /// Session ID (1 to 15)
    pub session_id: u32,
    /// Recording kind
    pub kind: RecordingKind,
    /// Run index within the session
    pub run_index: u32,
    /// Path to the recording file
    pub path: PathBuf,
}

impl RecordingReference {
    /// Stable ordering key: participant, session, run, then kind and path
    pub fn sort_key(&self) -> (u32, u32, u32, RecordingKind, &Path) {
        (
            self.participant_id,
            self.session_id,
            self.run_index,
            self.kind,
            self.path.as_path(),
        )
    }

    /// Human-readable measurement description
    pub fn description(&self) -> String {
        format!(
            "Subject {} - Session {} - {} {}",
            self.participant_id,
            self.session_id,
            self.kind.directory_name(),
            self.run_index
        )
    }
}

/// A timed discrete code on the stim channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventMarker {
    /// Onset, in samples from the start of the recording
    pub sample: u64,
    /// Event code
    pub code: u32,
}

/// Channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Eeg,
    Eog,
    Ecg,
    /// Trigger channel carrying the event markers
    Stim,
    Misc,
}

/// One channel of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub kind: ChannelKind,
    pub samples: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelKind, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            samples,
        }
    }
}

/// An annotated time span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Onset in seconds
    pub onset_secs: f64,
    /// Duration in seconds
    pub duration_secs: f64,
    pub description: String,
}

/// A loaded recording, owned by the worker processing it
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub reference: RecordingReference,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Channels in acquisition order; names are unique
    pub channels: Vec<Channel>,
    /// Decoded event markers, ordered by sample
    pub event_markers: Vec<EventMarker>,
    /// Channels marked as bad
    pub bad_channels: BTreeSet<String>,
    pub annotations: Vec<Annotation>,
    /// Measurement description
    pub description: Option<String>,
}

impl Recording {
    pub fn new(reference: RecordingReference, sampling_rate: f64, channels: Vec<Channel>) -> Self {
        Self {
            reference,
            sampling_rate,
            channels,
            event_markers: Vec::new(),
            bad_channels: BTreeSet::new(),
            annotations: Vec::new(),
            description: None,
        }
    }

    /// Number of samples per channel
    pub fn n_samples(&self) -> usize {
        self.channels.first().map_or(0, |c| c.samples.len())
    }

    /// Duration of the recording in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sampling_rate > 0.0 {
            self.n_samples() as f64 / self.sampling_rate
        } else {
            0.0
        }
    }

    /// The trigger channel, if the recording has one
    pub fn stim_channel(&self) -> Option<&Channel> {
        self.channels.iter().find(|c| c.kind == ChannelKind::Stim)
    }

    /// Indices of EEG channels, optionally skipping the ones marked bad
    pub fn eeg_indices(&self, exclude_bads: bool) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ChannelKind::Eeg)
            .filter(|(_, c)| !exclude_bads || !self.bad_channels.contains(&c.name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Convert a time in seconds to a sample count at this sampling rate
    pub fn secs_to_samples(&self, secs: f64) -> u64 {
        (secs * self.sampling_rate).round().max(0.0) as u64
    }

    /// Rewrite event codes in place, both on the decoded markers and on the
    /// stim channel. The mapping is applied simultaneously, so swapped codes
    /// do not collide. Returns the number of markers rewritten.
    pub fn rewrite_event_codes(&mut self, mapping: &BTreeMap<u32, u32>) -> usize {
        let mut rewritten = 0;
        for marker in &mut self.event_markers {
            if let Some(&new_code) = mapping.get(&marker.code) {
                marker.code = new_code;
                rewritten += 1;
            }
        }

        if let Some(stim) = self.channels.iter_mut().find(|c| c.kind == ChannelKind::Stim) {
            for sample in &mut stim.samples {
                if *sample <= 0.0 || !sample.is_finite() {
                    continue;
                }
                let code = sample.round() as u32;
                if let Some(&new_code) = mapping.get(&code) {
                    *sample = new_code as f64;
                }
            }
        }

        rewritten
    }
}
