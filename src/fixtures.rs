//! Synthetic recordings shared by unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::io::RecordingStore;
use crate::models::{
    Channel, ChannelKind, EventMarker, Job, Recording, RecordingKind, RecordingReference,
};

pub const SFREQ: f64 = 128.0;

fn secs(s: f64) -> u64 {
    (s * SFREQ).round() as u64
}

pub fn reference(kind: RecordingKind) -> RecordingReference {
    RecordingReference {
        participant_id: 57,
        session_id: 1,
        kind,
        run_index: 1,
        path: PathBuf::from(format!(
            "057/Session 1/{}/1-{}-raw.json",
            kind.directory_name(),
            kind.file_token()
        )),
    }
}

/// A job on a well-formed recording of `kind`, stored under `in/`
pub fn job(kind: RecordingKind, run_index: u32) -> Job {
    let reference = RecordingReference {
        run_index,
        path: PathBuf::from(format!(
            "in/057/Session 1/{}/{}-{}-raw.json",
            kind.directory_name(),
            run_index,
            kind.file_token()
        )),
        ..reference(kind)
    };
    Job::new(reference, "in", "out")
}

/// Well-formed markers for a recording kind
pub fn markers(kind: RecordingKind) -> Vec<EventMarker> {
    match kind {
        RecordingKind::Calibration => calibration_markers(2, 1, 4),
        RecordingKind::RestingState => resting_state_markers(3),
        RecordingKind::Neurofeedback => neurofeedback_markers(6, 5),
    }
}

/// Blink at 1s, then 75 rest / audio pairs every 2 seconds
pub fn calibration_markers(blink: u32, rest: u32, audio: u32) -> Vec<EventMarker> {
    let mut markers = vec![EventMarker { sample: secs(1.0), code: blink }];
    for k in 0..75 {
        let onset = 62.0 + 2.0 * k as f64;
        markers.push(EventMarker { sample: secs(onset), code: rest });
        markers.push(EventMarker { sample: secs(onset + 1.0), code: audio });
    }
    markers
}

pub fn resting_state_markers(code: u32) -> Vec<EventMarker> {
    vec![EventMarker { sample: secs(1.0), code }]
}

/// Onset (in seconds) of each non-regulation phase; the first phase lasts
/// 15s, the following ones 8s, regulation phases 16s
pub fn non_regulation_onsets() -> Vec<f64> {
    (0..10)
        .map(|k| if k == 0 { 1.0 } else { 8.0 + 24.0 * k as f64 })
        .collect()
}

pub fn neurofeedback_markers(non_regulation: u32, regulation: u32) -> Vec<EventMarker> {
    let mut markers = Vec::new();
    for (k, onset) in non_regulation_onsets().into_iter().enumerate() {
        let phase_length = if k == 0 { 15.0 } else { 8.0 };
        markers.push(EventMarker { sample: secs(onset), code: non_regulation });
        markers.push(EventMarker { sample: secs(onset + phase_length), code: regulation });
    }
    markers
}

/// A recording with three EEG channels and a stim channel carrying `markers`
pub fn recording(kind: RecordingKind, markers: Vec<EventMarker>) -> Recording {
    let last = markers.last().map_or(0, |m| m.sample);
    let n_samples = (last + secs(20.0)) as usize;

    let mut stim = vec![0.0; n_samples];
    for marker in &markers {
        stim[marker.sample as usize] = marker.code as f64;
    }

    let eeg = |name: &str, freq: f64, gain: f64| {
        let samples = (0..n_samples)
            .map(|i| gain * (2.0 * std::f64::consts::PI * freq * i as f64 / SFREQ).sin())
            .collect();
        Channel::new(name, ChannelKind::Eeg, samples)
    };

    let channels = vec![
        eeg("Fz", 10.0, 1.0),
        eeg("Cz", 11.0, 1.1),
        eeg("Pz", 12.0, 0.9),
        Channel::new("TRIGGER", ChannelKind::Stim, stim),
    ];

    let mut recording = Recording::new(reference(kind), SFREQ, channels);
    recording.event_markers = markers;
    recording
}

/// Recordings kept in memory, keyed by path
#[derive(Default)]
pub struct MemoryStore {
    pub recordings: Mutex<BTreeMap<PathBuf, Recording>>,
    pub saved: Mutex<BTreeMap<PathBuf, Recording>>,
}

impl MemoryStore {
    /// A store holding one recording per job, with the given markers
    pub fn with_jobs(jobs: &[Job], markers: impl Fn(&Job) -> Vec<EventMarker>) -> Self {
        let store = Self::default();
        for job in jobs {
            let mut recording = recording(job.reference.kind, markers(job));
            recording.reference = job.reference.clone();
            recording.event_markers.clear();
            store
                .recordings
                .lock()
                .unwrap()
                .insert(job.reference.path.clone(), recording);
        }
        store
    }
}

impl RecordingStore for MemoryStore {
    fn load(&self, reference: &RecordingReference) -> Result<Recording> {
        self.recordings
            .lock()
            .unwrap()
            .get(&reference.path)
            .cloned()
            .with_context(|| format!("Failed to read file: {:?}", reference.path))
    }

    fn save(&self, recording: &Recording, path: &Path) -> Result<()> {
        self.saved
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), recording.clone());
        Ok(())
    }
}
