use tracing::{debug, warn};

use crate::error::SegmentError;
use crate::models::{
    EventKind, EventMarker, FixedLengthConfig, Phase, PhaseWindows, ProtocolTable, Recording,
    RecordingKind, SegmentConfig, Window,
};

/// Splits validated neurofeedback recordings into labeled phase windows
#[derive(Debug, Clone)]
pub struct PhaseSegmenter {
    non_regulation_code: u32,
    regulation_code: u32,
    non_regulation_secs: f64,
    regulation_secs: f64,
    config: SegmentConfig,
}

impl PhaseSegmenter {
    pub fn new(table: &ProtocolTable, config: SegmentConfig) -> Self {
        Self {
            non_regulation_code: table.code(EventKind::NonRegulation),
            regulation_code: table.code(EventKind::Regulation),
            non_regulation_secs: table.duration_secs(EventKind::NonRegulation),
            regulation_secs: table.duration_secs(EventKind::Regulation),
            config,
        }
    }

    /// Segment a recording into one window per phase and block, re-tiled
    /// into sliding sub-windows when the config asks for it
    pub fn segment(&self, recording: &Recording) -> Result<PhaseWindows, SegmentError> {
        let phases = self.phase_windows(recording)?;

        match self.config.fixed_length {
            Some(FixedLengthConfig {
                duration_secs,
                overlap_secs,
            }) => retile(&phases, duration_secs, overlap_secs),
            None => Ok(phases),
        }
    }

    /// Segment a recording into sliding sub-windows of `duration_secs`,
    /// stepping by `duration_secs - overlap_secs`. Sub-windows never cross a
    /// phase boundary; the tail of a phase shorter than one window is dropped.
    pub fn segment_fixed_length(
        &self,
        recording: &Recording,
        duration_secs: f64,
        overlap_secs: f64,
    ) -> Result<PhaseWindows, SegmentError> {
        check_windowing(duration_secs, overlap_secs)?;
        let phases = self.phase_windows(recording)?;
        retile(&phases, duration_secs, overlap_secs)
    }

    /// One window per marker, opened by the marker and lasting the nominal
    /// duration of its phase. Windows are cut at the end of the recording;
    /// a marker on or past the last sample opens no window.
    fn phase_windows(&self, recording: &Recording) -> Result<PhaseWindows, SegmentError> {
        let kind = recording.reference.kind;
        if kind != RecordingKind::Neurofeedback {
            return Err(SegmentError::UnsupportedKind(kind));
        }

        let markers = &recording.event_markers;
        if markers.is_empty() || markers.len() % 2 != 0 {
            return Err(SegmentError::UnexpectedMarkers(format!(
                "expected non-regulation / regulation pairs, found {} markers",
                markers.len()
            )));
        }

        let n_samples = recording.n_samples() as u64;
        let mut windows = PhaseWindows::new(recording.sampling_rate);
        for (index, marker) in markers.iter().enumerate() {
            let phase = self.phase_of(marker)?;
            let expected = if index % 2 == 0 {
                Phase::NonRegulation
            } else {
                Phase::Regulation
            };
            if phase != expected {
                return Err(SegmentError::UnexpectedMarkers(format!(
                    "event {} at sample {} opens a {} phase, expected {}",
                    index, marker.sample, phase, expected
                )));
            }

            let mut duration_secs = match phase {
                Phase::NonRegulation => self.non_regulation_secs,
                Phase::Regulation => self.regulation_secs,
            };
            // Warm-up: the first non-regulation phase runs longer
            if index == 0 {
                duration_secs += self.config.first_phase_extension_secs;
            }

            if marker.sample >= n_samples {
                warn!(
                    "{:?}: {} phase {} starts after the end of the recording",
                    recording.reference.path,
                    phase,
                    index / 2
                );
                continue;
            }

            let nominal = recording.secs_to_samples(duration_secs);
            let duration = nominal.min(n_samples - marker.sample);
            if duration < nominal {
                warn!(
                    "{:?}: {} phase {} truncated to {} samples",
                    recording.reference.path,
                    phase,
                    index / 2,
                    duration
                );
            }

            windows.push(Window {
                phase,
                block_index: index / 2,
                start: marker.sample,
                duration,
            });
        }

        debug!(
            "{:?}: {} phase windows",
            recording.reference.path,
            windows.total_windows()
        );
        Ok(windows)
    }

    fn phase_of(&self, marker: &EventMarker) -> Result<Phase, SegmentError> {
        if marker.code == self.non_regulation_code {
            Ok(Phase::NonRegulation)
        } else if marker.code == self.regulation_code {
            Ok(Phase::Regulation)
        } else {
            Err(SegmentError::UnexpectedMarkers(format!(
                "code {} at sample {} is not a neurofeedback phase",
                marker.code, marker.sample
            )))
        }
    }
}

fn check_windowing(duration_secs: f64, overlap_secs: f64) -> Result<(), SegmentError> {
    let valid = duration_secs.is_finite()
        && duration_secs > 0.0
        && overlap_secs >= 0.0
        && overlap_secs < duration_secs;

    if valid {
        Ok(())
    } else {
        Err(SegmentError::InvalidWindowing {
            duration_secs,
            overlap_secs,
        })
    }
}

fn retile(
    phases: &PhaseWindows,
    duration_secs: f64,
    overlap_secs: f64,
) -> Result<PhaseWindows, SegmentError> {
    check_windowing(duration_secs, overlap_secs)?;

    let to_samples = |secs: f64| (secs * phases.sampling_rate).round().max(0.0) as u64;
    let duration = to_samples(duration_secs);
    let step = duration.saturating_sub(to_samples(overlap_secs));
    if duration == 0 || step == 0 {
        return Err(SegmentError::InvalidWindowing {
            duration_secs,
            overlap_secs,
        });
    }

    let mut tiled = PhaseWindows::new(phases.sampling_rate);
    for parent in phases.timeline() {
        let mut start = parent.start;
        while start + duration <= parent.end() {
            tiled.push(Window {
                phase: parent.phase,
                block_index: parent.block_index,
                start,
                duration,
            });
            start += step;
        }
    }

    Ok(tiled)
}
