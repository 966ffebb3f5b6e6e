use anyhow::{Context, Result};

use crate::models::{EventMarker, Recording};

/// Extracts the event-marker stream from a recording
pub trait EventDecoder: Send + Sync {
    fn decode(&self, recording: &Recording) -> Result<Vec<EventMarker>>;
}

/// Decodes markers from the recording's stim channel
#[derive(Debug, Clone, Default)]
pub struct TriggerChannelDecoder;

impl EventDecoder for TriggerChannelDecoder {
    fn decode(&self, recording: &Recording) -> Result<Vec<EventMarker>> {
        let stim = recording
            .stim_channel()
            .context("Recording has no stim channel")?;
        Ok(find_events(&stim.samples))
    }
}

/// Find event onsets on a trigger signal.
///
/// A marker is emitted at every sample where the signal takes a non-zero
/// value different from the previous sample. Negative and non-finite values
/// count as zero.
pub fn find_events(samples: &[f64]) -> Vec<EventMarker> {
    let mut markers = Vec::new();
    let mut previous = 0u32;

    for (index, &value) in samples.iter().enumerate() {
        let code = if value.is_finite() && value > 0.0 {
            value.round() as u32
        } else {
            0
        };

        if code != 0 && code != previous {
            markers.push(EventMarker {
                sample: index as u64,
                code,
            });
        }
        previous = code;
    }

    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_events_pulses() {
        let samples = vec![0.0, 2.0, 2.0, 0.0, 0.0, 1.0, 0.0, 4.0, 4.0, 4.0];
        let markers = find_events(&samples);

        assert_eq!(
            markers,
            vec![
                EventMarker { sample: 1, code: 2 },
                EventMarker { sample: 5, code: 1 },
                EventMarker { sample: 7, code: 4 },
            ]
        );
    }

    #[test]
    fn test_find_events_back_to_back_codes() {
        let samples = vec![6.0, 6.0, 5.0, 5.0, 0.0];
        let markers = find_events(&samples);

        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0], EventMarker { sample: 0, code: 6 });
        assert_eq!(markers[1], EventMarker { sample: 2, code: 5 });
    }

    #[test]
    fn test_find_events_ignores_noise() {
        let samples = vec![f64::NAN, -3.0, 0.2, 0.0];
        assert!(find_events(&samples).is_empty());
    }
}
