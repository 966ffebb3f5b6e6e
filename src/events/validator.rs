use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::models::{EventKind, EventMarker, ProtocolTable, Recording, RecordingKind};

/// A code value corrected in place on the marker stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeRewrite {
    /// Meaning assigned to the group of markers
    pub event: EventKind,
    /// Observed code
    pub from: u32,
    /// Expected code written in its place
    pub to: u32,
}

/// Result of checking a recording against its protocol
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The stream matches the protocol as recorded
    Valid,
    /// Counts and positions matched but some code values were corrected
    SelfHealed(Vec<CodeRewrite>),
    /// The stream cannot match the protocol
    Rejected(ProtocolError),
}

impl ValidationOutcome {
    /// Rewrites applied on acceptance, the protocol error on rejection
    pub fn into_result(self) -> Result<Vec<CodeRewrite>, ProtocolError> {
        match self {
            ValidationOutcome::Valid => Ok(Vec::new()),
            ValidationOutcome::SelfHealed(rewrites) => Ok(rewrites),
            ValidationOutcome::Rejected(err) => Err(err),
        }
    }
}

/// Markers sharing one code
#[derive(Debug, Clone, Copy)]
struct CodeGroup {
    code: u32,
    count: usize,
    first_sample: u64,
}

/// Checks event-marker streams against the protocol of their recording kind
#[derive(Debug, Clone, Default)]
pub struct ProtocolValidator {
    table: ProtocolTable,
}

impl ProtocolValidator {
    pub fn new(table: ProtocolTable) -> Self {
        Self { table }
    }

    /// Validate a recording's markers, correcting mislabeled codes in place.
    ///
    /// The recording is left untouched when the outcome is `Valid` or
    /// `Rejected`.
    pub fn validate(&self, recording: &mut Recording) -> ValidationOutcome {
        let kind = recording.reference.kind;

        match self.plan(kind, &recording.event_markers) {
            Err(err) => {
                warn!("{:?}: {}", recording.reference.path, err);
                ValidationOutcome::Rejected(err)
            }
            Ok(rewrites) if rewrites.is_empty() => {
                debug!(
                    "{:?}: {} events match the {} protocol",
                    recording.reference.path,
                    recording.event_markers.len(),
                    kind
                );
                ValidationOutcome::Valid
            }
            Ok(rewrites) => {
                let mapping: BTreeMap<u32, u32> = rewrites.iter().map(|r| (r.from, r.to)).collect();
                let rewritten = recording.rewrite_event_codes(&mapping);
                for rewrite in &rewrites {
                    warn!(
                        "{:?}: {} events recorded with code {} instead of {}, corrected",
                        recording.reference.path, rewrite.event, rewrite.from, rewrite.to
                    );
                }
                debug!("{} markers rewritten", rewritten);
                ValidationOutcome::SelfHealed(rewrites)
            }
        }
    }

    /// Compute the code rewrites needed for `markers` to match the protocol
    /// of `kind`, without touching anything.
    ///
    /// 1. Distinct codes and their counts must match the protocol, ignoring order
    /// 2. Code groups, ordered by first occurrence, must have the expected count
    ///    at each position
    /// 3. Alternating protocols must cycle through the groups marker by marker
    /// 4. Groups whose code differs from the expected one are rewritten
    pub fn plan(
        &self,
        kind: RecordingKind,
        markers: &[EventMarker],
    ) -> Result<Vec<CodeRewrite>, ProtocolError> {
        let protocol = self.table.spec(kind);
        let groups = group_codes(markers);

        // 1. Structural check
        if groups.len() != protocol.groups.len() {
            let codes: Vec<u32> = groups.iter().map(|g| g.code).collect();
            return Err(ProtocolError::StructuralMismatch {
                kind,
                reason: format!(
                    "expected {} distinct event codes, found {} {:?}",
                    protocol.groups.len(),
                    groups.len(),
                    codes
                ),
            });
        }

        let mut observed: Vec<usize> = groups.iter().map(|g| g.count).collect();
        let mut expected: Vec<usize> = protocol.groups.iter().map(|g| g.count).collect();
        observed.sort_unstable();
        expected.sort_unstable();
        if observed != expected {
            return Err(ProtocolError::StructuralMismatch {
                kind,
                reason: format!("expected event counts {:?}, found {:?}", expected, observed),
            });
        }

        // 2. Positional check
        for (position, (group, expected)) in groups.iter().zip(&protocol.groups).enumerate() {
            if group.count != expected.count {
                return Err(ProtocolError::OrderingMismatch {
                    kind,
                    reason: format!(
                        "group {} should hold {} x {}, but code {} occurs {} times",
                        position, expected.count, expected.event, group.code, group.count
                    ),
                });
            }
        }

        // 3. Alternation check
        if protocol.alternating {
            let position_of: BTreeMap<u32, usize> =
                groups.iter().enumerate().map(|(i, g)| (g.code, i)).collect();
            let mut ordered = markers.to_vec();
            ordered.sort_by_key(|m| m.sample);

            for (index, marker) in ordered.iter().enumerate() {
                if position_of[&marker.code] != index % groups.len() {
                    return Err(ProtocolError::OrderingMismatch {
                        kind,
                        reason: format!(
                            "event {} (code {} at sample {}) breaks the alternation",
                            index, marker.code, marker.sample
                        ),
                    });
                }
            }
        }

        // 4. Semantic check
        let rewrites = groups
            .iter()
            .zip(&protocol.groups)
            .filter_map(|(group, expected)| {
                let to = self.table.code(expected.event);
                (group.code != to).then_some(CodeRewrite {
                    event: expected.event,
                    from: group.code,
                    to,
                })
            })
            .collect();

        Ok(rewrites)
    }
}

/// Group markers by code, ordered by first occurrence
fn group_codes(markers: &[EventMarker]) -> Vec<CodeGroup> {
    let mut by_code: BTreeMap<u32, CodeGroup> = BTreeMap::new();
    for marker in markers {
        let group = by_code.entry(marker.code).or_insert(CodeGroup {
            code: marker.code,
            count: 0,
            first_sample: marker.sample,
        });
        group.count += 1;
        group.first_sample = group.first_sample.min(marker.sample);
    }

    let mut groups: Vec<CodeGroup> = by_code.into_values().collect();
    groups.sort_by_key(|g| (g.first_sample, g.code));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::find_events;
    use crate::fixtures;

    fn count(recording: &Recording, code: u32) -> usize {
        recording.event_markers.iter().filter(|m| m.code == code).count()
    }

    #[test]
    fn test_valid_calibration() {
        let validator = ProtocolValidator::default();
        let mut recording =
            fixtures::recording(RecordingKind::Calibration, fixtures::calibration_markers(2, 1, 4));

        assert_eq!(validator.validate(&mut recording), ValidationOutcome::Valid);
        assert_eq!(count(&recording, 2), 1);
        assert_eq!(count(&recording, 2) + count(&recording, 1) + count(&recording, 4), 151);
    }

    #[test]
    fn test_calibration_wrong_blink_code_is_healed() {
        let validator = ProtocolValidator::default();
        let mut recording =
            fixtures::recording(RecordingKind::Calibration, fixtures::calibration_markers(9, 1, 4));

        let outcome = validator.validate(&mut recording);

        assert_eq!(
            outcome,
            ValidationOutcome::SelfHealed(vec![CodeRewrite {
                event: EventKind::Blink,
                from: 9,
                to: 2,
            }])
        );
        assert_eq!(recording.event_markers[0].code, 2);
        assert_eq!(count(&recording, 9), 0);

        // the stim channel carries the corrected code too
        let stim = recording.stim_channel().unwrap();
        assert_eq!(find_events(&stim.samples), recording.event_markers);
    }

    #[test]
    fn test_calibration_swapped_codes_are_healed() {
        let validator = ProtocolValidator::default();
        let mut recording =
            fixtures::recording(RecordingKind::Calibration, fixtures::calibration_markers(2, 4, 1));

        let rewrites = validator.validate(&mut recording).into_result().unwrap();

        assert_eq!(rewrites.len(), 2);
        assert_eq!(recording.event_markers[1].code, 1);
        assert_eq!(recording.event_markers[2].code, 4);
        assert_eq!(count(&recording, 1), 75);
        assert_eq!(count(&recording, 4), 75);
    }

    #[test]
    fn test_calibration_wrong_counts_rejected() {
        let validator = ProtocolValidator::default();
        let mut markers = fixtures::calibration_markers(2, 1, 4);
        // turn one rest into a second blink: counts (2, 74, 75)
        markers[1].code = 2;
        let mut recording = fixtures::recording(RecordingKind::Calibration, markers.clone());

        let outcome = validator.validate(&mut recording);

        assert!(matches!(
            outcome,
            ValidationOutcome::Rejected(ProtocolError::StructuralMismatch { .. })
        ));
        assert_eq!(recording.event_markers, markers);
    }

    #[test]
    fn test_calibration_blink_not_first_rejected() {
        let validator = ProtocolValidator::default();
        let mut markers = fixtures::calibration_markers(2, 1, 4);
        let last = markers.last().unwrap().sample;
        markers[0].sample = last + 100;
        markers.sort_by_key(|m| m.sample);

        let err = validator
            .plan(RecordingKind::Calibration, &markers)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::OrderingMismatch { .. }));
    }

    #[test]
    fn test_calibration_missing_code_rejected() {
        let validator = ProtocolValidator::default();
        let markers: Vec<EventMarker> = fixtures::calibration_markers(2, 1, 4)
            .into_iter()
            .filter(|m| m.code != 4)
            .collect();

        let err = validator
            .plan(RecordingKind::Calibration, &markers)
            .unwrap_err();
        assert!(err.to_string().contains("expected 3 distinct event codes"));
    }

    #[test]
    fn test_resting_state() {
        let validator = ProtocolValidator::default();

        assert!(validator
            .plan(RecordingKind::RestingState, &fixtures::resting_state_markers(3))
            .unwrap()
            .is_empty());

        let rewrites = validator
            .plan(RecordingKind::RestingState, &fixtures::resting_state_markers(7))
            .unwrap();
        assert_eq!(rewrites[0].to, 3);

        let mut two = fixtures::resting_state_markers(3);
        two.push(EventMarker { sample: 500, code: 3 });
        assert!(validator.plan(RecordingKind::RestingState, &two).is_err());
        assert!(validator.plan(RecordingKind::RestingState, &[]).is_err());
    }

    #[test]
    fn test_neurofeedback_swapped_codes_are_healed() {
        let validator = ProtocolValidator::default();
        let mut recording = fixtures::recording(
            RecordingKind::Neurofeedback,
            fixtures::neurofeedback_markers(5, 6),
        );

        let rewrites = validator.validate(&mut recording).into_result().unwrap();

        assert_eq!(rewrites.len(), 2);
        assert_eq!(recording.event_markers[0].code, 6);
        assert_eq!(recording.event_markers[1].code, 5);
    }

    #[test]
    fn test_healed_stream_matches_custom_codes() {
        let table = ProtocolTable::default()
            .with_event(
                EventKind::Audio,
                crate::models::EventDefinition { code: 40, duration_secs: 0.8 },
            )
            .unwrap();
        let validator = ProtocolValidator::new(table);
        let mut recording =
            fixtures::recording(RecordingKind::Calibration, fixtures::calibration_markers(2, 1, 4));

        let rewrites = validator.validate(&mut recording).into_result().unwrap();
        assert_eq!(
            rewrites,
            vec![CodeRewrite { event: EventKind::Audio, from: 4, to: 40 }]
        );
        assert_eq!(count(&recording, 40), 75);

        // an accepted stream matches its protocol as is
        assert_eq!(validator.validate(&mut recording), ValidationOutcome::Valid);
    }

    #[test]
    fn test_custom_neurofeedback_protocol() {
        let spec = crate::models::ProtocolSpec {
            groups: vec![
                crate::models::ExpectedGroup { event: EventKind::NonRegulation, count: 3 },
                crate::models::ExpectedGroup { event: EventKind::Regulation, count: 3 },
            ],
            alternating: true,
        };
        let table = ProtocolTable::default()
            .with_spec(RecordingKind::Neurofeedback, spec)
            .unwrap();
        let validator = ProtocolValidator::new(table);

        let markers = fixtures::neurofeedback_markers(6, 5);
        assert!(validator.plan(RecordingKind::Neurofeedback, &markers[..6]).unwrap().is_empty());
        assert!(matches!(
            validator.plan(RecordingKind::Neurofeedback, &markers),
            Err(ProtocolError::StructuralMismatch { .. })
        ));
    }

    #[test]
    fn test_neurofeedback_broken_alternation_rejected() {
        let validator = ProtocolValidator::default();
        let mut markers = fixtures::neurofeedback_markers(6, 5);
        // swap the codes of the 3rd and 4th events: counts stay (10, 10)
        markers[2].code = 5;
        markers[3].code = 6;

        let err = validator
            .plan(RecordingKind::Neurofeedback, &markers)
            .unwrap_err();
        assert!(err.to_string().contains("alternation"));
    }
}
