use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::RecordingKind;
use crate::error::ConfigError;

/// Semantic meaning of an event code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Rest,
    Blink,
    RestingState,
    Audio,
    Regulation,
    NonRegulation,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Rest => "rest",
            EventKind::Blink => "blink",
            EventKind::RestingState => "resting-state",
            EventKind::Audio => "audio",
            EventKind::Regulation => "regulation",
            EventKind::NonRegulation => "non-regulation",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Code and nominal duration of one event kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventDefinition {
    pub code: u32,
    /// Nominal duration of the phase the event opens, in seconds
    pub duration_secs: f64,
}

/// One group of identical codes expected in a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedGroup {
    pub event: EventKind,
    pub count: usize,
}

/// Expected shape of the event stream for one recording kind.
///
/// Groups are listed in the order of their first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSpec {
    pub groups: Vec<ExpectedGroup>,
    /// Markers must cycle through the groups in order (e.g. non-regulation,
    /// regulation, non-regulation, ...)
    pub alternating: bool,
}

impl ProtocolSpec {
    /// Total number of expected markers
    pub fn total_events(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}

/// Event codes and per-kind protocols
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolTable {
    events: BTreeMap<EventKind, EventDefinition>,
    calibration: ProtocolSpec,
    resting_state: ProtocolSpec,
    neurofeedback: ProtocolSpec,
}

impl Default for ProtocolTable {
    fn default() -> Self {
        let events = BTreeMap::from([
            (EventKind::Rest, EventDefinition { code: 1, duration_secs: 1.0 }),
            (EventKind::Blink, EventDefinition { code: 2, duration_secs: 60.0 }),
            (EventKind::RestingState, EventDefinition { code: 3, duration_secs: 120.0 }),
            (EventKind::Audio, EventDefinition { code: 4, duration_secs: 0.8 }),
            (EventKind::Regulation, EventDefinition { code: 5, duration_secs: 16.0 }),
            (EventKind::NonRegulation, EventDefinition { code: 6, duration_secs: 8.0 }),
        ]);

        Self {
            events,
            calibration: ProtocolSpec {
                groups: vec![
                    ExpectedGroup { event: EventKind::Blink, count: 1 },
                    ExpectedGroup { event: EventKind::Rest, count: 75 },
                    ExpectedGroup { event: EventKind::Audio, count: 75 },
                ],
                alternating: false,
            },
            resting_state: ProtocolSpec {
                groups: vec![ExpectedGroup { event: EventKind::RestingState, count: 1 }],
                alternating: false,
            },
            neurofeedback: ProtocolSpec {
                groups: vec![
                    ExpectedGroup { event: EventKind::NonRegulation, count: 10 },
                    ExpectedGroup { event: EventKind::Regulation, count: 10 },
                ],
                alternating: true,
            },
        }
    }
}

impl ProtocolTable {
    /// Protocol for a recording kind
    pub fn spec(&self, kind: RecordingKind) -> &ProtocolSpec {
        match kind {
            RecordingKind::Calibration => &self.calibration,
            RecordingKind::RestingState => &self.resting_state,
            RecordingKind::Neurofeedback => &self.neurofeedback,
        }
    }

    /// Replace the protocol of one recording kind.
    ///
    /// Each event may appear in one group only, with a non-zero count.
    pub fn with_spec(
        mut self,
        kind: RecordingKind,
        spec: ProtocolSpec,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidProtocol { kind, reason };
        if spec.groups.is_empty() {
            return Err(invalid("no event group".to_string()));
        }
        for (position, group) in spec.groups.iter().enumerate() {
            if group.count == 0 {
                return Err(invalid(format!("group {} expects no {} event", position, group.event)));
            }
            if spec.groups[..position].iter().any(|g| g.event == group.event) {
                return Err(invalid(format!("{} listed in more than one group", group.event)));
            }
        }

        match kind {
            RecordingKind::Calibration => self.calibration = spec,
            RecordingKind::RestingState => self.resting_state = spec,
            RecordingKind::Neurofeedback => self.neurofeedback = spec,
        }
        Ok(self)
    }

    /// Replace the definition of one event kind. Codes stay unique across
    /// events, otherwise healing could merge two groups into one.
    pub fn with_event(
        mut self,
        event: EventKind,
        definition: EventDefinition,
    ) -> Result<Self, ConfigError> {
        if let Some(taken_by) = self.event_for_code(definition.code).filter(|e| *e != event) {
            return Err(ConfigError::DuplicateEventCode {
                code: definition.code,
                event,
                taken_by,
            });
        }
        self.events.insert(event, definition);
        Ok(self)
    }

    pub fn definition(&self, event: EventKind) -> EventDefinition {
        self.events[&event]
    }

    pub fn code(&self, event: EventKind) -> u32 {
        self.definition(event).code
    }

    pub fn duration_secs(&self, event: EventKind) -> f64 {
        self.definition(event).duration_secs
    }

    /// Semantic meaning of a code, if it is known
    pub fn event_for_code(&self, code: u32) -> Option<EventKind> {
        self.events
            .iter()
            .find(|(_, def)| def.code == code)
            .map(|(event, _)| *event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_protocols() {
        let table = ProtocolTable::default();
        assert_eq!(table.spec(RecordingKind::Calibration).total_events(), 151);
        assert_eq!(table.spec(RecordingKind::RestingState).total_events(), 1);
        assert_eq!(table.spec(RecordingKind::Neurofeedback).total_events(), 20);
        assert!(table.spec(RecordingKind::Neurofeedback).alternating);
    }

    #[test]
    fn test_with_event_replaces_definition() {
        let table = ProtocolTable::default()
            .with_event(EventKind::Audio, EventDefinition { code: 40, duration_secs: 0.5 })
            .unwrap();

        assert_eq!(table.code(EventKind::Audio), 40);
        assert_eq!(table.event_for_code(40), Some(EventKind::Audio));
        assert_eq!(table.event_for_code(4), None);

        // keeping its own code is not a collision
        let table = table
            .with_event(EventKind::Audio, EventDefinition { code: 40, duration_secs: 1.0 })
            .unwrap();
        assert_eq!(table.duration_secs(EventKind::Audio), 1.0);
    }

    #[test]
    fn test_with_event_rejects_taken_code() {
        let err = ProtocolTable::default()
            .with_event(EventKind::Audio, EventDefinition { code: 1, duration_secs: 0.8 })
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::DuplicateEventCode {
                code: 1,
                event: EventKind::Audio,
                taken_by: EventKind::Rest,
            }
        ));
    }

    #[test]
    fn test_with_spec_replaces_protocol() {
        let short = ProtocolSpec {
            groups: vec![
                ExpectedGroup { event: EventKind::NonRegulation, count: 3 },
                ExpectedGroup { event: EventKind::Regulation, count: 3 },
            ],
            alternating: true,
        };
        let table = ProtocolTable::default()
            .with_spec(RecordingKind::Neurofeedback, short)
            .unwrap();

        assert_eq!(table.spec(RecordingKind::Neurofeedback).total_events(), 6);
        assert_eq!(table.spec(RecordingKind::Calibration).total_events(), 151);
    }

    #[test]
    fn test_with_spec_rejects_invalid_groups() {
        let repeated = ProtocolSpec {
            groups: vec![
                ExpectedGroup { event: EventKind::Rest, count: 2 },
                ExpectedGroup { event: EventKind::Rest, count: 1 },
            ],
            alternating: false,
        };
        let empty_group = ProtocolSpec {
            groups: vec![ExpectedGroup { event: EventKind::Blink, count: 0 }],
            alternating: false,
        };
        let no_group = ProtocolSpec {
            groups: Vec::new(),
            alternating: false,
        };

        for spec in [repeated, empty_group, no_group] {
            assert!(matches!(
                ProtocolTable::default().with_spec(RecordingKind::Calibration, spec),
                Err(ConfigError::InvalidProtocol {
                    kind: RecordingKind::Calibration,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_event_for_code() {
        let table = ProtocolTable::default();
        assert_eq!(table.event_for_code(2), Some(EventKind::Blink));
        assert_eq!(table.event_for_code(6), Some(EventKind::NonRegulation));
        assert_eq!(table.event_for_code(42), None);
    }
}
