use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::ExclusionSet;
use crate::error::{ConfigError, DiscoveryError};
use crate::models::{mirrored_path, RecordingKind, RecordingReference};

/// Configuration for recording discovery
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// File name suffix identifying raw recordings
    pub suffix: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            suffix: "-raw.json".to_string(),
        }
    }
}

/// Filters applied to the discovered recordings
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    pub participant: Option<u32>,
    pub session: Option<u32>,
    /// Select this single file; overrides the participant and session filters
    pub explicit_file: Option<PathBuf>,
    /// Skip recordings whose output already exists
    pub ignore_existing: bool,
}

/// Result of a selection
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected recordings, in stable order
    pub references: Vec<RecordingReference>,
    /// Candidate files that do not follow the naming convention
    pub rejected: Vec<DiscoveryError>,
    pub skipped_existing: usize,
    pub skipped_excluded: usize,
}

impl Selection {
    /// A batch with nothing to do is a configuration error, not an empty run
    pub fn require_any(self, input_root: &Path) -> Result<Self, ConfigError> {
        if self.references.is_empty() {
            return Err(ConfigError::NothingSelected {
                root: input_root.to_path_buf(),
                skipped_existing: self.skipped_existing,
                skipped_excluded: self.skipped_excluded,
            });
        }
        Ok(self)
    }
}

/// Why a well-named recording was not selected
enum Skip {
    Filtered(String),
    Excluded,
    Existing,
}

/// Finds the recordings to process under an input root
#[derive(Debug, Clone, Default)]
pub struct FileSelector {
    config: SelectionConfig,
    exclusions: ExclusionSet,
}

impl FileSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            exclusions: ExclusionSet::empty(),
        }
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionSet) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Select the recordings to process.
    ///
    /// The output depends only on the filesystem state: two calls with no
    /// intervening writes return the same references in the same order.
    pub fn select(
        &self,
        input_root: &Path,
        output_root: &Path,
        filter: &SelectionFilter,
    ) -> Result<Selection, ConfigError> {
        if let Some(participant) = filter.participant {
            if participant == 0 {
                return Err(ConfigError::InvalidParticipant(participant));
            }
        }
        if let Some(session) = filter.session {
            if !(1..=15).contains(&session) {
                return Err(ConfigError::InvalidSession(session));
            }
        }
        if !input_root.is_dir() {
            return Err(ConfigError::MissingInputRoot(input_root.to_path_buf()));
        }

        if let Some(file) = &filter.explicit_file {
            return self.select_file(input_root, output_root, file, filter.ignore_existing);
        }

        let mut selection = Selection::default();
        let walker = WalkDir::new(input_root).sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.has_suffix(entry.path()) {
                continue;
            }

            let reference = match parse_reference(input_root, entry.path(), &self.config.suffix) {
                Ok(reference) => reference,
                Err(err) => {
                    warn!("{}", err);
                    selection.rejected.push(err);
                    continue;
                }
            };

            match self.skip_reason(&reference, input_root, output_root, filter) {
                None => selection.references.push(reference),
                Some(Skip::Filtered(_)) => {}
                Some(Skip::Excluded) => {
                    debug!("Excluded: {:?}", reference.path);
                    selection.skipped_excluded += 1;
                }
                Some(Skip::Existing) => {
                    debug!("Output exists: {:?}", reference.path);
                    selection.skipped_existing += 1;
                }
            }
        }

        selection.references.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        info!(
            "Selected {} recordings ({} with existing output, {} excluded, {} misnamed)",
            selection.references.len(),
            selection.skipped_existing,
            selection.skipped_excluded,
            selection.rejected.len()
        );
        Ok(selection)
    }

    fn select_file(
        &self,
        input_root: &Path,
        output_root: &Path,
        file: &Path,
        ignore_existing: bool,
    ) -> Result<Selection, ConfigError> {
        if !file.is_file() {
            return Err(ConfigError::MissingFile(file.to_path_buf()));
        }

        let outside = || ConfigError::FileOutsideRoot {
            file: file.to_path_buf(),
            root: input_root.to_path_buf(),
        };
        let canonical_root = input_root.canonicalize().map_err(|_| outside())?;
        let canonical_file = file.canonicalize().map_err(|_| outside())?;
        let relative = canonical_file
            .strip_prefix(&canonical_root)
            .map_err(|_| outside())?;

        let path = input_root.join(relative);
        let reference = parse_reference(input_root, &path, &self.config.suffix)?;

        let filter = SelectionFilter {
            ignore_existing,
            ..SelectionFilter::default()
        };
        let reason = match self.skip_reason(&reference, input_root, output_root, &filter) {
            None => {
                return Ok(Selection {
                    references: vec![reference],
                    ..Selection::default()
                });
            }
            Some(Skip::Filtered(reason)) => reason,
            Some(Skip::Excluded) => "listed in the exclusion file".to_string(),
            Some(Skip::Existing) => "output already exists".to_string(),
        };

        Err(ConfigError::FileNotSelected {
            file: file.to_path_buf(),
            reason,
        })
    }

    fn has_suffix(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&self.config.suffix))
    }

    fn skip_reason(
        &self,
        reference: &RecordingReference,
        input_root: &Path,
        output_root: &Path,
        filter: &SelectionFilter,
    ) -> Option<Skip> {
        if let Some(participant) = filter.participant {
            if reference.participant_id != participant {
                return Some(Skip::Filtered(format!("participant {}", reference.participant_id)));
            }
        }
        if let Some(session) = filter.session {
            if reference.session_id != session {
                return Some(Skip::Filtered(format!("session {}", reference.session_id)));
            }
        }
        if self.exclusions.contains(&reference.path) {
            return Some(Skip::Excluded);
        }
        if filter.ignore_existing {
            let exists = mirrored_path(input_root, output_root, &reference.path)
                .map(|out| out.exists())
                .unwrap_or(false);
            if exists {
                return Some(Skip::Existing);
            }
        }
        None
    }
}

/// Derive a recording reference from its path:
/// `<root>/<participant>/Session <n>/<Calibration|RestingState|Online>/<run>-<calibration|rs|online>[-<device>]<suffix>`
pub fn parse_reference(
    input_root: &Path,
    path: &Path,
    suffix: &str,
) -> Result<RecordingReference, DiscoveryError> {
    let fail = |reason: String| DiscoveryError::new(path, reason);

    let relative = path
        .strip_prefix(input_root)
        .map_err(|_| fail(format!("not inside {:?}", input_root)))?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| fail("path is not valid UTF-8".to_string()))?;

    let [participant, session, kind_dir, file_name] = parts.as_slice() else {
        return Err(fail(format!(
            "expected <participant>/Session <n>/<kind>/<file>, got {} components",
            parts.len()
        )));
    };

    let participant_id = participant
        .parse::<u32>()
        .ok()
        .filter(|p| *p > 0 && participant.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| fail(format!("invalid participant directory '{}'", participant)))?;

    let session_id = session
        .strip_prefix("Session ")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| (1..=15).contains(n))
        .ok_or_else(|| fail(format!("invalid session directory '{}'", session)))?;

    let kind = RecordingKind::from_directory_name(kind_dir)
        .ok_or_else(|| fail(format!("unknown recording directory '{}'", kind_dir)))?;

    let stem = file_name
        .strip_suffix(suffix)
        .ok_or_else(|| fail(format!("file name does not end with '{}'", suffix)))?;
    let mut fields = stem.splitn(3, '-');

    let run_index = fields
        .next()
        .and_then(|run| run.parse::<u32>().ok())
        .ok_or_else(|| fail(format!("invalid run index in '{}'", file_name)))?;

    let token = fields.next().unwrap_or_default();
    match RecordingKind::from_file_token(token) {
        Some(file_kind) if file_kind == kind => {}
        Some(file_kind) => {
            return Err(fail(format!(
                "{} file inside the {} directory",
                file_kind, kind_dir
            )));
        }
        None => return Err(fail(format!("unknown recording kind '{}'", token))),
    }

    Ok(RecordingReference {
        participant_id,
        session_id,
        kind,
        run_index,
        path: path.to_path_buf(),
    })
}
