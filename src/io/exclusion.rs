use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::store::atomic_write;

/// Recordings to skip on future runs, persisted as one path per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    entries: BTreeSet<PathBuf>,
}

impl ExclusionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read an exclusion file, creating it empty if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            atomic_write(path, b"")
                .with_context(|| format!("Failed to create exclusion file: {:?}", path))?;
            return Ok(Self::empty());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read exclusion file: {:?}", path))?;
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect();

        Ok(Self { entries })
    }

    /// Write the set back, sorted
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = String::new();
        for entry in &self.entries {
            content.push_str(&entry.to_string_lossy());
            content.push('\n');
        }
        atomic_write(path, content.as_bytes())
            .with_context(|| format!("Failed to write exclusion file: {:?}", path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains(path)
    }

    /// Returns false if the path was already excluded
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> bool {
        self.entries.insert(path.into())
    }

    pub fn extend<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.entries.extend(paths.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lists/exclude.txt");

        let set = ExclusionSet::load(&path).unwrap();

        assert!(set.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_grows_across_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exclude.txt");

        let mut set = ExclusionSet::load(&path).unwrap();
        set.extend(["b.json", "a.json"]);
        set.save(&path).unwrap();

        let mut set = ExclusionSet::load(&path).unwrap();
        assert!(set.contains(Path::new("a.json")));
        assert!(!set.insert("a.json"));
        set.insert("c.json");
        set.save(&path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a.json\nb.json\nc.json\n");
    }

    #[test]
    fn test_blank_lines_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exclude.txt");
        fs::write(&path, "\n  x.json  \n\n").unwrap();

        let set = ExclusionSet::load(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(Path::new("x.json")));
    }
}
