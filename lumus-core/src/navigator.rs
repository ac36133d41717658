use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::BrowserConfig;
use crate::error::NavigationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Decides which regular files the browser shows.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    extension: String,
    case_insensitive: bool,
}

impl DocumentFilter {
    pub fn new(extension: impl Into<String>, case_insensitive: bool) -> Self {
        let extension: String = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_owned(),
            case_insensitive,
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if self.case_insensitive {
            ext.eq_ignore_ascii_case(&self.extension)
        } else {
            ext == self.extension
        }
    }
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::new("pdf", true)
    }
}

impl From<&BrowserConfig> for DocumentFilter {
    fn from(config: &BrowserConfig) -> Self {
        Self::new(config.extension.clone(), config.case_insensitive)
    }
}

/// Owns the current directory and its filtered listing.
///
/// A listing is always rebuilt in full and only committed once the new
/// directory was read successfully, so a failed move leaves the previous
/// state untouched.
#[derive(Debug, Clone)]
pub struct Navigator {
    current_dir: PathBuf,
    entries: Vec<Entry>,
    filter: DocumentFilter,
}

impl Navigator {
    pub fn open(dir: impl Into<PathBuf>, filter: DocumentFilter) -> Result<Self, NavigationError> {
        let current_dir = dir.into();
        let entries = read_listing(&current_dir, &filter)?;
        Ok(Self {
            current_dir,
            entries,
            filter,
        })
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descend(&mut self, name: &str) -> Result<(), NavigationError> {
        let target = self.current_dir.join(name);
        self.change_to(target)
    }

    pub fn ascend(&mut self) -> Result<(), NavigationError> {
        let parent = self
            .current_dir
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| NavigationError::NoParent {
                path: self.current_dir.clone(),
            })?;
        self.change_to(parent)
    }

    fn change_to(&mut self, target: PathBuf) -> Result<(), NavigationError> {
        let target = target
            .canonicalize()
            .map_err(|err| NavigationError::read_directory(&target, err))?;
        let entries = read_listing(&target, &self.filter)?;
        debug!(dir = %target.display(), entries = entries.len(), "changed directory");
        self.current_dir = target;
        self.entries = entries;
        Ok(())
    }
}

fn read_listing(dir: &Path, filter: &DocumentFilter) -> Result<Vec<Entry>, NavigationError> {
    let read_dir = fs::read_dir(dir).map_err(|err| NavigationError::read_directory(dir, err))?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|err| NavigationError::read_directory(dir, err))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        // follows symlinks, like the listing a shell would show
        let kind = if path.is_dir() {
            EntryKind::Directory
        } else if path.is_file() && filter.matches(&path) {
            EntryKind::Document
        } else {
            continue;
        };

        entries.push(Entry { name, path, kind });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::tempdir;

    fn names(navigator: &Navigator) -> Vec<&str> {
        navigator.entries().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn listing_keeps_only_directories_and_documents() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("archive")).unwrap();
        fs::write(dir.path().join("notes.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("readme.txt"), b"text").unwrap();
        fs::write(dir.path().join("pdf"), b"no extension").unwrap();

        let navigator = Navigator::open(dir.path(), DocumentFilter::default()).unwrap();
        assert_eq!(names(&navigator), vec!["archive", "notes.pdf"]);
        assert!(navigator.entry(0).unwrap().is_dir());
        assert_eq!(navigator.entry(1).unwrap().kind, EntryKind::Document);
    }

    #[test]
    fn extension_case_follows_filter() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("UPPER.PDF"), b"%PDF").unwrap();
        fs::write(dir.path().join("lower.pdf"), b"%PDF").unwrap();

        let relaxed = Navigator::open(dir.path(), DocumentFilter::new("pdf", true)).unwrap();
        assert_eq!(names(&relaxed), vec!["UPPER.PDF", "lower.pdf"]);

        let strict = Navigator::open(dir.path(), DocumentFilter::new(".pdf", false)).unwrap();
        assert_eq!(names(&strict), vec!["lower.pdf"]);
    }

    #[test]
    fn descend_rebuilds_listing_for_new_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("archive");
        fs::create_dir(&nested).unwrap();
        fs::create_dir(nested.join("2019")).unwrap();
        fs::write(nested.join("old.pdf"), b"%PDF").unwrap();
        fs::write(nested.join("old.docx"), b"doc").unwrap();
        fs::write(dir.path().join("top.pdf"), b"%PDF").unwrap();

        let mut navigator = Navigator::open(dir.path(), DocumentFilter::default()).unwrap();
        navigator.descend("archive").unwrap();

        assert_eq!(navigator.current_dir(), nested.canonicalize().unwrap());
        assert_eq!(names(&navigator), vec!["2019", "old.pdf"]);

        navigator.ascend().unwrap();
        assert_eq!(navigator.current_dir(), dir.path().canonicalize().unwrap());
        assert_eq!(names(&navigator), vec!["archive", "top.pdf"]);
    }

    #[test]
    fn failed_descend_keeps_previous_listing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("top.pdf"), b"%PDF").unwrap();

        let mut navigator = Navigator::open(dir.path(), DocumentFilter::default()).unwrap();
        let before = navigator.current_dir().to_path_buf();

        let err = navigator.descend("missing").unwrap_err();
        assert!(matches!(err, NavigationError::ReadDirectory { .. }));
        assert_eq!(navigator.current_dir(), before);
        assert_eq!(names(&navigator), vec!["top.pdf"]);
    }

    #[test]
    fn opening_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(Navigator::open(missing, DocumentFilter::default()).is_err());
    }
}
