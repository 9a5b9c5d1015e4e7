//! The interpreter's module search path.

use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::fs::resolve_path;

/// An ordered, duplicate-free list of directories and archives.
///
/// Mutated in place by the loader operations, then exported to the
/// interpreter through an environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an OS path list such as the current `PYTHONPATH`.
    pub fn from_env_value(value: &OsString) -> Self {
        env::split_paths(value)
            .filter(|p| !p.as_os_str().is_empty())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    /// Remove an entry. Returns whether it was present.
    pub fn remove(&mut self, path: &Path) -> bool {
        if !self.seen.remove(path) {
            return false;
        }
        self.entries.retain(|p| p != path);
        true
    }

    /// Insert at the front, moving the entry if already present.
    pub fn push_front(&mut self, path: PathBuf) {
        self.remove(&path);
        self.seen.insert(path.clone());
        self.entries.insert(0, path);
    }

    /// Append, unless already present.
    pub fn push_back(&mut self, path: PathBuf) {
        if self.seen.insert(path.clone()) {
            self.entries.push(path);
        }
    }

    /// Make every entry absolute and symlink-free, keeping the first of
    /// any entries that resolve to the same place.
    pub fn canonicalize(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        self.seen.clear();
        for entry in entries {
            self.push_back(resolve_path(&entry));
        }
    }

    /// Join into a value for the interpreter's path variable.
    pub fn to_env_value(&self) -> Result<OsString> {
        env::join_paths(&self.entries).context("search path entry contains a path separator")
    }
}

impl FromIterator<PathBuf> for SearchPath {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        let mut path = SearchPath::new();
        for entry in iter {
            path.push_back(entry);
        }
        path
    }
}
