//! The zapp manifest.
//!
//! The manifest is the declarative description of an archive. The compiler
//! reads it from a JSON document, threads it through the build pipeline and
//! embeds the final copy in the archive; the runtime loader reads that copy
//! back once per process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::errors::ZappError;

/// Destination of the synthesized entry script.
pub const MAIN_SCRIPT: &str = "__main__.py";

/// Destination of the embedded manifest.
pub const EMBEDDED_MANIFEST: &str = "zapp/manifest.json";

/// File name of package markers.
pub const PACKAGE_MARKER: &str = "__init__.py";

/// Directory inside the archive that holds dependency wheels.
pub const DEPS_PREFIX: &str = ".deps/";

/// A host file that becomes one archive member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Path on the build host
    pub source: PathBuf,

    /// Reserved; carried through untouched
    #[serde(default)]
    pub hashes: Vec<String>,
}

impl SourceRef {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        SourceRef {
            source: source.into(),
            hashes: Vec::new(),
        }
    }
}

/// Identity recorded for a wheel the compiler rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A dependency wheel, keyed in the manifest by its canonical filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelEntry {
    /// Path to a canonical wheel archive on the build host
    pub source: PathBuf,

    #[serde(default)]
    pub hashes: Vec<String>,

    /// Parsed wheel metadata, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<WheelInfo>,
}

/// The parsed archive manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Archive destination -> host source; `None` is an empty placeholder
    pub sources: BTreeMap<String, Option<SourceRef>>,

    /// Canonical wheel filename -> wheel
    #[serde(default)]
    pub wheels: BTreeMap<String, WheelEntry>,

    /// Informational; never resolved
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,

    /// References run, in order, before the entry point
    #[serde(default)]
    pub prelude_points: Vec<String>,

    pub entry_point: String,

    pub shebang: String,

    #[serde(default = "default_zip_safe")]
    pub zip_safe: bool,
}

fn default_zip_safe() -> bool {
    true
}

impl Manifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse manifest")
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize manifest")
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize manifest")
    }

    /// Every reference the entry script runs: preludes, then the entry point.
    pub fn scripts(&self) -> impl Iterator<Item = &str> {
        self.prelude_points
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.entry_point.as_str()))
    }

    /// Insert a source under a reserved name, refusing to replace one.
    pub fn insert_reserved(
        &mut self,
        dest: &str,
        source: Option<SourceRef>,
    ) -> Result<(), ZappError> {
        if self.sources.contains_key(dest) {
            return Err(ZappError::Collision {
                path: dest.to_string(),
            });
        }
        self.sources.insert(dest.to_string(), source);
        Ok(())
    }
}

/// Canonicalize an archive destination.
///
/// Separators become `/`, leading `./` and `/` go away, and empty or `.`
/// segments collapse. `..` segments and empty results are rejected.
pub fn normalize_destination(dest: &str) -> Result<String, ZappError> {
    let unified = dest.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ZappError::InvalidDestination {
                    path: dest.to_string(),
                })
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(ZappError::InvalidDestination {
            path: dest.to_string(),
        });
    }
    Ok(segments.join("/"))
}

/// Every directory prefix of a destination's parent, root first.
///
/// `"a/b/c.txt"` yields `""`, `"a"`, `"a/b"`.
pub fn parent_prefixes(dest: &str) -> Vec<&str> {
    let mut prefixes = vec![""];
    let parent = match dest.rfind('/') {
        Some(idx) => &dest[..idx],
        None => return prefixes,
    };
    for (idx, _) in parent.match_indices('/') {
        prefixes.push(&parent[..idx]);
    }
    prefixes.push(parent);
    prefixes
}
