//! Rebuilding wheel archives from unpacked trees.
//!
//! Build systems often hand us a wheel already unpacked, one manifest source
//! per file. Such trees are recognized by their `<dist>.dist-info/WHEEL`
//! file. Several wheels may share one install root; each owns the files
//! its `RECORD` lists.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tempfile::NamedTempFile;
use zip::{CompressionMethod, ZipWriter};

use crate::core::errors::ZappError;
use crate::core::SourceRef;
use crate::util::archive::entry_options;
use crate::util::fs::relative_slash_path;
use crate::wheel::metadata::WheelMetadata;
use crate::wheel::record::Record;

/// Matches the `WHEEL` file of an unpacked wheel, on host or archive paths.
static WHEEL_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<root>.*)/)?(?P<dist>[^/]+)\.dist-info/WHEEL$").expect("valid regex")
});

/// A source under a wheel's install root.
#[derive(Debug, Clone)]
struct Member {
    /// Archive destination in the manifest
    dest: String,

    /// Host file, `None` for placeholders
    host: Option<PathBuf>,
}

/// One unpacked wheel found among a manifest's sources.
#[derive(Debug, Clone)]
pub struct UnpackedWheel {
    /// Host directory holding the `.dist-info`
    pub root: PathBuf,

    /// Name of the `.dist-info` directory
    pub dist_info: String,

    /// Member name inside the wheel -> every source under `root`
    members: BTreeMap<String, Member>,
}

/// Find every unpacked wheel among `sources`, one per `.dist-info`.
pub fn find_unpacked_wheels(sources: &BTreeMap<String, Option<SourceRef>>) -> Vec<UnpackedWheel> {
    let mut wheels: Vec<UnpackedWheel> = Vec::new();

    for (dest, src) in sources {
        let Some(src) = src else { continue };
        let host = src.source.to_string_lossy().replace('\\', "/");
        let Some(caps) = WHEEL_FILE.captures(&host) else {
            continue;
        };

        let root = PathBuf::from(caps.name("root").map_or("", |m| m.as_str()));
        let dist_info = format!("{}.dist-info", &caps["dist"]);
        if wheels
            .iter()
            .any(|w| w.root == root && w.dist_info == dist_info)
        {
            continue;
        }

        // Archive-side root, used to claim placeholders injected into the tree
        let dest_root = WHEEL_FILE
            .captures(dest)
            .map(|c| c.name("root").map_or(String::new(), |m| format!("{}/", m.as_str())));

        wheels.push(UnpackedWheel::collect(root, dist_info, dest_root, sources));
    }

    wheels
}

/// Whether `path` lies under the install `root`.
///
/// An empty root is the current directory, which holds only relative paths.
fn in_tree(root: &Path, path: &Path) -> bool {
    if root.as_os_str().is_empty() {
        path.is_relative()
    } else {
        path.starts_with(root)
    }
}

impl UnpackedWheel {
    fn collect(
        root: PathBuf,
        dist_info: String,
        dest_root: Option<String>,
        all: &BTreeMap<String, Option<SourceRef>>,
    ) -> Self {
        let mut members = BTreeMap::new();

        for (dest, src) in all {
            match src {
                Some(src) if in_tree(&root, &src.source) => {
                    if let Some(name) = relative_slash_path(&root, &src.source) {
                        let member = Member {
                            dest: dest.clone(),
                            host: Some(src.source.clone()),
                        };
                        members.insert(name, member);
                    }
                }
                None => {
                    let Some(prefix) = dest_root.as_deref() else {
                        continue;
                    };
                    if let Some(name) = dest.strip_prefix(prefix) {
                        members.entry(name.to_string()).or_insert(Member {
                            dest: dest.clone(),
                            host: None,
                        });
                    }
                }
                Some(_) => {}
            }
        }

        UnpackedWheel {
            root,
            dist_info,
            members,
        }
    }

    /// Destinations of every source under the install root.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.members.values().map(|m| m.dest.as_str())
    }

    /// Destinations this wheel takes over from the manifest.
    ///
    /// These are the files `record` lists, plus placeholders inside a
    /// top-level directory the record lists.
    pub fn claimed<'a>(&'a self, record: &'a Record) -> impl Iterator<Item = &'a str> + 'a {
        self.members.iter().filter_map(move |(name, member)| {
            let owned = match member.host {
                Some(_) => record.contains(name),
                None => owns_directory(record, name),
            };
            owned.then_some(member.dest.as_str())
        })
    }

    /// Host path of one of the `.dist-info` documents.
    fn document(&self, name: &'static str) -> Result<&Path, ZappError> {
        let member = format!("{}/{}", self.dist_info, name);
        match self.members.get(&member).and_then(|m| m.host.as_deref()) {
            Some(path) => Ok(path),
            None => Err(ZappError::MissingMetadata {
                wheel: self.root.join(&self.dist_info),
                document: name,
            }),
        }
    }

    fn read_document(&self, name: &'static str) -> Result<String> {
        let path = self.document(name)?;
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))
    }

    /// Parse the wheel's identity and contents list.
    pub fn load(&self) -> Result<(WheelMetadata, Record)> {
        let metadata = self.read_document("METADATA")?;
        let wheel = self.read_document("WHEEL")?;
        let record = self.read_document("RECORD")?;

        let meta = WheelMetadata::parse(&metadata, &wheel)
            .with_context(|| format!("in wheel at {}", self.root.display()))?;
        let record = Record::parse(&record)
            .with_context(|| format!("in wheel at {}", self.root.display()))?;
        Ok((meta, record))
    }

    /// Write the wheel archive into a temp file in `workdir`.
    ///
    /// Only members listed in `record` are included, in sorted order with
    /// fixed timestamps, so equal trees produce equal bytes.
    pub fn build(&self, record: &Record, workdir: &Path) -> Result<NamedTempFile> {
        let mut staged = NamedTempFile::new_in(workdir)
            .with_context(|| format!("failed to create temp file in {}", workdir.display()))?;

        {
            let mut zip = ZipWriter::new(staged.as_file_mut());
            let options = entry_options(CompressionMethod::Deflated);

            for (name, member) in &self.members {
                if !record.contains(name) {
                    tracing::debug!("dropping unlisted wheel member {}", name);
                    continue;
                }
                zip.start_file(name.as_str(), options)
                    .with_context(|| format!("failed to add {} to wheel", name))?;
                if let Some(host) = &member.host {
                    let mut file = File::open(host)
                        .with_context(|| format!("failed to open {}", host.display()))?;
                    io::copy(&mut file, &mut zip)
                        .with_context(|| format!("failed to copy {}", host.display()))?;
                }
            }

            for listed in record.paths().filter(|p| !self.members.contains_key(*p)) {
                tracing::warn!(
                    "{} lists {} but the manifest does not provide it",
                    self.dist_info,
                    listed
                );
            }

            zip.finish().context("failed to finish wheel archive")?;
        }

        Ok(staged)
    }
}

/// Whether `record` lists a file in the same top-level directory as `name`.
fn owns_directory(record: &Record, name: &str) -> bool {
    let Some((top, _)) = name.split_once('/') else {
        return false;
    };
    record
        .paths()
        .any(|p| p.split_once('/').is_some_and(|(dir, _)| dir == top))
}
