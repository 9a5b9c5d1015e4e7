//! The shared, race-tolerant wheel cache.
//!
//! Wheels live at `<cache_root>/wheels/<canonical filename>`. The canonical
//! filename is the content key: an existing entry is never replaced, and
//! finding one is proof that an equivalent wheel is already there. Several
//! build or first-run processes may share one cache, so insertion is an
//! atomic no-clobber move and losing the race counts as success.
//!
//! Entries are touched on every hit so an external reaper can evict by
//! modification time.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::util::fs::touch;

/// Subdirectory of the cache root that holds wheels.
pub const WHEELS_DIR: &str = "wheels";

/// Where an inserted wheel ended up, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// The entry was already cached before we looked
    Hit(PathBuf),
    /// We moved the wheel into the cache
    Inserted(PathBuf),
    /// Another process created the entry first
    RaceLost(PathBuf),
    /// The cache was unusable; the wheel stayed in the working directory
    Fallback(PathBuf),
}

impl Insertion {
    pub fn path(&self) -> &Path {
        match self {
            Insertion::Hit(p)
            | Insertion::Inserted(p)
            | Insertion::RaceLost(p)
            | Insertion::Fallback(p) => p,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Insertion::Hit(p)
            | Insertion::Inserted(p)
            | Insertion::RaceLost(p)
            | Insertion::Fallback(p) => p,
        }
    }
}

/// Handle on the `wheels/` directory of a cache root.
#[derive(Debug, Clone)]
pub struct WheelCache {
    dir: PathBuf,
}

impl WheelCache {
    pub fn new(cache_root: &Path) -> Self {
        WheelCache {
            dir: cache_root.join(WHEELS_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, wheel: &str) -> PathBuf {
        self.dir.join(wheel)
    }

    pub fn contains(&self, wheel: &str) -> bool {
        self.path_for(wheel).is_file()
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create wheel cache: {}", self.dir.display()))
    }

    /// Refresh a cached wheel's timestamp. Returns whether it was cached.
    ///
    /// A cache we can read but not write still counts as a hit.
    pub fn touch(&self, wheel: &str) -> bool {
        let path = self.path_for(wheel);
        if !path.is_file() {
            return false;
        }
        if let Err(e) = touch(&path) {
            tracing::warn!("could not refresh {}: {:#}", path.display(), e);
        }
        true
    }

    /// Move a staged wheel into the cache.
    ///
    /// `staged` must live in `workdir`; if the cache cannot take the file
    /// (cross-device move, read-only cache) it is kept there as
    /// `<workdir>/<wheel>` instead.
    pub fn insert(&self, wheel: &str, staged: NamedTempFile, workdir: &Path) -> Result<Insertion> {
        let dest = self.path_for(wheel);

        if self.touch(wheel) {
            tracing::debug!("wheel cache hit: {}", wheel);
            return Ok(Insertion::Hit(dest));
        }
        self.move_in(wheel, staged, workdir)
    }

    /// The move half of [`WheelCache::insert`], without the hit check.
    pub fn move_in(&self, wheel: &str, staged: NamedTempFile, workdir: &Path) -> Result<Insertion> {
        let dest = self.path_for(wheel);

        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::debug!("wheel cache unavailable ({}), keeping {} local", e, wheel);
            return keep_local(wheel, staged, workdir);
        }

        match staged.persist_noclobber(&dest) {
            Ok(_) => {
                tracing::debug!("cached {}", dest.display());
                Ok(Insertion::Inserted(dest))
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!("lost cache race for {}", wheel);
                self.touch(wheel);
                Ok(Insertion::RaceLost(dest))
            }
            Err(e) => {
                tracing::debug!("could not move {} into the cache: {}", wheel, e.error);
                keep_local(wheel, e.file, workdir)
            }
        }
    }

    /// Copy a wheel from a reader into the cache, unless already present.
    pub fn insert_from(&self, wheel: &str, reader: &mut impl Read) -> Result<Insertion> {
        let dest = self.path_for(wheel);
        if self.touch(wheel) {
            return Ok(Insertion::Hit(dest));
        }

        self.ensure_dir()?;
        let mut staged = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("failed to stage {} in {}", wheel, self.dir.display()))?;
        io::copy(reader, &mut staged).with_context(|| format!("failed to write {}", wheel))?;
        staged
            .as_file()
            .sync_all()
            .with_context(|| format!("failed to flush {}", wheel))?;

        match staged.persist_noclobber(&dest) {
            Ok(_) => Ok(Insertion::Inserted(dest)),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                self.touch(wheel);
                Ok(Insertion::RaceLost(dest))
            }
            Err(e) => Err(e.error).with_context(|| format!("failed to cache {}", dest.display())),
        }
    }
}

fn keep_local(wheel: &str, staged: NamedTempFile, workdir: &Path) -> Result<Insertion> {
    let local = workdir.join(wheel);
    staged
        .persist(&local)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to keep {} in {}", wheel, workdir.display()))?;
    Ok(Insertion::Fallback(local))
}
