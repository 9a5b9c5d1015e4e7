//! Zip helpers shared by the compiler and the runtime loader.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive};

/// Options for a reproducible archive entry: fixed timestamp and mode.
pub fn entry_options(method: CompressionMethod) -> FileOptions {
    FileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Open a zip archive, tolerating a prefix such as a shebang line.
pub fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("{} is not a zip archive", path.display()))
}

/// True if `path` is a readable zip archive.
pub fn is_zip(path: &Path) -> bool {
    path.is_file() && open(path).is_ok()
}

/// Read one member into memory.
pub fn read_member(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut member = archive
        .by_name(name)
        .with_context(|| format!("archive has no member `{}`", name))?;
    let mut data = Vec::new();
    member
        .read_to_end(&mut data)
        .with_context(|| format!("failed to read archive member `{}`", name))?;
    Ok(data)
}
