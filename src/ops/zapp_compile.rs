//! Implementation of `zapp compile`.
//!
//! Runs the manifest pipeline, then writes the executable archive: a
//! shebang line followed by a zip of every source and every wheel.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zip::{CompressionMethod, ZipWriter};

use crate::core::manifest::DEPS_PREFIX;
use crate::core::Manifest;
use crate::ops::pipeline::{BuildContext, Pipeline};
use crate::util::archive::entry_options;
use crate::util::fs::{make_executable, resolve_path};

/// Options for a compile.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Path of the archive to write
    pub output: PathBuf,

    /// Repack unpacked wheel trees into `.deps/`
    pub use_wheels: bool,

    /// Let the entry script call `module:function` references
    pub call_entry_functions: bool,

    /// Cache root for rebuilt wheels; wheels stay in the build directory
    /// when unset
    pub cache_dir: Option<PathBuf>,
}

/// Result of a successful compile.
#[derive(Debug)]
pub struct CompileResult {
    /// Path of the written archive
    pub output: PathBuf,

    /// The manifest as embedded in the archive
    pub manifest: Manifest,
}

/// Compile the manifest at `manifest_path`.
pub fn compile_file(manifest_path: &Path, opts: &CompileOptions) -> Result<CompileResult> {
    let manifest = Manifest::load(manifest_path)?;
    compile(manifest, opts)
}

/// Compile a manifest into an executable archive.
///
/// Nothing is written to `opts.output` unless every stage succeeds.
pub fn compile(manifest: Manifest, opts: &CompileOptions) -> Result<CompileResult> {
    let output = resolve_path(&opts.output);
    let ctx = BuildContext::new(build_dir(&output)?, opts.cache_dir.as_deref())?
        .with_call_entry_functions(opts.call_entry_functions);

    let manifest = Pipeline::standard(opts.use_wheels).run(manifest, &ctx)?;

    if let Err(e) = write_archive(&manifest, &output) {
        // Leave no half-written archive behind
        let _ = fs::remove_file(&output);
        return Err(e);
    }
    make_executable(&output)?;

    tracing::info!(
        "compiled {} ({} sources, {} wheels)",
        output.display(),
        manifest.sources.len(),
        manifest.wheels.len()
    );
    Ok(CompileResult { output, manifest })
}

/// Scratch directory for a compile, next to the output.
///
/// Its path ends up in the embedded manifest, so it is derived from the
/// output path rather than randomized.
fn build_dir(output: &Path) -> Result<PathBuf> {
    let name = output
        .file_name()
        .with_context(|| format!("invalid output path: {}", output.display()))?;
    let parent = output.parent().unwrap_or(Path::new("."));
    Ok(parent.join(format!(".{}.zapp-build", name.to_string_lossy())))
}

/// Normalize a manifest shebang into the first line of the archive.
pub fn shebang_line(shebang: &str) -> String {
    let mut line = String::with_capacity(shebang.len() + 3);
    if !shebang.starts_with("#!") {
        line.push_str("#!");
    }
    line.push_str(shebang);
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

/// What goes into one archive entry.
enum Member<'a> {
    Empty,
    File(&'a Path, CompressionMethod),
}

fn archive_members(manifest: &Manifest) -> Vec<(String, Member<'_>)> {
    let sources = manifest.sources.iter().map(|(dest, src)| {
        let member = match src {
            Some(src) => Member::File(&src.source, CompressionMethod::Deflated),
            None => Member::Empty,
        };
        (dest.clone(), member)
    });
    // Wheels are already compressed
    let wheels = manifest.wheels.iter().map(|(name, wheel)| {
        (
            format!("{}{}", DEPS_PREFIX, name),
            Member::File(&wheel.source, CompressionMethod::Stored),
        )
    });

    let mut members: Vec<_> = sources.chain(wheels).collect();
    members.sort_by(|a, b| a.0.cmp(&b.0));
    members
}

fn write_archive(manifest: &Manifest, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    file.write_all(shebang_line(&manifest.shebang).as_bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;

    let mut zip = ZipWriter::new(file);
    for (name, member) in archive_members(manifest) {
        match member {
            Member::Empty => {
                zip.start_file(name.as_str(), entry_options(CompressionMethod::Deflated))
                    .with_context(|| format!("failed to add {}", name))?;
            }
            Member::File(path, method) => {
                zip.start_file(name.as_str(), entry_options(method))
                    .with_context(|| format!("failed to add {}", name))?;
                let mut src = File::open(path)
                    .with_context(|| format!("failed to open {} for {}", path.display(), name))?;
                io::copy(&mut src, &mut zip)
                    .with_context(|| format!("failed to copy {}", path.display()))?;
            }
        }
    }
    zip.finish()
        .with_context(|| format!("failed to finish {}", output.display()))?;
    Ok(())
}
