//! The stages of the standard compile pipeline.

use std::collections::BTreeMap;

use anyhow::{Context, Result};

use crate::core::errors::ZappError;
use crate::core::manifest::{
    normalize_destination, parent_prefixes, EMBEDDED_MANIFEST, MAIN_SCRIPT, PACKAGE_MARKER,
};
use crate::core::{Manifest, SourceRef, WheelEntry};
use crate::ops::main_script;
use crate::ops::pipeline::{BuildContext, Stage};
use crate::runtime::registry::{INSTALL_DEPS, UNPACK_DEPS, UNPACK_ZAPP};
use crate::util::fs::write_bytes;
use crate::wheel::{find_unpacked_wheels, Insertion, Record, UnpackedWheel};

/// Canonicalize every destination key and check wheel names.
pub struct NormalizeSources;

impl Stage for NormalizeSources {
    fn name(&self) -> &'static str {
        "normalize-sources"
    }

    fn apply(&self, mut manifest: Manifest, _ctx: &BuildContext) -> Result<Manifest> {
        let mut normalized = BTreeMap::new();
        let mut origin: BTreeMap<String, String> = BTreeMap::new();

        for (dest, source) in std::mem::take(&mut manifest.sources) {
            let key = normalize_destination(&dest)?;
            if let Some(first) = origin.get(&key) {
                return Err(ZappError::DuplicateDestination {
                    first: first.clone(),
                    second: dest,
                    normalized: key,
                }
                .into());
            }
            origin.insert(key.clone(), dest);
            normalized.insert(key, source);
        }

        manifest.sources = normalized;

        if let Some(name) = manifest.wheels.keys().find(|k| !is_plain_file_name(k)) {
            return Err(ZappError::InvalidWheelName { name: name.clone() }.into());
        }
        Ok(manifest)
    }
}

/// Wheel keys become file names in the archive and the cache.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Replace unpacked wheel trees with cached wheel archives.
pub struct ExtractWheels;

impl ExtractWheels {
    fn extract(
        &self,
        wheel: &UnpackedWheel,
        ctx: &BuildContext,
    ) -> Result<(String, WheelEntry, Record)> {
        let (meta, record) = wheel.load()?;
        let filename = meta.canonical_filename();

        let path = match ctx.cache() {
            Some(cache) if cache.touch(&filename) => {
                tracing::debug!("wheel cache hit: {}", filename);
                cache.path_for(&filename)
            }
            Some(cache) => {
                let staged = wheel.build(&record, ctx.workdir())?;
                let insertion = cache.insert(&filename, staged, ctx.workdir())?;
                if let Insertion::Fallback(path) = &insertion {
                    tracing::warn!("wheel cache unavailable, using {}", path.display());
                }
                insertion.into_path()
            }
            None => {
                let staged = wheel.build(&record, ctx.workdir())?;
                let dest = ctx.workdir().join(&filename);
                staged
                    .persist(&dest)
                    .with_context(|| format!("failed to write {}", dest.display()))?;
                dest
            }
        };

        tracing::info!("packed {} ({} files)", filename, record.len());
        let entry = WheelEntry {
            source: path,
            hashes: Vec::new(),
            manifest: Some(meta.info()),
        };
        Ok((filename, entry, record))
    }
}

impl Stage for ExtractWheels {
    fn name(&self) -> &'static str {
        "extract-wheels"
    }

    fn apply(&self, mut manifest: Manifest, ctx: &BuildContext) -> Result<Manifest> {
        for wheel in find_unpacked_wheels(&manifest.sources) {
            let (filename, entry, record) = self.extract(&wheel, ctx).with_context(|| {
                format!(
                    "failed to pack wheel {} at {}",
                    wheel.dist_info,
                    wheel.root.display()
                )
            })?;

            for dest in wheel.claimed(&record) {
                manifest.sources.remove(dest);
            }
            manifest.wheels.entry(filename).or_insert(entry);
        }
        Ok(manifest)
    }
}

/// Schedule the runtime loader operations the manifest needs.
///
/// They run before any user prelude, in the order listed, so preludes can
/// import bundled wheels. Older zapp compilers appended them after the
/// user preludes instead.
pub struct EnableLoader;

impl EnableLoader {
    fn required(manifest: &Manifest) -> Vec<&'static str> {
        let mut ops = Vec::new();
        if !manifest.wheels.is_empty() {
            ops.extend([UNPACK_DEPS, INSTALL_DEPS]);
        }
        if !manifest.zip_safe {
            ops.push(UNPACK_ZAPP);
        }
        ops
    }
}

impl Stage for EnableLoader {
    fn name(&self) -> &'static str {
        "enable-loader"
    }

    fn apply(&self, mut manifest: Manifest, _ctx: &BuildContext) -> Result<Manifest> {
        let mut prelude: Vec<String> = Self::required(&manifest)
            .into_iter()
            .filter(|op| !manifest.prelude_points.iter().any(|p| p == op))
            .map(String::from)
            .collect();
        prelude.append(&mut manifest.prelude_points);
        manifest.prelude_points = prelude;
        Ok(manifest)
    }
}

/// Give every directory that holds a source a package marker.
pub struct SynthesizeMarkers;

impl Stage for SynthesizeMarkers {
    fn name(&self) -> &'static str {
        "synthesize-markers"
    }

    fn apply(&self, mut manifest: Manifest, _ctx: &BuildContext) -> Result<Manifest> {
        let markers: Vec<String> = manifest
            .sources
            .keys()
            .flat_map(|dest| parent_prefixes(dest))
            .map(|dir| match dir {
                "" => PACKAGE_MARKER.to_string(),
                dir => format!("{}/{}", dir, PACKAGE_MARKER),
            })
            .collect();

        for marker in markers {
            manifest.sources.entry(marker).or_insert(None);
        }
        Ok(manifest)
    }
}

/// Render `__main__.py` and add it to the sources.
pub struct SynthesizeMainScript;

impl Stage for SynthesizeMainScript {
    fn name(&self) -> &'static str {
        "synthesize-main-script"
    }

    fn apply(&self, mut manifest: Manifest, ctx: &BuildContext) -> Result<Manifest> {
        if manifest.sources.contains_key(MAIN_SCRIPT) {
            return Err(ZappError::Collision {
                path: MAIN_SCRIPT.to_string(),
            }
            .into());
        }

        let script = main_script::render(manifest.scripts(), ctx.call_entry_functions())?;
        let path = ctx.workdir().join(MAIN_SCRIPT);
        write_bytes(&path, script.as_bytes())?;

        manifest.insert_reserved(MAIN_SCRIPT, Some(SourceRef::new(path)))?;
        Ok(manifest)
    }
}

/// Embed the manifest, including its own entry, into the sources.
pub(crate) struct EmbedManifest;

impl Stage for EmbedManifest {
    fn name(&self) -> &'static str {
        "embed-manifest"
    }

    fn apply(&self, mut manifest: Manifest, ctx: &BuildContext) -> Result<Manifest> {
        let path = ctx.workdir().join("manifest.json");
        manifest.insert_reserved(EMBEDDED_MANIFEST, Some(SourceRef::new(&path)))?;

        let json = manifest.to_json()?;
        write_bytes(&path, json.as_bytes())?;
        Ok(manifest)
    }
}
