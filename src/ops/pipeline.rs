//! The manifest pipeline.
//!
//! A compile threads the manifest through an ordered list of stages, each a
//! deterministic `Manifest -> Manifest` transform. Embedding the manifest
//! into itself is not a stage callers can place: [`Pipeline::run`] always
//! performs it after every other stage, because the runtime loader only ever
//! sees the embedded copy.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::Manifest;
use crate::ops::stages::{
    EmbedManifest, EnableLoader, ExtractWheels, NormalizeSources, SynthesizeMainScript,
    SynthesizeMarkers,
};
use crate::wheel::WheelCache;

/// One transformation of the manifest.
pub trait Stage {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn apply(&self, manifest: Manifest, ctx: &BuildContext) -> Result<Manifest>;
}

/// Shared state for one compile.
///
/// Owns a scratch directory for generated members and wheels that could
/// not be cached. The directory is removed when the context is dropped.
#[derive(Debug)]
pub struct BuildContext {
    workdir: PathBuf,
    cache: Option<WheelCache>,
    call_entry_functions: bool,
}

impl BuildContext {
    /// Create a context with a fresh scratch directory at `workdir`.
    ///
    /// The path is recorded in the embedded manifest, so callers wanting
    /// reproducible output pass a path derived from the output name.
    pub fn new(workdir: PathBuf, cache_root: Option<&Path>) -> Result<Self> {
        if workdir.exists() {
            fs::remove_dir_all(&workdir)
                .with_context(|| format!("failed to clear {}", workdir.display()))?;
        }
        fs::create_dir_all(&workdir)
            .with_context(|| format!("failed to create {}", workdir.display()))?;

        Ok(BuildContext {
            workdir,
            cache: cache_root.map(WheelCache::new),
            call_entry_functions: false,
        })
    }

    pub fn with_call_entry_functions(mut self, enabled: bool) -> Self {
        self.call_entry_functions = enabled;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// The shared wheel cache, if there is a cache root.
    pub fn cache(&self) -> Option<&WheelCache> {
        self.cache.as_ref()
    }

    pub fn call_entry_functions(&self) -> bool {
        self.call_entry_functions
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.workdir) {
            tracing::debug!("failed to remove {}: {}", self.workdir.display(), e);
        }
    }
}

/// An ordered list of stages, followed by manifest embedding.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// An empty pipeline; only embedding runs.
    pub fn new() -> Self {
        Pipeline { stages: Vec::new() }
    }

    /// The standard compile pipeline.
    pub fn standard(use_wheels: bool) -> Self {
        let mut pipeline = Pipeline::new().with_stage(NormalizeSources);
        if use_wheels {
            pipeline = pipeline.with_stage(ExtractWheels);
        }
        pipeline
            .with_stage(EnableLoader)
            // Markers must see every source except the two generated ones
            .with_stage(SynthesizeMarkers)
            .with_stage(SynthesizeMainScript)
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Names of the stages in execution order, embedding included.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(EmbedManifest.name()))
            .collect()
    }

    /// Run every stage in order, then embed the manifest.
    pub fn run(&self, mut manifest: Manifest, ctx: &BuildContext) -> Result<Manifest> {
        for stage in &self.stages {
            tracing::debug!("running stage `{}`", stage.name());
            manifest = stage
                .apply(manifest, ctx)
                .with_context(|| format!("stage `{}` failed", stage.name()))?;
        }
        EmbedManifest.apply(manifest, ctx)
    }
}
