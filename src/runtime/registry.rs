//! Loader operations addressable from a manifest's prelude.
//!
//! Prelude references that name a loader operation are handled in-process;
//! everything else is a user module handed to the interpreter.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::core::EntryRef;
use crate::runtime::loader::Runtime;

/// Fetch missing wheels from the archive into the cache.
pub const UNPACK_DEPS: &str = "zapp.support.unpack:unpack_deps";

/// Put every cached wheel on the search path.
pub const INSTALL_DEPS: &str = "zapp.support.unpack:install_deps";

/// Extract a non-zip-safe archive and relaunch from the extracted tree.
pub const UNPACK_ZAPP: &str = "zapp.support.unpack:unpack_zapp";

/// Resolve and dedupe the search path.
pub const CANONICALIZE_PATH: &str = "zapp.support.unpack:canonicalize_path";

/// A loader operation.
pub type LoaderOp = fn(&mut Runtime) -> Result<()>;

/// One validated step of a bootstrap.
#[derive(Debug, Clone)]
pub enum Step {
    /// A registered loader operation
    Loader(&'static str, LoaderOp),
    /// A user module run through the interpreter
    Module(EntryRef),
}

/// Reference string -> loader operation.
#[derive(Debug, Clone, Default)]
pub struct EntryRegistry {
    ops: BTreeMap<&'static str, LoaderOp>,
}

impl EntryRegistry {
    /// An empty registry; every reference is a user module.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in loader operation.
    pub fn with_loader_ops() -> Self {
        let mut registry = Self::new();
        registry.register(UNPACK_DEPS, |rt| rt.unpack_deps());
        registry.register(INSTALL_DEPS, |rt| rt.install_deps());
        registry.register(UNPACK_ZAPP, |rt| rt.unpack_zapp());
        registry.register(CANONICALIZE_PATH, |rt| {
            rt.canonicalize_path();
            Ok(())
        });
        registry
    }

    pub fn register(&mut self, reference: &'static str, op: LoaderOp) {
        self.ops.insert(reference, op);
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.ops.contains_key(reference)
    }

    /// Validate every reference and resolve it to a step.
    ///
    /// Fails on the first invalid reference, before anything has run.
    pub fn plan<'a>(&self, references: impl IntoIterator<Item = &'a str>) -> Result<Vec<Step>> {
        let mut steps = Vec::new();
        for reference in references {
            let entry = EntryRef::parse(reference)?;
            match self.ops.get_key_value(reference) {
                Some((&name, &op)) => steps.push(Step::Loader(name, op)),
                None => steps.push(Step::Module(entry)),
            }
        }
        Ok(steps)
    }
}
