//! zapp - Executable Python zip-apps
//!
//! This crate provides the core library functionality for zapp: the
//! manifest pipeline and archive compiler behind `zapp compile`, and the
//! runtime loader behind `zapp-run`.

pub mod core;
pub mod ops;
pub mod runtime;
pub mod util;
pub mod wheel;

/// Test utilities for zapp unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides on-disk fixtures for manifests and unpacked
/// wheels.
#[cfg(test)]
pub mod test_support;

pub use core::{EntryRef, Manifest, Tag, ZappError};
pub use runtime::Runtime;
pub use util::context::GlobalContext;
