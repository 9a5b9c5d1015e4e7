//! High-level operations.
//!
//! This module contains the implementation of the `zapp` commands and the
//! manifest pipeline they drive.

pub mod main_script;
pub mod pipeline;
pub mod stages;
pub mod zapp_compile;

pub use pipeline::{BuildContext, Pipeline, Stage};
pub use zapp_compile::{compile, compile_file, CompileOptions, CompileResult};
