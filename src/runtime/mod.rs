//! The loader behind `zapp-run`.
//!
//! `zapp-run` is the program named in a zip-app's shebang. It reads the
//! embedded manifest, performs the loader operations the manifest
//! schedules (wheel unpacking, search-path setup, extraction), runs the
//! user preludes and finally replaces itself with the entry point.

pub mod bootstrap;
pub mod loader;
pub mod registry;
pub mod search_path;

pub use bootstrap::{bootstrap, module_command, InterpreterRunner, ModuleRunner};
pub use loader::Runtime;
pub use registry::{EntryRegistry, Step};
pub use search_path::SearchPath;
