//! Core data types: compatibility tags, entry references and the manifest.

pub mod entry_point;
pub mod errors;
pub mod manifest;
pub mod tag;

pub use entry_point::EntryRef;
pub use errors::ZappError;
pub use manifest::{Manifest, SourceRef, WheelEntry, WheelInfo};
pub use tag::Tag;
