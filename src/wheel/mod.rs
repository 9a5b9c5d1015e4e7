//! Wheel handling: metadata, contents lists, repacking and the shared cache.

pub mod cache;
pub mod metadata;
pub mod pack;
pub mod record;

pub use cache::{Insertion, WheelCache};
pub use metadata::WheelMetadata;
pub use pack::{find_unpacked_wheels, UnpackedWheel};
pub use record::Record;
