//! Test utilities for zapp unit tests.
//!
//! Fixtures here build real files in temp directories; see [`fixtures`].
//!
//! # Example
//!
//! ```rust,ignore
//! use zapp::test_support::{ManifestFixture, UnpackedWheelFixture};
//!
//! #[test]
//! fn test_example() {
//!     let tmp = tempfile::TempDir::new().unwrap();
//!     let mut fixture = ManifestFixture::simple(tmp.path());
//!     let wheel = UnpackedWheelFixture::foo(tmp.path());
//!     fixture.manifest.sources.extend(wheel.sources("site-packages"));
//!     // Compile fixture.manifest...
//! }
//! ```

pub mod fixtures;

pub use fixtures::*;
