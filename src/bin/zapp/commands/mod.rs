//! Command implementations

pub mod compile;
pub mod completions;
