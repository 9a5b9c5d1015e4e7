//! Wheel compatibility tags.
//!
//! A tag is a `(runtime, abi, platform)` triple. Sets of tags are written in
//! a compressed form where each position holds a `.`-joined list and the set
//! is the cross product, e.g. `py2.py3-none-any`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::core::errors::ZappError;

/// A single compatibility triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub runtime: String,
    pub abi: String,
    pub platform: String,
}

impl Tag {
    pub fn new(
        runtime: impl Into<String>,
        abi: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Tag {
            runtime: runtime.into(),
            abi: abi.into(),
            platform: platform.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.runtime, self.abi, self.platform)
    }
}

impl FromStr for Tag {
    type Err = ZappError;

    /// Parse a single, uncompressed triple.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tags = decompress(s)?.into_iter();
        match (tags.next(), tags.next()) {
            (Some(tag), None) => Ok(tag),
            _ => Err(ZappError::InvalidTag { tag: s.to_string() }),
        }
    }
}

/// Compress a set of tags into its shortest cross-product string.
pub fn compress<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> String {
    let mut runtimes = BTreeSet::new();
    let mut abis = BTreeSet::new();
    let mut platforms = BTreeSet::new();

    for tag in tags {
        runtimes.insert(tag.runtime.as_str());
        abis.insert(tag.abi.as_str());
        platforms.insert(tag.platform.as_str());
    }

    [runtimes, abis, platforms]
        .iter()
        .map(|group| group.iter().copied().collect::<Vec<_>>().join("."))
        .collect::<Vec<_>>()
        .join("-")
}

/// Expand a compressed tag string into the set it stands for.
pub fn decompress(tag: &str) -> Result<BTreeSet<Tag>, ZappError> {
    let invalid = || ZappError::InvalidTag {
        tag: tag.to_string(),
    };

    let groups: Vec<Vec<&str>> = tag.split('-').map(|g| g.split('.').collect()).collect();
    let [runtimes, abis, platforms] = groups.as_slice() else {
        return Err(invalid());
    };
    if groups.iter().flatten().any(|part| part.is_empty()) {
        return Err(invalid());
    }

    let mut out = BTreeSet::new();
    for runtime in runtimes {
        for abi in abis {
            for platform in platforms {
                out.insert(Tag::new(*runtime, *abi, *platform));
            }
        }
    }
    Ok(out)
}
