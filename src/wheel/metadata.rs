//! Parsing of the `METADATA` and `WHEEL` documents of a `.dist-info`.
//!
//! Both documents are RFC 822 style headers. A key may repeat, in which case
//! its values collect into a list in order of appearance. Parsing stops at
//! the first blank line; whatever follows is a free-form body.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::errors::ZappError;
use crate::core::tag::{self, Tag};
use crate::core::WheelInfo;

/// Parsed header fields of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: BTreeMap<String, Vec<String>>,
}

impl Headers {
    /// Parse header text. `document` names the source for error messages.
    pub fn parse(document: &'static str, text: &str) -> Result<Self, ZappError> {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut last: Option<String> = None;

        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                // Folded continuation of the previous value
                let value = last
                    .as_ref()
                    .and_then(|key| fields.get_mut(key))
                    .and_then(|values| values.last_mut())
                    .ok_or_else(|| ZappError::MalformedMetadata {
                        document,
                        message: format!("line {}: continuation without a header", lineno + 1),
                    })?;
                value.push('\n');
                value.push_str(line.trim());
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(ZappError::MalformedMetadata {
                    document,
                    message: format!("line {}: expected `Key: value`, got `{}`", lineno + 1, line),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ZappError::MalformedMetadata {
                    document,
                    message: format!("line {}: empty header name", lineno + 1),
                });
            }

            fields
                .entry(key.to_string())
                .or_default()
                .push(value.trim().to_string());
            last = Some(key.to_string());
        }

        Ok(Headers { fields })
    }

    /// All values for a key, in document order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// The value of a key that must appear exactly once.
    pub fn get_one(&self, document: &'static str, key: &str) -> Result<&str, ZappError> {
        match self.get_all(key) {
            [value] if !value.is_empty() => Ok(value.as_str()),
            [] => Err(ZappError::MalformedMetadata {
                document,
                message: format!("missing `{}`", key),
            }),
            [_] => Err(ZappError::MalformedMetadata {
                document,
                message: format!("empty `{}`", key),
            }),
            values => Err(ZappError::MalformedMetadata {
                document,
                message: format!("`{}` given {} times", key, values.len()),
            }),
        }
    }
}

/// The identity of a wheel: name, version and compatibility tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelMetadata {
    pub name: String,
    pub version: String,
    pub tags: BTreeSet<Tag>,
}

impl WheelMetadata {
    /// Build the identity from the text of `METADATA` and `WHEEL`.
    pub fn parse(metadata: &str, wheel: &str) -> Result<Self, ZappError> {
        let meta = Headers::parse("METADATA", metadata)?;
        let whl = Headers::parse("WHEEL", wheel)?;

        let mut tags = BTreeSet::new();
        for value in whl.get_all("Tag") {
            let expanded = tag::decompress(value).map_err(|_| ZappError::MalformedMetadata {
                document: "WHEEL",
                message: format!("invalid `Tag: {}`", value),
            })?;
            tags.extend(expanded);
        }

        // Only cross-product sets survive compression unchanged
        if !tags.is_empty() && tag::decompress(&tag::compress(&tags)).ok() != Some(tags.clone()) {
            let listed: Vec<_> = tags.iter().map(Tag::to_string).collect();
            return Err(ZappError::MalformedMetadata {
                document: "WHEEL",
                message: format!("tags {} do not form a compressible set", listed.join(", ")),
            });
        }

        Ok(WheelMetadata {
            name: meta.get_one("METADATA", "Name")?.to_string(),
            version: meta.get_one("METADATA", "Version")?.to_string(),
            tags,
        })
    }

    /// The canonical filename: `name-version[-tags].whl`.
    ///
    /// Tags are compressed, so any ordering or grouping of the same set
    /// yields the same name.
    pub fn canonical_filename(&self) -> String {
        let mut name = format!("{}-{}", self.name, self.version);
        if !self.tags.is_empty() {
            name.push('-');
            name.push_str(&tag::compress(&self.tags));
        }
        name.push_str(".whl");
        name
    }

    /// The manifest record for this wheel.
    pub fn info(&self) -> WheelInfo {
        WheelInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            tags: self.tags.iter().map(Tag::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "Metadata-Version: 2.1\nName: Foo\nVersion: 1.0\nSummary: a thing\n\nLong description.\nName: Ignored\n";

    #[test]
    fn test_repeated_keys_collect() {
        let headers = Headers::parse("WHEEL", "Tag: py2-none-any\nTag: py3-none-any\n").unwrap();
        assert_eq!(headers.get_all("Tag"), ["py2-none-any", "py3-none-any"]);
        assert!(headers.get_one("WHEEL", "Tag").is_err());
    }

    #[test]
    fn test_body_is_ignored() {
        let headers = Headers::parse("METADATA", METADATA).unwrap();
        assert_eq!(headers.get_one("METADATA", "Name").unwrap(), "Foo");
    }

    #[test]
    fn test_continuation_lines_fold() {
        let headers = Headers::parse("METADATA", "Summary: one\n  two\n").unwrap();
        assert_eq!(headers.get_all("Summary"), ["one\ntwo"]);
    }

    #[test]
    fn test_line_without_colon_is_an_error() {
        let err = Headers::parse("WHEEL", "Wheel-Version: 1.0\nnonsense\n").unwrap_err();
        assert!(matches!(err, ZappError::MalformedMetadata { document: "WHEEL", .. }));
    }

    #[test]
    fn test_canonical_filename_single_tag() {
        let meta = WheelMetadata::parse(METADATA, "Tag: py3-none-any\n").unwrap();
        assert_eq!(meta.canonical_filename(), "Foo-1.0-py3-none-any.whl");
    }

    #[test]
    fn test_canonical_filename_ignores_tag_order() {
        let a = WheelMetadata::parse(METADATA, "Tag: py3-none-any\nTag: py2-none-any\n").unwrap();
        let b = WheelMetadata::parse(METADATA, "Tag: py2-none-any\nTag: py3-none-any\n").unwrap();
        assert_eq!(a.canonical_filename(), b.canonical_filename());
        assert_eq!(a.canonical_filename(), "Foo-1.0-py2.py3-none-any.whl");
    }

    #[test]
    fn test_canonical_filename_without_tags() {
        let meta = WheelMetadata::parse(METADATA, "Wheel-Version: 1.0\n").unwrap();
        assert_eq!(meta.canonical_filename(), "Foo-1.0.whl");
    }

    #[test]
    fn test_missing_version_is_an_error() {
        let err = WheelMetadata::parse("Name: Foo\n", "").unwrap_err();
        assert!(err.to_string().contains("Version"));
    }

    #[test]
    fn test_malformed_tag_is_an_error() {
        assert!(WheelMetadata::parse(METADATA, "Tag: py3-none\n").is_err());
    }

    #[test]
    fn test_incompressible_tags_are_an_error() {
        let wheel = "Tag: cp39-cp39-linux_x86_64\nTag: py3-none-any\n";
        assert!(WheelMetadata::parse(METADATA, wheel).is_err());
    }
}
