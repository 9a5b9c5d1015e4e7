//! The `RECORD` contents manifest of a wheel.
//!
//! Each line is a CSV row `path,hash,size`. Only the path matters here;
//! hashes are not verified.

use std::collections::BTreeSet;

use crate::core::errors::ZappError;

/// The set of member paths a wheel declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    paths: BTreeSet<String>,
}

impl Record {
    pub fn parse(text: &str) -> Result<Self, ZappError> {
        let mut paths = BTreeSet::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let path = first_field(line).ok_or_else(|| ZappError::MalformedMetadata {
                document: "RECORD",
                message: format!("line {}: unterminated quoted path", lineno + 1),
            })?;
            if path.is_empty() {
                return Err(ZappError::MalformedMetadata {
                    document: "RECORD",
                    message: format!("line {}: empty path", lineno + 1),
                });
            }
            paths.insert(path);
        }
        Ok(Record { paths })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Extract the first CSV field, honoring `"..."` quoting with `""` escapes.
fn first_field(line: &str) -> Option<String> {
    let Some(quoted) = line.strip_prefix('"') else {
        return Some(line.split(',').next().unwrap_or_default().to_string());
    };

    let mut out = String::new();
    let mut chars = quoted.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                out.push('"');
            } else {
                return Some(out);
            }
        } else {
            out.push(c);
        }
    }
    None
}
