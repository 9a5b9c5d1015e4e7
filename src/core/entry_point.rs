//! `module[:function]` references used for prelude and entry points.

use std::fmt;
use std::str::FromStr;

use crate::core::errors::ZappError;

/// A validated reference to a module, optionally qualified by a callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryRef {
    module: String,
    function: Option<String>,
}

impl EntryRef {
    /// Parse and validate a reference.
    ///
    /// Both halves must be dotted paths of identifiers. An empty function
    /// part (`"pkg.mod:"`) is treated as absent.
    pub fn parse(reference: &str) -> Result<Self, ZappError> {
        let (module, function) = match reference.split_once(':') {
            Some((module, function)) => (module, function),
            None => (reference, ""),
        };

        if !is_dotted_identifier(module) {
            return Err(ZappError::InvalidReference {
                reference: reference.to_string(),
                part: "module",
            });
        }
        if !function.is_empty() && !is_dotted_identifier(function) {
            return Err(ZappError::InvalidReference {
                reference: reference.to_string(),
                part: "function",
            });
        }

        Ok(EntryRef {
            module: module.to_string(),
            function: (!function.is_empty()).then(|| function.to_string()),
        })
    }

    /// Validate every reference, failing on the first bad one.
    pub fn parse_all<'a>(
        references: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<EntryRef>, ZappError> {
        references.into_iter().map(EntryRef::parse).collect()
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }
}

impl FromStr for EntryRef {
    type Err = ZappError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryRef::parse(s)
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "{}:{}", self.module, function),
            None => write!(f, "{}", self.module),
        }
    }
}

/// True when every `.`-separated segment is an identifier.
pub fn is_dotted_identifier(path: &str) -> bool {
    path.split('.').all(is_identifier)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {
            chars.all(|c| c == '_' || c.is_alphanumeric())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_and_function() {
        let entry = EntryRef::parse("pkg.mod:fn").unwrap();
        assert_eq!(entry.module(), "pkg.mod");
        assert_eq!(entry.function(), Some("fn"));
        assert_eq!(entry.to_string(), "pkg.mod:fn");
    }

    #[test]
    fn test_module_only() {
        let entry = EntryRef::parse("pkg.mod").unwrap();
        assert_eq!(entry.function(), None);
        assert_eq!(EntryRef::parse("pkg.mod:").unwrap(), entry);
    }

    #[test]
    fn test_leading_digit_is_rejected() {
        let err = EntryRef::parse("1bad:fn").unwrap_err();
        assert!(matches!(
            err,
            ZappError::InvalidReference { part: "module", .. }
        ));
    }

    #[test]
    fn test_bad_function_is_rejected() {
        let err = EntryRef::parse("pkg:not-valid").unwrap_err();
        assert!(matches!(
            err,
            ZappError::InvalidReference {
                part: "function",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_segments_are_rejected() {
        assert!(EntryRef::parse("").is_err());
        assert!(EntryRef::parse(":main").is_err());
        assert!(EntryRef::parse("pkg..mod").is_err());
    }

    #[test]
    fn test_parse_all_stops_at_first_error() {
        assert!(EntryRef::parse_all(["a", "b.c:d"]).is_ok());
        assert!(EntryRef::parse_all(["a", "9"]).is_err());
    }
}
