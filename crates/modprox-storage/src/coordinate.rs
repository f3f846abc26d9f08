//! Module coordinates: the `(base URL, module path)` pair naming a module.
//!
//! Coordinates are validated once at construction. Every path element is
//! restricted to ASCII letters, digits and `-._~`, may not be `.` or `..`,
//! and may not begin or end with a dot, which keeps a coordinate safe to
//! use as a relative filesystem path.
//!
//! Upper-case letters are legal but are stored and transported in escaped
//! form (`A` becomes `!a`) so that two coordinates differing only by case
//! never collide on a case-insensitive filesystem.

use std::fmt;

use crate::error::{Result, StorageError};

/// A validated `(base URL, module)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    base_url: String,
    module: String,
}

impl Coordinate {
    /// Build a coordinate, validating both halves.
    pub fn new(base_url: impl Into<String>, module: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let module = module.into();

        if base_url.is_empty() {
            return Err(StorageError::invalid("base URL is empty"));
        }
        if module.is_empty() {
            return Err(StorageError::invalid("module path is empty"));
        }
        if module.contains('/') {
            return Err(StorageError::invalid(format!(
                "module '{module}' must be a single path element"
            )));
        }

        for elem in base_url.split('/') {
            check_element(elem, &base_url)?;
        }
        check_element(&module, &module)?;

        Ok(Coordinate { base_url, module })
    }

    /// Parse a full module path such as `example.com/foo`, splitting at the
    /// final `/`.
    pub fn parse(path: &str) -> Result<Self> {
        match path.rsplit_once('/') {
            Some((base_url, module)) => Coordinate::new(base_url, module),
            None => Err(StorageError::invalid(format!(
                "module path '{path}' has no base URL"
            ))),
        }
    }

    /// The base URL half, e.g. `github.com/arschles`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The final path element.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Path elements in escaped form, base URL first.
    pub fn escaped_elements(&self) -> impl Iterator<Item = String> + '_ {
        self.base_url
            .split('/')
            .chain(std::iter::once(self.module.as_str()))
            .map(escape_path)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base_url, self.module)
    }
}

fn check_element(elem: &str, whole: &str) -> Result<()> {
    if elem.is_empty() {
        return Err(StorageError::invalid(format!(
            "'{whole}' contains an empty path element"
        )));
    }
    if elem.starts_with('.') || elem.ends_with('.') {
        return Err(StorageError::invalid(format!(
            "path element '{elem}' in '{whole}' begins or ends with a dot"
        )));
    }
    if let Some(bad) = elem
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')))
    {
        return Err(StorageError::invalid(format!(
            "path element '{elem}' in '{whole}' contains disallowed character {bad:?}"
        )));
    }
    Ok(())
}

/// Escape upper-case ASCII letters as `!` followed by the lower-case letter.
pub fn escape_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse [`escape_path`].
///
/// A bare upper-case letter, or a `!` not followed by a lower-case letter,
/// is rejected so that every unescaped string has exactly one escaped form.
pub fn unescape_path(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(next) if next.is_ascii_lowercase() => out.push(next.to_ascii_uppercase()),
                _ => {
                    return Err(StorageError::invalid(format!(
                        "'{s}' has '!' not followed by a lower-case letter"
                    )))
                }
            },
            c if c.is_ascii_uppercase() => {
                return Err(StorageError::invalid(format!(
                    "'{s}' has an unescaped upper-case letter"
                )))
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parse_splits_at_last_slash() {
        let c = Coordinate::parse("github.com/arschles/vgoprox").unwrap();
        assert_eq!(c.base_url(), "github.com/arschles");
        assert_eq!(c.module(), "vgoprox");
        assert_eq!(c.to_string(), "github.com/arschles/vgoprox");
    }

    #[test]
    fn rejects_malformed() {
        for (base, module) in [
            ("", "foo"),
            ("example.com", ""),
            ("example.com", "a/b"),
            ("example.com//x", "foo"),
            ("example.com/..", "foo"),
            ("example.com", ".hidden"),
            ("example.com", "trailing."),
            ("example.com", "sp ace"),
            ("example.com", "at@v"),
            ("example.com\\x", "foo"),
        ] {
            let err = Coordinate::new(base, module).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Invalid, "{base} / {module}");
        }
        assert!(Coordinate::parse("nobase").is_err());
    }

    #[test]
    fn accepts_dots_inside_elements() {
        let c = Coordinate::new("gopkg.in", "yaml.v2").unwrap();
        assert_eq!(c.to_string(), "gopkg.in/yaml.v2");
    }

    #[test]
    fn escape_round_trip() {
        assert_eq!(escape_path("github.com/Azure/SDK"), "github.com/!azure/!s!d!k");
        assert_eq!(
            unescape_path("github.com/!azure/!s!d!k").unwrap(),
            "github.com/Azure/SDK"
        );
        assert_eq!(escape_path("plain"), "plain");
    }

    #[test]
    fn unescape_rejects_ambiguous_forms() {
        assert!(unescape_path("Azure").is_err());
        assert!(unescape_path("bad!").is_err());
        assert!(unescape_path("bad!1").is_err());
    }

    #[test]
    fn escaped_elements_cover_base_and_module() {
        let c = Coordinate::new("github.com/Azure", "Go").unwrap();
        let elems: Vec<String> = c.escaped_elements().collect();
        assert_eq!(elems, vec!["github.com", "!azure", "!go"]);
    }
}
