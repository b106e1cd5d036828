//! Entry-path validation (spec §3 "Path invariants": no leading slash, no
//! `..`, no embedded null).

/// Why an entry path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPath {
    /// Path began with `/`.
    #[error("path must not start with '/'")]
    LeadingSlash,
    /// Path contained a `..` component.
    #[error("path must not contain '..'")]
    ParentTraversal,
    /// Path contained a NUL byte.
    #[error("path must not contain a null byte")]
    EmbeddedNull,
    /// Path was empty.
    #[error("path must not be empty")]
    Empty,
}

/// Validate an entry path against the invariants in spec §3.
pub fn validate(path: &str) -> Result<(), InvalidPath> {
    if path.is_empty() {
        return Err(InvalidPath::Empty);
    }
    if path.starts_with('/') {
        return Err(InvalidPath::LeadingSlash);
    }
    if path.contains('\0') {
        return Err(InvalidPath::EmbeddedNull);
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(InvalidPath::ParentTraversal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_hierarchical_path() {
        assert!(validate("projects/foo/notes").is_ok());
    }

    #[test]
    fn rejects_leading_slash_and_traversal_and_null() {
        assert_eq!(validate("/abs").unwrap_err(), InvalidPath::LeadingSlash);
        assert_eq!(validate("a/../b").unwrap_err(), InvalidPath::ParentTraversal);
        assert_eq!(validate("a\0b").unwrap_err(), InvalidPath::EmbeddedNull);
        assert_eq!(validate("").unwrap_err(), InvalidPath::Empty);
    }
}
