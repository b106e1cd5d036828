//! Symlink-aware, ignore-filtered directory listing.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ignore_filter::IgnoreFilter;

/// Errors specific to directory listing.
#[derive(Debug, Error)]
pub enum ListingError {
    /// The requested path resolves outside the sandbox root.
    #[error("path {0} is outside the sandbox")]
    OutsideSandbox(String),
    /// Underlying I/O failure while walking the tree.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for a single listing entry, mirroring the Python
/// `_get_path_metadata` shape.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DirEntryMetadata {
    /// Path relative to the directory being listed.
    pub name: String,
    /// Whether this entry is a symlink.
    pub is_symlink: bool,
    /// Symlink target, if `is_symlink` and readable.
    pub symlink_target: Option<String>,
    /// Fully resolved path of the symlink target, if resolvable.
    pub symlink_resolved_path: Option<String>,
    /// Whether the symlink target currently exists.
    pub symlink_exists: bool,
}

/// Walk `target_dir` (already validated to be inside the sandbox),
/// following symlinked directories (`followlinks=True` in the original),
/// pruning ignored directories, and including symlinked directories
/// themselves as entries rather than only recursing into them.
///
/// `limit`: if the listing would exceed this many entries, an empty list is
/// returned (matches the original's all-or-nothing overflow behavior).
pub(crate) fn list_directory(
    target_dir: &Path,
    recursive: bool,
    limit: usize,
    ignore: &IgnoreFilter,
) -> Result<Vec<String>, ListingError> {
    if !target_dir.exists() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut visited = std::collections::HashSet::new();
    if !walk(target_dir, target_dir, recursive, limit, ignore, &mut out, &mut visited)? {
        return Ok(Vec::new());
    }
    out.sort();
    Ok(out)
}

/// Returns `Ok(false)` if the limit was exceeded (caller returns empty list).
#[allow(clippy::too_many_arguments)]
fn walk(
    root: &Path,
    dir: &Path,
    recursive: bool,
    limit: usize,
    ignore: &IgnoreFilter,
    out: &mut Vec<String>,
    visited: &mut std::collections::HashSet<PathBuf>,
) -> Result<bool, ListingError> {
    let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if !visited.insert(canonical) {
        // Symlink cycle guard: a directory we've already descended into.
        return Ok(true);
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(Result::ok).collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let file_type = entry.file_type()?;
        let is_symlink = file_type.is_symlink();
        let is_dir = if is_symlink {
            path.is_dir() // follows the link, matching os.walk(followlinks=True)
        } else {
            file_type.is_dir()
        };

        if is_dir {
            if ignore.matches(&rel, true) {
                continue;
            }
            if is_symlink {
                // Included as an entry, not merely traversed into.
                out.push(rel.display().to_string());
            }
            if recursive {
                if !walk(root, &path, recursive, limit, ignore, out, visited)? {
                    return Ok(false);
                }
            }
        } else {
            if ignore.matches(&rel, false) {
                continue;
            }
            out.push(rel.display().to_string());
        }

        if out.len() >= limit {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Listing with full symlink metadata, used by tools that need to render
/// symlink targets rather than just a flat path list.
pub(crate) fn list_directory_with_metadata(
    target_dir: &Path,
    recursive: bool,
    limit: usize,
    ignore: &IgnoreFilter,
) -> Result<Vec<DirEntryMetadata>, ListingError> {
    let paths = list_directory(target_dir, recursive, limit, ignore)?;
    let mut out = Vec::with_capacity(paths.len());
    for rel in paths {
        let full = target_dir.join(&rel);
        let is_symlink = full.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false);
        let (symlink_target, symlink_resolved_path, symlink_exists) = if is_symlink {
            let target = std::fs::read_link(&full).ok().map(|p| p.display().to_string());
            let resolved = std::fs::canonicalize(&full).ok().map(|p| p.display().to_string());
            let exists = full.exists();
            (target, resolved, exists)
        } else {
            (None, None, false)
        };
        out.push(DirEntryMetadata {
            name: rel,
            is_symlink,
            symlink_target,
            symlink_resolved_path,
            symlink_exists,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn flat_listing_excludes_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("keep.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join(".git").join("HEAD"), "x").unwrap();
        let ignore = IgnoreFilter::load(tmp.path());
        let listing = list_directory(tmp.path(), true, 1000, &ignore).unwrap();
        assert_eq!(listing, vec!["keep.txt".to_string()]);
    }

    #[test]
    fn missing_dir_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let ignore = IgnoreFilter::load(tmp.path());
        let listing = list_directory(&tmp.path().join("nope"), true, 1000, &ignore).unwrap();
        assert!(listing.is_empty());
    }

    #[test]
    fn over_limit_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(tmp.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let ignore = IgnoreFilter::load(tmp.path());
        let listing = list_directory(tmp.path(), true, 3, &ignore).unwrap();
        assert!(listing.is_empty());
    }
}
