//! Copy every entry from one [`hdev_memory::MemoryBackend`] to another
//! (spec §4.D), grounded in `heare/developer/tools/memory_migrate.py`'s
//! walk-then-copy algorithm.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

use serde::{Deserialize, Serialize};

use hdev_memory::MemoryBackend;

/// One entry-copy failure recorded in [`MigrationStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEntryError {
    /// Entry path that failed to copy.
    pub path: String,
    /// Why it failed.
    pub error: String,
}

/// Per-run counters for [`migrate_all`] (spec §4.D).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStats {
    /// Every entry path discovered under the source tree.
    pub total_entries: usize,
    /// Entries written to the target (or that would be, in dry-run).
    pub copied_entries: usize,
    /// Entries present in target and left alone because `overwrite=false`.
    pub skipped_entries: usize,
    /// Entries that errored while reading from source or writing to target.
    pub failed_entries: usize,
    /// One record per failed entry.
    pub errors: Vec<MigrationEntryError>,
}

/// Overall outcome of [`migrate_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// `true` iff `stats.failed_entries == 0`.
    pub success: bool,
    /// Human-facing one-line summary.
    pub message: String,
    /// Per-entry counters.
    pub stats: MigrationStats,
}

/// Copy every entry under `source`'s tree into `target`.
///
/// Walks `source.get_tree(None, -1)` to leaf paths, then for each: reads
/// from `source`; if `target` already has the entry and `overwrite` is
/// `false`, skips it; otherwise writes it to `target` with the source's
/// content and metadata (unless `dry_run`, in which case the would-be copy
/// is only counted). Per-entry errors are accumulated rather than aborting
/// the whole run (spec §4.D: "Errors are accumulated per-entry").
pub async fn migrate_all(
    source: &dyn MemoryBackend,
    target: &dyn MemoryBackend,
    overwrite: bool,
    dry_run: bool,
) -> MigrationResult {
    let paths = collect_leaf_paths(source, None, -1).await;
    let mut stats = MigrationStats { total_entries: paths.len(), ..Default::default() };

    for path in paths {
        let read = source.read(&path).await;
        if !read.success || read.content.is_none() {
            stats.failed_entries += 1;
            stats.errors.push(MigrationEntryError {
                path: path.clone(),
                error: read.error.unwrap_or_else(|| "source read failed".to_string()),
            });
            continue;
        }

        if !overwrite {
            let existing = target.read(&path).await;
            if existing.success && existing.content.is_some() {
                stats.skipped_entries += 1;
                continue;
            }
        }

        if dry_run {
            stats.copied_entries += 1;
            continue;
        }

        let content = read.content.unwrap_or_default();
        let metadata = read.metadata;
        let write = target.write(&path, &content, metadata).await;
        if write.success {
            stats.copied_entries += 1;
        } else {
            stats.failed_entries += 1;
            stats.errors.push(MigrationEntryError {
                path,
                error: write.error.unwrap_or_else(|| "target write failed".to_string()),
            });
        }
    }

    let success = stats.failed_entries == 0;
    let message = if dry_run {
        format!(
            "Dry run: would copy {}, skip {}, of {} entries",
            stats.copied_entries, stats.skipped_entries, stats.total_entries
        )
    } else {
        format!(
            "Migrated {} of {} entries ({} skipped, {} failed)",
            stats.copied_entries, stats.total_entries, stats.skipped_entries, stats.failed_entries
        )
    };

    if !success {
        tracing::warn!(failed = stats.failed_entries, "migration completed with errors");
    }

    MigrationResult { success, message, stats }
}

/// Recursively walk `backend`'s tree, returning every leaf entry path.
///
/// Leaves and empty directories are indistinguishable in the tree's JSON
/// shape (both serialize as `{}`); treating every empty object as a leaf is
/// harmless here since an empty directory has nothing to migrate anyway.
async fn collect_leaf_paths(backend: &dyn MemoryBackend, prefix: Option<&str>, depth: i64) -> Vec<String> {
    let tree = backend.get_tree(prefix, depth).await;
    if !tree.success {
        return Vec::new();
    }
    let mut out = Vec::new();
    walk_tree_value(&tree.items, prefix.unwrap_or(""), &mut out);
    out
}

fn walk_tree_value(value: &serde_json::Value, prefix: &str, out: &mut Vec<String>) {
    let Some(map) = value.as_object() else { return };
    for (name, child) in map {
        let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
        match child.as_object() {
            Some(obj) if obj.is_empty() => out.push(path),
            // A depth-cut sentinel (`{"...": true}`) can't appear here: `migrate_all`
            // always walks with depth=-1. Recursing is still correct if one ever did —
            // its lone value is a bool, not an object, so the walk bottoms out on it.
            Some(_) => walk_tree_value(child, &path, out),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdev_memory::FilesystemMemoryBackend;

    #[tokio::test]
    async fn fresh_target_copies_every_entry() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = FilesystemMemoryBackend::new(src_dir.path()).await.unwrap();
        let target = FilesystemMemoryBackend::new(dst_dir.path()).await.unwrap();

        source.write("a", "one", None).await;
        source.write("b/c", "two", None).await;
        source.write("d", "three", None).await;

        let result = migrate_all(&source, &target, false, false).await;
        assert!(result.success);
        assert_eq!(result.stats.total_entries, 3);
        assert_eq!(result.stats.copied_entries, 3);
        assert_eq!(result.stats.skipped_entries, 0);
        assert_eq!(result.stats.failed_entries, 0);

        assert_eq!(target.read("a").await.content.as_deref(), Some("one"));
        assert_eq!(target.read("b/c").await.content.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn second_migration_without_overwrite_skips_everything() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = FilesystemMemoryBackend::new(src_dir.path()).await.unwrap();
        let target = FilesystemMemoryBackend::new(dst_dir.path()).await.unwrap();

        source.write("a", "one", None).await;
        source.write("b", "two", None).await;
        source.write("c", "three", None).await;

        migrate_all(&source, &target, false, false).await;
        let second = migrate_all(&source, &target, false, false).await;

        assert_eq!(second.stats.total_entries, 3);
        assert_eq!(second.stats.copied_entries, 0);
        assert_eq!(second.stats.skipped_entries, 3);
        assert_eq!(second.stats.failed_entries, 0);
    }

    #[tokio::test]
    async fn overwrite_true_replaces_existing_content() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = FilesystemMemoryBackend::new(src_dir.path()).await.unwrap();
        let target = FilesystemMemoryBackend::new(dst_dir.path()).await.unwrap();

        source.write("a", "original", None).await;
        target.write("a", "stale", None).await;

        let result = migrate_all(&source, &target, true, false).await;
        assert_eq!(result.stats.copied_entries, 1);
        assert_eq!(target.read("a").await.content.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn dry_run_counts_but_does_not_write() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = FilesystemMemoryBackend::new(src_dir.path()).await.unwrap();
        let target = FilesystemMemoryBackend::new(dst_dir.path()).await.unwrap();

        source.write("a", "one", None).await;

        let result = migrate_all(&source, &target, false, true).await;
        assert_eq!(result.stats.copied_entries, 1);
        assert!(!target.read("a").await.success);
    }

    #[tokio::test]
    async fn empty_source_reports_zero_entries() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = FilesystemMemoryBackend::new(src_dir.path()).await.unwrap();
        let target = FilesystemMemoryBackend::new(dst_dir.path()).await.unwrap();

        let result = migrate_all(&source, &target, false, false).await;
        assert!(result.success);
        assert_eq!(result.stats.total_entries, 0);
    }
}
