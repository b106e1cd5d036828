//! Gzip-per-entry S3 backup and restore (spec §4.E), grounded in
//! `heare/developer/s3_backup.py`'s `S3BackupManager`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hdev_memory::MemoryBackend;

use crate::store::ObjectStore;

const BACKUP_PREFIX: &str = "hdev-memory-backups";

/// `metadata.json` written alongside every backup (spec §4.E).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Name this backup was stored under.
    pub backup_name: String,
    /// RFC 3339 timestamp the backup was taken at.
    pub timestamp: String,
    /// Number of entries included.
    pub total_entries: usize,
    /// [`MemoryBackend::backend_type`] of the source backend.
    pub backend_type: String,
    /// Metadata format version, fixed at `"1.0"`.
    pub version: String,
}

/// Per-entry failure recorded during backup or restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntryError {
    /// Entry path that failed.
    pub path: String,
    /// Why it failed.
    pub error: String,
}

/// Result of [`S3BackupManager::backup_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupResult {
    /// `true` iff every entry backed up without error.
    pub success: bool,
    /// Name the backup was stored under.
    pub backup_name: String,
    /// Human-facing summary.
    pub message: String,
    /// Number of entries successfully written.
    pub entries_backed_up: usize,
    /// Per-entry failures.
    pub errors: Vec<BackupEntryError>,
}

/// Result of [`S3BackupManager::restore_backup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreResult {
    /// `true` iff every entry restored without error.
    pub success: bool,
    /// Human-facing summary.
    pub message: String,
    /// Number of entries written to the target backend.
    pub entries_restored: usize,
    /// Number of entries left alone because the target already had them
    /// and `overwrite` was `false`.
    pub entries_skipped: usize,
    /// Per-entry failures.
    pub errors: Vec<BackupEntryError>,
    /// The backup's own metadata, for the caller's reference.
    pub backup_metadata: Option<BackupMetadata>,
}

/// One row of [`S3BackupManager::list_backups`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSummary {
    /// Backup name.
    pub backup_name: String,
    /// Its recorded timestamp (`"unknown"` if metadata is missing).
    pub timestamp: String,
    /// Its recorded entry count.
    pub total_entries: usize,
}

#[derive(Serialize, Deserialize)]
struct EntryPayload {
    content: String,
    metadata: Value,
}

/// Gzip-per-entry S3 backup and restore of a [`MemoryBackend`].
pub struct S3BackupManager<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> S3BackupManager<S> {
    /// Wrap an [`ObjectStore`] (production: [`crate::RustS3Store`]; tests:
    /// an in-memory double).
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn metadata_key(backup_name: &str) -> String {
        format!("{BACKUP_PREFIX}/{backup_name}/metadata.json")
    }

    fn entry_key(backup_name: &str, path: &str) -> String {
        format!("{BACKUP_PREFIX}/{backup_name}/entries/{path}.json.gz")
    }

    fn gzip(payload: &EntryPayload) -> Result<Vec<u8>, String> {
        let json = serde_json::to_vec(payload).map_err(|e| e.to_string())?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(|e| e.to_string())?;
        encoder.finish().map_err(|e| e.to_string())
    }

    fn gunzip(bytes: &[u8]) -> Result<EntryPayload, String> {
        let mut decoder = GzDecoder::new(bytes);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json).map_err(|e| e.to_string())?;
        serde_json::from_slice(&json).map_err(|e| e.to_string())
    }

    /// Back up every entry in `backend` under `backup_name` (defaulting to
    /// `backup_<UTC timestamp>` if `None`).
    pub async fn backup_all(&self, backend: &dyn MemoryBackend, backup_name: Option<String>, now: chrono::DateTime<chrono::Utc>) -> BackupResult {
        let backup_name = backup_name.unwrap_or_else(|| format!("backup_{}", now.format("%Y%m%d_%H%M%S")));
        let paths = hdev_migrate_leaf_paths(backend).await;

        let mut entries_backed_up = 0;
        let mut errors = Vec::new();

        for path in &paths {
            let read = backend.read(path).await;
            if !read.success {
                errors.push(BackupEntryError { path: path.clone(), error: read.error.unwrap_or_default() });
                continue;
            }
            let payload = EntryPayload {
                content: read.content.unwrap_or_default(),
                metadata: read.metadata.unwrap_or(Value::Null),
            };
            let gzipped = match Self::gzip(&payload) {
                Ok(bytes) => bytes,
                Err(e) => {
                    errors.push(BackupEntryError { path: path.clone(), error: e });
                    continue;
                }
            };
            match self.store.put(&Self::entry_key(&backup_name, path), gzipped).await {
                Ok(()) => entries_backed_up += 1,
                Err(e) => errors.push(BackupEntryError { path: path.clone(), error: e }),
            }
        }

        let metadata = BackupMetadata {
            backup_name: backup_name.clone(),
            timestamp: now.to_rfc3339(),
            total_entries: paths.len(),
            backend_type: backend.backend_type().to_string(),
            version: "1.0".to_string(),
        };
        let metadata_bytes = serde_json::to_vec_pretty(&metadata).unwrap_or_default();
        if let Err(e) = self.store.put(&Self::metadata_key(&backup_name), metadata_bytes).await {
            errors.push(BackupEntryError { path: "metadata.json".to_string(), error: e });
        }

        let success = errors.is_empty();
        let message = format!("Backup completed. {entries_backed_up} entries backed up{}", if errors.is_empty() { String::new() } else { format!(", {} failed", errors.len()) });
        BackupResult { success, backup_name, message, entries_backed_up, errors }
    }

    async fn fetch_metadata(&self, backup_name: &str) -> Option<BackupMetadata> {
        let bytes = self.store.get(&Self::metadata_key(backup_name)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn list_entry_paths(&self, backup_name: &str) -> Vec<String> {
        let prefix = format!("{BACKUP_PREFIX}/{backup_name}/entries/");
        let Ok(keys) = self.store.list(&prefix).await else { return Vec::new() };
        keys.into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).and_then(|rest| rest.strip_suffix(".json.gz")).map(str::to_string))
            .collect()
    }

    /// Restore every entry of `backup_name` into `backend`.
    pub async fn restore_backup(&self, backend: &dyn MemoryBackend, backup_name: &str, overwrite: bool) -> RestoreResult {
        let Some(metadata) = self.fetch_metadata(backup_name).await else {
            return RestoreResult {
                success: false,
                message: format!("Backup '{backup_name}' not found or metadata missing"),
                entries_restored: 0,
                entries_skipped: 0,
                errors: Vec::new(),
                backup_metadata: None,
            };
        };

        let entry_paths = self.list_entry_paths(backup_name).await;
        let mut entries_restored = 0;
        let mut entries_skipped = 0;
        let mut errors = Vec::new();

        for path in entry_paths {
            if !overwrite {
                let existing = backend.read(&path).await;
                if existing.success && existing.content.is_some() {
                    entries_skipped += 1;
                    continue;
                }
            }

            let key = Self::entry_key(backup_name, &path);
            let bytes = match self.store.get(&key).await {
                Ok(b) => b,
                Err(e) => {
                    errors.push(BackupEntryError { path, error: e });
                    continue;
                }
            };
            let payload = match Self::gunzip(&bytes) {
                Ok(p) => p,
                Err(e) => {
                    errors.push(BackupEntryError { path, error: e });
                    continue;
                }
            };
            let write = backend.write(&path, &payload.content, Some(payload.metadata)).await;
            if write.success {
                entries_restored += 1;
            } else {
                errors.push(BackupEntryError { path, error: write.error.unwrap_or_default() });
            }
        }

        let success = errors.is_empty();
        let mut message = format!("Restore completed. {entries_restored} entries restored");
        if entries_skipped > 0 {
            message.push_str(&format!(", {entries_skipped} skipped"));
        }
        if !errors.is_empty() {
            message.push_str(&format!(", {} failed", errors.len()));
        }

        RestoreResult { success, message, entries_restored, entries_skipped, errors, backup_metadata: Some(metadata) }
    }

    /// List every backup under the shared prefix, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupSummary>, String> {
        let prefixes = self.store.list_common_prefixes(&format!("{BACKUP_PREFIX}/")).await?;
        let mut backups = Vec::new();
        for prefix in prefixes {
            let Some(name) = prefix.trim_end_matches('/').rsplit('/').next() else { continue };
            let metadata = self.fetch_metadata(name).await;
            backups.push(BackupSummary {
                backup_name: name.to_string(),
                timestamp: metadata.as_ref().map_or_else(|| "unknown".to_string(), |m| m.timestamp.clone()),
                total_entries: metadata.as_ref().map_or(0, |m| m.total_entries),
            });
        }
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Delete every object stored under `backup_name`'s prefix.
    pub async fn delete_backup(&self, backup_name: &str) -> Result<(), String> {
        self.store.delete_prefix(&format!("{BACKUP_PREFIX}/{backup_name}/")).await
    }
}

/// Walk `backend`'s full tree to leaf entry paths, reusing the same
/// depth-cut-aware traversal `hdev-migrate` uses.
async fn hdev_migrate_leaf_paths(backend: &dyn MemoryBackend) -> Vec<String> {
    let tree = backend.get_tree(None, -1).await;
    if !tree.success {
        return Vec::new();
    }
    let mut out = Vec::new();
    walk(&tree.items, "", &mut out);
    out
}

fn walk(value: &Value, prefix: &str, out: &mut Vec<String>) {
    let Some(map) = value.as_object() else { return };
    for (name, child) in map {
        let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
        match child.as_object() {
            Some(obj) if obj.is_empty() => out.push(path),
            Some(obj) if obj.contains_key("...") => {}
            Some(_) => walk(child, &path, out),
            None => {}
        }
    }
}
