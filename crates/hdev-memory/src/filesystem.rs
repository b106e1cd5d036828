//! Local-filesystem memory backend (spec §4.C "Filesystem backend").
//!
//! Entries live at `root/<path>.json`, each holding `{content, metadata}`
//! (spec §6 "Persistent state layout").

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::backend::MemoryBackend;
use crate::path::validate;
use crate::shapes::{EntryMetadata, HealthResult, ReadResult, SearchHit, StoredEntry, TreeResult, WriteResult};

/// Memory backend rooted at a directory on the local filesystem.
pub struct FilesystemMemoryBackend {
    root: PathBuf,
}

impl FilesystemMemoryBackend {
    /// Use `root` as the entry tree's root, creating it if missing.
    pub async fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn entry_file(&self, path: &str) -> PathBuf {
        self.root.join(format!("{path}.json"))
    }

    fn dir_for(&self, prefix: Option<&str>) -> PathBuf {
        match prefix {
            Some(p) if !p.is_empty() => self.root.join(p),
            _ => self.root.clone(),
        }
    }

    async fn load_entry(&self, path: &str) -> Option<StoredEntry> {
        let raw = tokio::fs::read(self.entry_file(path)).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    fn build_tree<'a>(
        dir: &'a Path,
        depth: i64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            let mut names: Vec<(String, bool)> = Vec::new();
            let mut read_dir = match tokio::fs::read_dir(dir).await {
                Ok(r) => r,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Value::Object(Default::default())),
                Err(e) => return Err(e),
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let file_type = entry.file_type().await?;
                let name = entry.file_name().to_string_lossy().to_string();
                if file_type.is_dir() {
                    names.push((name, true));
                } else if let Some(stem) = name.strip_suffix(".json") {
                    names.push((stem.to_string(), false));
                }
            }
            names.sort();

            let mut map = serde_json::Map::new();
            for (name, is_dir) in names {
                if is_dir {
                    if depth == 0 {
                        map.insert(name, serde_json::json!({ "...": true }));
                    } else {
                        let child_depth = if depth < 0 { -1 } else { depth - 1 };
                        let subtree = Self::build_tree(&dir.join(&name), child_depth).await?;
                        map.insert(name, subtree);
                    }
                } else {
                    map.insert(name, Value::Object(Default::default()));
                }
            }
            Ok(Value::Object(map))
        })
    }

    fn collect_entry_paths<'a>(
        dir: &'a Path,
        rel: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            let mut out = Vec::new();
            let mut read_dir = match tokio::fs::read_dir(dir).await {
                Ok(r) => r,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
                Err(e) => return Err(e),
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let file_type = entry.file_type().await?;
                let name = entry.file_name().to_string_lossy().to_string();
                if file_type.is_dir() {
                    let child_rel = if rel.is_empty() { name.clone() } else { format!("{rel}/{name}") };
                    out.extend(Self::collect_entry_paths(&entry.path(), child_rel).await?);
                } else if let Some(stem) = name.strip_suffix(".json") {
                    out.push(if rel.is_empty() { stem.to_string() } else { format!("{rel}/{stem}") });
                }
            }
            Ok(out)
        })
    }
}

#[async_trait]
impl MemoryBackend for FilesystemMemoryBackend {
    async fn get_tree(&self, prefix: Option<&str>, depth: i64) -> TreeResult {
        if let Some(p) = prefix {
            if let Err(e) = validate(p) {
                return TreeResult::failure(p, e.to_string());
            }
        }
        let dir = self.dir_for(prefix);
        match Self::build_tree(&dir, depth).await {
            Ok(items) => TreeResult { kind: "tree".to_string(), path: prefix.unwrap_or("").to_string(), items, success: true, error: None },
            Err(e) => TreeResult::failure(prefix.unwrap_or(""), e.to_string()),
        }
    }

    async fn read(&self, path: &str) -> ReadResult {
        if let Err(e) = validate(path) {
            return ReadResult::failure(path, e.to_string());
        }
        if let Some(entry) = self.load_entry(path).await {
            return ReadResult {
                kind: "file".to_string(),
                path: path.to_string(),
                content: Some(entry.content),
                metadata: Some(serde_json::to_value(&entry.metadata).unwrap_or(Value::Null)),
                items: None,
                success: true,
                error: None,
            };
        }
        let dir = self.root.join(path);
        if dir.is_dir() {
            let children = Self::collect_entry_paths(&dir, String::new()).await.unwrap_or_default();
            return ReadResult { kind: "directory".to_string(), path: path.to_string(), content: None, metadata: None, items: Some(children), success: true, error: None };
        }
        ReadResult::failure(path, format!("No such memory entry: {path}"))
    }

    async fn write(&self, path: &str, content: &str, metadata: Option<Value>) -> WriteResult {
        if let Err(e) = validate(path) {
            return WriteResult::failure(path, e.to_string());
        }
        let file = self.entry_file(path);
        if let Some(parent) = file.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return WriteResult::failure(path, e.to_string());
            }
        }

        let now = Utc::now().to_rfc3339();
        let existing = self.load_entry(path).await;
        let caller_fields = match metadata {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let merged_metadata = match existing {
            Some(prior) => {
                let mut extra = prior.metadata.extra;
                extra.extend(caller_fields);
                EntryMetadata { created: prior.metadata.created, updated: now, version: prior.metadata.version.saturating_add(1), extra }
            }
            None => EntryMetadata { created: now.clone(), updated: now, version: 1, extra: caller_fields },
        };

        let entry = StoredEntry { content: content.to_string(), metadata: merged_metadata };
        let serialized = match serde_json::to_vec_pretty(&entry) {
            Ok(bytes) => bytes,
            Err(e) => return WriteResult::failure(path, e.to_string()),
        };
        match tokio::fs::write(&file, serialized).await {
            Ok(()) => WriteResult::ok(path, format!("Wrote {path}")),
            Err(e) => WriteResult::failure(path, e.to_string()),
        }
    }

    async fn delete(&self, path: &str) -> WriteResult {
        if let Err(e) = validate(path) {
            return WriteResult::failure(path, e.to_string());
        }
        match tokio::fs::remove_file(self.entry_file(path)).await {
            Ok(()) => WriteResult::ok(path, format!("Deleted {path}")),
            Err(e) => WriteResult::failure(path, e.to_string()),
        }
    }

    async fn search(&self, query: &str, prefix: Option<&str>) -> Vec<SearchHit> {
        let dir = self.dir_for(prefix);
        let Ok(paths) = Self::collect_entry_paths(&dir, String::new()).await else { return Vec::new() };
        let query_lower = query.to_ascii_lowercase();
        let mut hits = Vec::new();
        for rel in paths {
            let full_path = match prefix {
                Some(p) if !p.is_empty() => format!("{p}/{rel}"),
                _ => rel,
            };
            let Some(entry) = self.load_entry(&full_path).await else { continue };
            let content_lower = entry.content.to_ascii_lowercase();
            let Some(pos) = content_lower.find(&query_lower) else { continue };
            let start = content_lower[..pos].char_indices().rev().nth(40).map_or(0, |(i, _)| i);
            let desired_end = (pos + query.len() + 40).min(entry.content.len());
            let end = (desired_end..=entry.content.len())
                .find(|&i| entry.content.is_char_boundary(i))
                .unwrap_or(entry.content.len());
            let snippet = entry.content[start..end].to_string();
            let score = 1.0 / (1.0 + pos as f64);
            hits.push(SearchHit { path: full_path, snippet, score });
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }

    fn backend_type(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips_and_bumps_version() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FilesystemMemoryBackend::new(tmp.path()).await.unwrap();

        let first = backend.write("notes/today", "hello", None).await;
        assert!(first.success);
        let read_back = backend.read("notes/today").await;
        assert_eq!(read_back.content.as_deref(), Some("hello"));
        let meta: EntryMetadata = serde_json::from_value(read_back.metadata.clone().unwrap()).unwrap();
        assert_eq!(meta.version, 1);

        let second = backend.write("notes/today", "hello again", None).await;
        assert!(second.success);
        let read_again = backend.read("notes/today").await;
        let meta2: EntryMetadata = serde_json::from_value(read_again.metadata.unwrap()).unwrap();
        assert_eq!(meta2.version, 2);
        assert_eq!(meta2.created, meta.created);
        assert!(meta2.updated >= meta.updated);
    }

    #[tokio::test]
    async fn missing_entry_is_structured_failure_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FilesystemMemoryBackend::new(tmp.path()).await.unwrap();
        let result = backend.read("nope").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn depth_zero_prunes_subdirectories_to_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FilesystemMemoryBackend::new(tmp.path()).await.unwrap();
        backend.write("a/b", "x", None).await;
        backend.write("top", "y", None).await;

        let tree = backend.get_tree(None, 0).await;
        assert!(tree.success);
        let items = tree.items.as_object().unwrap();
        assert_eq!(items["a"], serde_json::json!({ "...": true }));
        assert_eq!(items["top"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn get_tree_depth_zero_on_empty_root_is_empty_object() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FilesystemMemoryBackend::new(tmp.path()).await.unwrap();
        let tree = backend.get_tree(None, 0).await;
        assert!(tree.success);
        assert_eq!(tree.items, serde_json::json!({}));
    }

    #[tokio::test]
    async fn search_snippet_does_not_panic_on_multibyte_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FilesystemMemoryBackend::new(tmp.path()).await.unwrap();
        // "needle" ends at byte 16; the trailing "a" plus 30 two-byte "é"s
        // puts the naive `pos + query.len() + 40` cut (byte 56) one byte
        // into the 20th "é", which is not a char boundary.
        let content = format!("0123456789needlea{}", "é".repeat(30));
        backend.write("diary/wide", &content, None).await;

        let hits = backend.search("needle", None).await;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("needle"));
    }

    #[tokio::test]
    async fn search_finds_substring_and_builds_snippet() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FilesystemMemoryBackend::new(tmp.path()).await.unwrap();
        backend.write("diary/one", "the quick brown fox jumps", None).await;
        backend.write("diary/two", "nothing relevant here", None).await;

        let hits = backend.search("brown fox", None).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "diary/one");
        assert!(hits[0].snippet.contains("brown fox"));
    }
}
