//! The abstract memory-backend contract (spec §4.C).

use async_trait::async_trait;
use serde_json::Value;

use crate::shapes::{HealthResult, ReadResult, SearchHit, TreeResult, WriteResult};

/// Hierarchical key/value entry store. Every method is `async` and returns a
/// structured result — never an exception — across this boundary
/// (spec §7 "Policy").
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Get the tree structure under `prefix` (root if `None`), descending
    /// `depth` levels (`-1` unlimited, `0` top level only).
    async fn get_tree(&self, prefix: Option<&str>, depth: i64) -> TreeResult;

    /// Read one entry, or list one directory's immediate children.
    async fn read(&self, path: &str) -> ReadResult;

    /// Write `content` (and merge `metadata`) to `path`, creating parents.
    async fn write(&self, path: &str, content: &str, metadata: Option<Value>) -> WriteResult;

    /// Delete one entry. Does not implicitly delete subtrees.
    async fn delete(&self, path: &str) -> WriteResult;

    /// Substring-search entry contents, optionally scoped under `prefix`.
    async fn search(&self, query: &str, prefix: Option<&str>) -> Vec<SearchHit>;

    /// Health probe. Default implementation attempts `get_tree(depth=0)`
    /// (spec §4.C: "Default: attempt get_tree(depth=0)").
    async fn health_check(&self) -> HealthResult {
        let tree = self.get_tree(None, 0).await;
        HealthResult {
            healthy: tree.success,
            message: if tree.success { "Backend is healthy".to_string() } else { "Backend unhealthy".to_string() },
            details: serde_json::json!({ "backend_type": self.backend_type() }),
        }
    }

    /// Short identifier used in health-check details (e.g. `"filesystem"`,
    /// `"http"`).
    fn backend_type(&self) -> &'static str;
}
