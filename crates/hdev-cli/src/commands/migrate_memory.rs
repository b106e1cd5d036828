//! `hdev migrate-memory` (spec §6 "CLI surface" / §4.D Memory Migrator).

use anyhow::{Context, Result};
use colored::Colorize;

use hdev_memory::{FilesystemMemoryBackend, HttpMemoryBackend, MemoryBackend};
use hdev_migrate::migrate_all;

/// A backend endpoint as given on the command line: either a filesystem
/// directory path or an `http(s)://` URL, optionally with a bearer token
/// appended after `#`.
fn open_backend(endpoint: &str) -> Box<dyn MemoryBackendOpener> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Box::new(HttpEndpoint(endpoint.to_string()))
    } else {
        Box::new(FilesystemEndpoint(endpoint.to_string()))
    }
}

trait MemoryBackendOpener {
    fn open(self: Box<Self>) -> BackendFuture;
}

type BackendFuture = std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<Box<dyn MemoryBackend>>> + Send>>;

struct FilesystemEndpoint(String);
impl MemoryBackendOpener for FilesystemEndpoint {
    fn open(self: Box<Self>) -> BackendFuture {
        Box::pin(async move {
            let backend = FilesystemMemoryBackend::new(self.0).await?;
            Ok(Box::new(backend) as Box<dyn MemoryBackend>)
        })
    }
}

struct HttpEndpoint(String);
impl MemoryBackendOpener for HttpEndpoint {
    fn open(self: Box<Self>) -> BackendFuture {
        Box::pin(async move {
            let (url, api_key) = match self.0.split_once('#') {
                Some((url, key)) => (url.to_string(), Some(key.to_string())),
                None => (self.0.clone(), None),
            };
            Ok(Box::new(HttpMemoryBackend::new(url, api_key)) as Box<dyn MemoryBackend>)
        })
    }
}

/// Copy every entry from `source` to `target` (spec §4.D), printing a
/// one-line stats summary.
pub async fn run(source: String, target: String, overwrite: bool, dry_run: bool) -> Result<()> {
    let source_backend = open_backend(&source).open().await.context("opening source backend")?;
    let target_backend = open_backend(&target).open().await.context("opening target backend")?;

    let result = migrate_all(source_backend.as_ref(), target_backend.as_ref(), overwrite, dry_run).await;

    let summary = format!(
        "total={} copied={} skipped={} failed={}",
        result.stats.total_entries, result.stats.copied_entries, result.stats.skipped_entries, result.stats.failed_entries
    );
    if result.success {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
        for error in &result.stats.errors {
            println!("  {}: {}", error.path, error.error);
        }
    }
    Ok(())
}
