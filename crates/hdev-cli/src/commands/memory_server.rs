//! `hdev memory-server` (spec §6 "CLI surface"): launch the memory HTTP
//! server backend (spec §4.C "HTTP server backend") standalone.

use std::path::PathBuf;

use anyhow::{Context, Result};

use hdev_memory::{router, FilesystemMemoryBackend};

/// Serve the filesystem memory backend over HTTP at `bind_addr`.
pub async fn run(memory_root: PathBuf, bind_addr: String, api_key: Option<String>) -> Result<()> {
    let backend = std::sync::Arc::new(
        FilesystemMemoryBackend::new(memory_root)
            .await
            .context("initializing the filesystem memory backend")?,
    );
    let app = router(backend, api_key);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(%bind_addr, "memory server listening");
    axum::serve(listener, app).await.context("memory server stopped")?;
    Ok(())
}
