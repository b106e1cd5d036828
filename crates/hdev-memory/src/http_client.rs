//! HTTP-client memory backend (spec §4.C "HTTP client backend").
//!
//! Maps every operation onto the REST surface in spec §4.C's wire table;
//! retries transient failures with exponential backoff and jitter
//! (grounded in `memory_backends/http.py`'s `_make_request`).

use async_trait::async_trait;
use serde_json::Value;

use hdev_core::retry::{retry_with_backoff, RetryConfig};

use crate::backend::MemoryBackend;
use crate::shapes::{HealthResult, ReadResult, SearchHit, TreeResult, WriteResult};

/// Talks to a remote `hdev-memory` HTTP server over `reqwest`.
pub struct HttpMemoryBackend {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    retry: RetryConfig,
}

impl HttpMemoryBackend {
    /// Point at `base_url` (no trailing slash), optionally authenticating
    /// with a bearer `api_key`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { base_url: base_url.into(), api_key, http: reqwest::Client::new(), retry: RetryConfig::default() }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn request_json(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value, String> {
        let url = format!("{}{}", self.base_url, path);
        retry_with_backoff(
            self.retry,
            || {
                let url = url.clone();
                let body = body.clone();
                let method = method.clone();
                async move {
                    let mut builder = self.authed(self.http.request(method, &url));
                    if let Some(b) = &body {
                        builder = builder.json(b);
                    }
                    let response = builder.send().await.map_err(|e| e.to_string())?;
                    if !response.status().is_success() {
                        return Err(format!("HTTP {} from {url}", response.status()));
                    }
                    response.json::<Value>().await.map_err(|e| e.to_string())
                }
            },
            |_err: &String| true,
        )
        .await
    }
}

#[async_trait]
impl MemoryBackend for HttpMemoryBackend {
    async fn get_tree(&self, prefix: Option<&str>, depth: i64) -> TreeResult {
        let mut path = format!("/api/memory/tree?depth={depth}");
        if let Some(p) = prefix {
            path.push_str(&format!("&prefix={}", urlencode(p)));
        }
        match self.request_json(reqwest::Method::GET, &path, None).await {
            Ok(value) => serde_json::from_value(value)
                .unwrap_or_else(|e| TreeResult::failure(prefix.unwrap_or(""), e.to_string())),
            Err(e) => TreeResult::failure(prefix.unwrap_or(""), format!("HTTP request failed: {e}")),
        }
    }

    async fn read(&self, path: &str) -> ReadResult {
        let url = format!("/api/memory/entry/{}", urlencode(path));
        match self.request_json(reqwest::Method::GET, &url, None).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| ReadResult::failure(path, e.to_string())),
            Err(e) => ReadResult::failure(path, format!("HTTP request failed: {e}")),
        }
    }

    async fn write(&self, path: &str, content: &str, metadata: Option<Value>) -> WriteResult {
        let url = format!("/api/memory/entry/{}", urlencode(path));
        let mut body = serde_json::json!({ "content": content });
        if let Some(m) = metadata {
            body["metadata"] = m;
        }
        match self.request_json(reqwest::Method::PUT, &url, Some(body)).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| WriteResult::failure(path, e.to_string())),
            Err(e) => WriteResult::failure(path, format!("HTTP request failed: {e}")),
        }
    }

    async fn delete(&self, path: &str) -> WriteResult {
        let url = format!("/api/memory/entry/{}", urlencode(path));
        match self.request_json(reqwest::Method::DELETE, &url, None).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| WriteResult::failure(path, e.to_string())),
            Err(e) => WriteResult::failure(path, format!("HTTP request failed: {e}")),
        }
    }

    async fn search(&self, query: &str, prefix: Option<&str>) -> Vec<SearchHit> {
        let mut path = format!("/api/memory/search?q={}", urlencode(query));
        if let Some(p) = prefix {
            path.push_str(&format!("&prefix={}", urlencode(p)));
        }
        match self.request_json(reqwest::Method::GET, &path, None).await {
            Ok(value) => value
                .get("results")
                .and_then(|r| serde_json::from_value::<Vec<SearchHit>>(r.clone()).ok())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn health_check(&self) -> HealthResult {
        match self.request_json(reqwest::Method::GET, "/api/health", None).await {
            Ok(value) => serde_json::from_value(value).unwrap_or(HealthResult {
                healthy: false,
                message: "malformed health response".to_string(),
                details: Value::Null,
            }),
            Err(e) => HealthResult {
                healthy: false,
                message: format!("Health check failed: {e}"),
                details: serde_json::json!({ "base_url": self.base_url }),
            },
        }
    }

    fn backend_type(&self) -> &'static str {
        "http"
    }
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
