//! LLM transport client: the concrete side of the "taken as given" streaming
//! contract (spec §6).

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hdev_ratelimit::RateLimiter;

use crate::error::LlmError;
use crate::types::{StopReason, StreamEvent, ToolSchema, Turn, Usage};

/// Everything one chat-completion call needs (spec §4.I "SendingToLLM").
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// API model identifier.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u64,
    /// Dynamically assembled system prompt (spec §6 "System prompt").
    pub system: String,
    /// Declared tool schemas, last one optionally cache-marked.
    pub tools: Vec<ToolSchema>,
    /// Ordered conversation history to send.
    pub messages: Vec<Turn>,
    /// Always `true` for [`AnthropicClient::stream_turn`]; kept as a field
    /// so the request shape matches what `count_tokens` sends (`false`).
    pub stream: bool,
}

/// A boxed, owned stream of [`StreamEvent`]s.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Implemented by whatever drives the actual wire protocol. Kept as a trait
/// so the Agent Loop (and its tests) can swap in a scripted double without
/// touching `reqwest` (spec §8 "mocked LLM" scenarios S1-S6).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue a streaming chat-completion call and return its event stream.
    /// The final item is always a [`StreamEvent::MessageComplete`] or
    /// [`StreamEvent::Error`].
    async fn stream_turn(&self, request: ChatRequest) -> Result<EventStream, LlmError>;

    /// Count tokens for the full assembled payload (spec §4.H). Returns the
    /// provider's own count; callers fall back to `chars/3.5` on error.
    async fn count_tokens(&self, request: &ChatRequest) -> Result<u64, LlmError>;
}

/// Anthropic-shaped streaming HTTP client: SSE `data:` lines carrying
/// `content_block_start` / `content_block_delta` / `content_block_stop` /
/// `message_delta` / `message_stop` events.
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl AnthropicClient {
    /// Construct a client bound to `base_url` (no trailing slash) using
    /// `api_key` and sharing `rate_limiter` with the rest of the session.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            rate_limiter,
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", "2023-06-01".to_string()),
            ("content-type", "application/json".to_string()),
        ]
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn stream_turn(&self, request: ChatRequest) -> Result<EventStream, LlmError> {
        self.rate_limiter.wait_if_needed().await;

        let mut req = self.http.post(format!("{}/v1/messages", self.base_url)).json(&request);
        for (name, value) in self.headers() {
            req = req.header(name, value);
        }
        let response = req.send().await?;

        let header_pairs: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        self.rate_limiter
            .update_from_headers(header_pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                self.rate_limiter.record_rate_limit_error();
            }
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), message: body });
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(sse_to_events(byte_stream)))
    }

    async fn count_tokens(&self, request: &ChatRequest) -> Result<u64, LlmError> {
        #[derive(Deserialize)]
        struct CountResponse {
            input_tokens: u64,
        }

        let mut counting_request = request.clone();
        counting_request.stream = false;

        let mut req =
            self.http.post(format!("{}/v1/messages/count_tokens", self.base_url)).json(&counting_request);
        for (name, value) in self.headers() {
            req = req.header(name, value);
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), message: body });
        }
        let parsed: CountResponse = response.json().await?;
        Ok(parsed.input_tokens)
    }
}

/// Parse a byte stream of SSE `data: {...}` frames into [`StreamEvent`]s,
/// accumulating partial content blocks the way the provider's own SDKs do.
fn sse_to_events(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static {
    async_stream::stream! {
        let mut buf = String::new();
        let mut accumulated = Accumulator::default();
        futures::pin_mut!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::Http(e));
                    return;
                }
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buf.find("\n\n") {
                let frame = buf[..pos].to_string();
                buf.drain(..=pos + 1);
                for line in frame.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        continue;
                    }
                    match serde_json::from_str::<Value>(data) {
                        Ok(event) => {
                            for out in accumulated.apply(&event) {
                                yield out;
                            }
                        }
                        Err(e) => {
                            yield Err(LlmError::Serde(e));
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct Accumulator {
    content: Vec<crate::types::ContentBlock>,
    current_text: String,
    current_tool_id: Option<String>,
    current_tool_name: Option<String>,
    current_tool_json: String,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

impl Accumulator {
    fn apply(&mut self, event: &Value) -> Vec<Result<StreamEvent, LlmError>> {
        let mut out = Vec::new();
        match event.get("type").and_then(Value::as_str) {
            Some("content_block_start") => {
                if let Some(block) = event.get("content_block") {
                    match block.get("type").and_then(Value::as_str) {
                        Some("tool_use") => {
                            let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                            let name =
                                block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                            self.current_tool_id = Some(id.clone());
                            self.current_tool_name = Some(name.clone());
                            self.current_tool_json.clear();
                            out.push(Ok(StreamEvent::ToolUseStart { id, name }));
                        }
                        _ => self.current_text.clear(),
                    }
                }
            }
            Some("content_block_delta") => {
                if let Some(delta) = event.get("delta") {
                    match delta.get("type").and_then(Value::as_str) {
                        Some("text_delta") => {
                            let text = delta.get("text").and_then(Value::as_str).unwrap_or_default();
                            self.current_text.push_str(text);
                            out.push(Ok(StreamEvent::TextDelta(text.to_string())));
                        }
                        Some("input_json_delta") => {
                            let partial = delta.get("partial_json").and_then(Value::as_str).unwrap_or_default();
                            self.current_tool_json.push_str(partial);
                            if let Some(id) = self.current_tool_id.clone() {
                                out.push(Ok(StreamEvent::ToolUseDelta {
                                    id,
                                    partial_json: partial.to_string(),
                                }));
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some("content_block_stop") => {
                if let Some(id) = self.current_tool_id.take() {
                    let name = self.current_tool_name.take().unwrap_or_default();
                    let input: Value = serde_json::from_str(&self.current_tool_json)
                        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
                    self.content.push(crate::types::ContentBlock::ToolUse { id, name, input });
                } else if !self.current_text.is_empty() {
                    self.content.push(crate::types::ContentBlock::text(std::mem::take(&mut self.current_text)));
                }
            }
            Some("message_delta") => {
                if let Some(usage) = event.get("usage") {
                    self.merge_usage(usage);
                }
                if let Some(reason) = event.get("delta").and_then(|d| d.get("stop_reason")).and_then(Value::as_str)
                {
                    self.stop_reason = parse_stop_reason(reason);
                }
            }
            Some("message_start") => {
                if let Some(usage) = event.get("message").and_then(|m| m.get("usage")) {
                    self.merge_usage(usage);
                }
            }
            Some("message_stop") => {
                out.push(Ok(StreamEvent::MessageComplete(crate::types::LlmResponse {
                    content: std::mem::take(&mut self.content),
                    stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
                    usage: self.usage,
                })));
            }
            Some("error") => {
                let message = event
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error")
                    .to_string();
                out.push(Ok(StreamEvent::Error(message)));
            }
            _ => {}
        }
        out
    }

    fn merge_usage(&mut self, usage: &Value) {
        if let Some(v) = usage.get("input_tokens").and_then(Value::as_u64) {
            self.usage.input_tokens = v;
        }
        if let Some(v) = usage.get("output_tokens").and_then(Value::as_u64) {
            self.usage.output_tokens = v;
        }
        if let Some(v) = usage.get("cache_creation_input_tokens").and_then(Value::as_u64) {
            self.usage.cache_creation_input_tokens = v;
        }
        if let Some(v) = usage.get("cache_read_input_tokens").and_then(Value::as_u64) {
            self.usage.cache_read_input_tokens = v;
        }
    }
}

fn parse_stop_reason(value: &str) -> Option<StopReason> {
    match value {
        "end_turn" => Some(StopReason::EndTurn),
        "max_tokens" => Some(StopReason::MaxTokens),
        "tool_use" => Some(StopReason::ToolUse),
        "stop_sequence" => Some(StopReason::StopSequence),
        _ => None,
    }
}
