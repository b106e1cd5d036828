//! Conversation compaction (spec §4.H): decide when a session's full API
//! payload is approaching a model's context window, summarize it, and fork
//! a replacement session — grounded in `heare/developer/compacter.py`'s
//! `ConversationCompacter`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

use serde::{Deserialize, Serialize};

use hdev_core::SessionId;
use hdev_llm::{ChatRequest, ContentBlock, LlmClient, LlmError, Role, ToolSchema, Turn};

/// Trigger compaction once the counted context exceeds this fraction of the
/// model's context window (spec §4.H: "default 0.85").
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.85;

/// Characters-per-token fallback used when the provider's token-counting
/// endpoint is unavailable (spec §4.H: "fall back to total-characters / 3.5").
const CHARS_PER_TOKEN_FALLBACK: f64 = 3.5;

/// Decides, on every `Compose` transition, whether the session's full
/// payload is too large and — if so — produces a summary and a forked
/// session.
pub struct Compacter {
    threshold_ratio: f64,
}

impl Default for Compacter {
    fn default() -> Self {
        Self { threshold_ratio: DEFAULT_THRESHOLD_RATIO }
    }
}

impl Compacter {
    /// A compacter using a non-default threshold ratio.
    #[must_use]
    pub fn with_threshold_ratio(threshold_ratio: f64) -> Self {
        Self { threshold_ratio }
    }

    /// Count tokens for the exact payload that would be sent to the LLM,
    /// preferring the provider's own counting endpoint and falling back to
    /// `total_chars / 3.5` on any transport error (spec §4.H).
    pub async fn count_full_context(&self, llm: &dyn LlmClient, request: &ChatRequest) -> u64 {
        match llm.count_tokens(request).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(%err, "token count failed, falling back to char estimate");
                estimate_tokens(request)
            }
        }
    }

    /// `should_compact` = counted tokens > context_window * threshold_ratio
    /// (spec §4.H).
    #[must_use]
    pub fn should_compact(&self, counted_tokens: u64, context_window: u64) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let threshold = (context_window as f64) * self.threshold_ratio;
        (counted_tokens as f64) > threshold
    }

    /// Summarize `history` via one LLM call, replacing file-mention blocks
    /// with path references first so their bytes are never resent
    /// (spec §4.H "Summary generation").
    pub async fn generate_summary(
        &self,
        llm: &dyn LlmClient,
        history: &[Turn],
        model: &str,
        max_summary_tokens: u64,
    ) -> Result<CompactionSummary, LlmError> {
        let original_message_count = history.len();
        let conversation = messages_to_string(history, true);

        let request = ChatRequest {
            model: model.to_string(),
            max_tokens: max_summary_tokens,
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            tools: Vec::new(),
            messages: vec![Turn::user_text(conversation)],
            stream: true,
        };

        let mut stream = llm.stream_turn(request).await?;
        let response = drain_to_completion(&mut stream).await?;
        let summary = response.content.iter().filter_map(ContentBlock::as_text).collect::<Vec<_>>().join("");

        Ok(CompactionSummary {
            original_message_count,
            summary_token_count: response.usage.output_tokens,
            summary,
        })
    }

    /// Run the full decide-and-fork cycle: if the session doesn't need
    /// compacting, returns `None`. Otherwise summarizes `history` and
    /// returns the transition the Agent Loop should apply.
    pub async fn compact(
        &self,
        llm: &dyn LlmClient,
        original_session_id: SessionId,
        history: &[Turn],
        system_prompt: &str,
        tools: &[ToolSchema],
        model: &str,
        context_window: u64,
        max_summary_tokens: u64,
    ) -> Result<Option<CompactionTransition>, LlmError> {
        let request = ChatRequest {
            model: model.to_string(),
            max_tokens: 1,
            system: system_prompt.to_string(),
            tools: tools.to_vec(),
            messages: history.to_vec(),
            stream: false,
        };
        let counted = self.count_full_context(llm, &request).await;
        if !self.should_compact(counted, context_window) {
            return Ok(None);
        }

        let summary = self.generate_summary(llm, history, model, max_summary_tokens).await?;

        let mut compacted_messages = vec![Turn {
            role: Role::System,
            content: vec![ContentBlock::text(format!(
                "### Conversation Summary (Compacted from {} previous messages)\n\n{}\n\nContinue the conversation from this point.",
                summary.original_message_count, summary.summary
            ))],
        }];
        if history.len() >= 2 {
            compacted_messages.extend_from_slice(&history[history.len() - 2..]);
        }

        Ok(Some(CompactionTransition {
            original_session_id,
            new_session_id: SessionId::new(),
            compacted_messages,
            summary,
        }))
    }
}

const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the following conversation for continuity.\n\
Include:\n\
1. Key points and decisions\n\
2. Current state of development/discussion\n\
3. Any outstanding questions or tasks\n\
4. The most recent context that future messages will reference\n\n\
Note: file references like [Referenced file: path] indicate files that were mentioned in the conversation.\n\
Acknowledge these references where relevant but don't spend time describing file contents.\n\n\
Be comprehensive yet concise. The summary will be used to start a new conversation that continues where this one left off.";

async fn drain_to_completion(
    stream: &mut hdev_llm::EventStream,
) -> Result<hdev_llm::LlmResponse, LlmError> {
    use futures::StreamExt;
    while let Some(event) = stream.next().await {
        match event? {
            hdev_llm::StreamEvent::MessageComplete(response) => return Ok(response),
            hdev_llm::StreamEvent::Error(message) => return Err(LlmError::Stream(message)),
            _ => {}
        }
    }
    Err(LlmError::Stream("stream ended without a completed message".to_string()))
}

/// Result of [`Compacter::generate_summary`] (spec §4.H).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionSummary {
    /// Number of turns in the conversation that was summarized.
    pub original_message_count: usize,
    /// Token count of the generated summary itself.
    pub summary_token_count: u64,
    /// The summary text.
    pub summary: String,
}

/// The outcome of [`Compacter::compact`], handed back to the Agent Loop so
/// it can replace its live session (spec §4.H "Session fork").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionTransition {
    /// The session being superseded.
    pub original_session_id: SessionId,
    /// The freshly minted session id.
    pub new_session_id: SessionId,
    /// The new session's starting history: one system summary turn,
    /// optionally followed by the last exchange verbatim.
    pub compacted_messages: Vec<Turn>,
    /// The summary that was generated.
    pub summary: CompactionSummary,
}

fn estimate_tokens(request: &ChatRequest) -> u64 {
    let mut total_chars = request.system.len();
    total_chars += serde_json::to_string(&request.tools).map(|s| s.len()).unwrap_or(0);
    total_chars += messages_to_string(&request.messages, false).len();
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let tokens = (total_chars as f64 / CHARS_PER_TOKEN_FALLBACK) as u64;
    tokens
}

/// Render `turns` as a flat transcript for summarization or char-estimation.
/// When `for_summary` is set, `mentioned_file` blocks become
/// `[Referenced file: <path>]` placeholders (spec §4.H).
fn messages_to_string(turns: &[Turn], for_summary: bool) -> String {
    let mut out = String::new();
    for turn in turns {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        let mut parts = Vec::new();
        for block in &turn.content {
            match block {
                ContentBlock::Text { text } => parts.push(text.clone()),
                ContentBlock::ToolUse { name, input, .. } => {
                    parts.push(format!("[Tool Use: {name}]\n{}", serde_json::to_string(input).unwrap_or_default()));
                }
                ContentBlock::ToolResult { content, .. } => parts.push(format!("[Tool Result]\n{content}")),
                ContentBlock::MentionedFile { path, contents } => {
                    if for_summary {
                        parts.push(format!("[Referenced file: {path}]"));
                    } else {
                        parts.push(contents.clone());
                    }
                }
            }
        }
        out.push_str(&format!("{role}: {}\n\n", parts.join("\n")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use hdev_llm::{StopReason, Usage};

    struct ScriptedClient {
        count: u64,
        response: hdev_llm::LlmResponse,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn stream_turn(&self, _request: ChatRequest) -> Result<hdev_llm::EventStream, LlmError> {
            let response = self.response.clone();
            Ok(Box::pin(stream::once(async move { Ok(hdev_llm::StreamEvent::MessageComplete(response)) })))
        }

        async fn count_tokens(&self, _request: &ChatRequest) -> Result<u64, LlmError> {
            Ok(self.count)
        }
    }

    fn turn(role: Role, text: &str) -> Turn {
        Turn { role, content: vec![ContentBlock::text(text)] }
    }

    #[test]
    fn should_compact_above_threshold_ratio() {
        let compacter = Compacter::default();
        assert!(compacter.should_compact(90_000, 100_000));
        assert!(!compacter.should_compact(80_000, 100_000));
    }

    #[test]
    fn mentioned_file_blocks_become_references_for_summary() {
        let turns = vec![Turn {
            role: Role::User,
            content: vec![ContentBlock::MentionedFile { path: "src/lib.rs".to_string(), contents: "fn main() {}".to_string() }],
        }];
        let rendered = messages_to_string(&turns, true);
        assert!(rendered.contains("[Referenced file: src/lib.rs]"));
        assert!(!rendered.contains("fn main"));
    }

    #[tokio::test]
    async fn compact_returns_none_under_threshold() {
        let client = ScriptedClient {
            count: 10,
            response: hdev_llm::LlmResponse { content: vec![], stop_reason: StopReason::EndTurn, usage: Usage::default() },
        };
        let compacter = Compacter::default();
        let history = vec![turn(Role::User, "hi")];
        let transition = compacter
            .compact(&client, SessionId::new(), &history, "system", &[], "claude", 100_000, 4000)
            .await
            .unwrap();
        assert!(transition.is_none());
    }

    #[tokio::test]
    async fn compact_forks_session_when_over_threshold() {
        let response = hdev_llm::LlmResponse {
            content: vec![ContentBlock::text("summary text")],
            stop_reason: StopReason::EndTurn,
            usage: Usage { output_tokens: 12, ..Default::default() },
        };
        let client = ScriptedClient { count: 95_000, response };
        let compacter = Compacter::default();
        let original = SessionId::new();
        let history = vec![turn(Role::User, "question"), turn(Role::Assistant, "answer")];

        let transition = compacter
            .compact(&client, original, &history, "system", &[], "claude", 100_000, 4000)
            .await
            .unwrap()
            .expect("should compact");

        assert_eq!(transition.original_session_id, original);
        assert_ne!(transition.new_session_id, original);
        assert_eq!(transition.summary.summary, "summary text");
        assert_eq!(transition.compacted_messages.len(), 1 + 2);
        assert!(transition.compacted_messages[0].text_only().contains("Compacted from 2 previous messages"));
    }
}
