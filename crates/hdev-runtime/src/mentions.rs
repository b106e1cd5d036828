//! `@file` inlining (spec §4.I "@file inlining").
//!
//! Immediately before each `SendingToLLM`, the most recent user turn is
//! scanned for `@<path>` tokens. Valid, readable, sandbox-contained paths
//! become `mentioned_file` blocks holding the file's current contents.
//! Only the most recent mention of a given path keeps its full contents —
//! earlier copies, anywhere in history, collapse to a short reference so
//! the payload doesn't grow unbounded as the same file gets mentioned
//! again and again.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use hdev_llm::{ContentBlock, Turn};
use hdev_sandbox::Sandbox;

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@([A-Za-z0-9_./\-]+)").expect("valid regex"))
}

/// Expand `@<path>` tokens in the last turn of `history` into
/// `mentioned_file` blocks, and collapse any earlier full inlining of the
/// same path down to a short reference.
///
/// Only `Text` blocks are scanned; a turn with no text content is left
/// untouched. Paths that don't resolve to a readable, sandbox-contained
/// file are left as literal `@path` text — the LLM sees exactly what the
/// operator typed.
pub async fn inline_mentions(history: &mut [Turn], sandbox: &Sandbox) {
    let Some(last) = history.last() else { return };
    let paths_in_last_turn: Vec<String> =
        last.content.iter().filter_map(ContentBlock::as_text).flat_map(extract_paths).collect();
    if paths_in_last_turn.is_empty() {
        return;
    }

    // Collapse any older full inlining of a path that's about to be
    // re-inlined, so only the most recent mention carries full contents.
    let mentioned_again: HashSet<&str> = paths_in_last_turn.iter().map(String::as_str).collect();
    let last_index = history.len() - 1;
    for turn in &mut history[..last_index] {
        for block in &mut turn.content {
            if let ContentBlock::MentionedFile { path, .. } = block {
                if mentioned_again.contains(path.as_str()) {
                    let reference = format!("[Previously referenced file: {path}]");
                    *block = ContentBlock::text(reference);
                }
            }
        }
    }

    let Some(last) = history.last_mut() else { return };
    let mut expanded = Vec::with_capacity(last.content.len());
    for block in std::mem::take(&mut last.content) {
        match block {
            ContentBlock::Text { text } => expanded.extend(expand_text_block(&text, sandbox).await),
            other => expanded.push(other),
        }
    }
    last.content = expanded;
}

fn extract_paths(text: &str) -> Vec<String> {
    mention_pattern().captures_iter(text).map(|c| c[1].to_string()).collect()
}

async fn expand_text_block(text: &str, sandbox: &Sandbox) -> Vec<ContentBlock> {
    let pattern = mention_pattern();
    let mut blocks = Vec::new();
    let mut last_end = 0;
    for m in pattern.find_iter(text) {
        if m.start() > last_end {
            blocks.push(ContentBlock::text(text[last_end..m.start()].to_string()));
        }
        let path = &m.as_str()[1..];
        match read_mentioned(sandbox, path).await {
            Some(contents) => blocks.push(ContentBlock::MentionedFile { path: path.to_string(), contents }),
            None => blocks.push(ContentBlock::text(m.as_str().to_string())),
        }
        last_end = m.end();
    }
    if last_end < text.len() {
        blocks.push(ContentBlock::text(text[last_end..].to_string()));
    }
    if blocks.is_empty() {
        blocks.push(ContentBlock::text(text.to_string()));
    }
    blocks
}

async fn read_mentioned(sandbox: &Sandbox, path: &str) -> Option<String> {
    sandbox.read_file(path).await.ok()
}
