//! Dynamic system prompt assembly (spec §6 "System prompt").
//!
//! Grounded in `heare/developer/prompt.py`: the sandbox root's file tree,
//! depth-limited under a token budget, followed by a short capability
//! statement. When the tree would overflow the budget, deeper entries are
//! replaced by a summary placeholder rather than silently truncated mid-list.

use hdev_sandbox::Sandbox;

/// Characters-per-token ratio used to convert `max_tree_tokens` into a
/// character budget, matching the compacter's fallback estimator
/// (spec §4.H) so the two budgets agree on what "a token" costs.
const CHARS_PER_TOKEN: f64 = 3.5;

const CAPABILITY_STATEMENT: &str = "You are an interactive coding assistant with access to tools for \
reading, writing, and editing files; running shell commands; and reading or \
writing persistent memory. File paths in tool calls are relative to the \
sandbox root shown above. Mention a file with @path to inline its current \
contents into the conversation.";

/// Build the system prompt for one LLM call: the sandbox's file tree
/// (budget-limited) followed by the capability statement.
///
/// `max_tree_tokens` bounds how much of the prompt the file tree may
/// consume; once the listing would exceed that budget, the remaining
/// entries are collapsed into a single sentinel line rather than included
/// piecemeal (spec §6: "if it overflows, files are replaced by summary
/// placeholders").
#[must_use]
pub fn assemble_system_prompt(sandbox: &Sandbox, max_tree_tokens: u64) -> String {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let char_budget = (max_tree_tokens as f64 * CHARS_PER_TOKEN) as usize;

    let entries = sandbox.directory_listing(".", true, 10_000).unwrap_or_default();
    let tree = render_tree(&entries, char_budget);

    format!(
        "Sandbox root: {}\n\nFile tree:\n{}\n\n{}",
        sandbox.root().display(),
        tree,
        CAPABILITY_STATEMENT
    )
}

fn render_tree(entries: &[String], char_budget: usize) -> String {
    let mut out = String::new();
    let mut included = 0;
    for entry in entries {
        let line_len = entry.len() + 1;
        if out.len() + line_len > char_budget {
            break;
        }
        out.push_str(entry);
        out.push('\n');
        included += 1;
    }
    if included < entries.len() {
        out.push_str(&format!("... ({} more entries omitted)\n", entries.len() - included));
    }
    if out.is_empty() {
        out.push_str("(empty)\n");
    }
    out
}
