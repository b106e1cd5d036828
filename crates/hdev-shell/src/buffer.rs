//! Bounded, timestamped line buffer for one stdout/stderr stream.

use chrono::{DateTime, Utc};

/// Total bytes kept per stream before the oldest lines are dropped. The
/// original capped only the *status-message preview*; here the whole
/// capture is bounded so a runaway chatty command can't grow memory
/// without limit (spec §4.F: "bounded in-memory buffers").
const MAX_BUFFER_BYTES: usize = 1_000_000;

struct TimestampedLine {
    #[allow(dead_code)]
    at: DateTime<Utc>,
    text: String,
}

/// Accumulates lines from one process stream, timestamped, capped in total
/// size.
#[derive(Default)]
pub struct StreamBuffer {
    lines: Vec<TimestampedLine>,
    total_bytes: usize,
}

impl StreamBuffer {
    /// Append one line (without its trailing newline).
    pub fn push_line(&mut self, text: String) {
        self.total_bytes += text.len();
        self.lines.push(TimestampedLine { at: Utc::now(), text });
        while self.total_bytes > MAX_BUFFER_BYTES && self.lines.len() > 1 {
            let dropped = self.lines.remove(0);
            self.total_bytes = self.total_bytes.saturating_sub(dropped.text.len());
        }
    }

    /// Full captured text, newline-joined.
    #[must_use]
    pub fn full_text(&self) -> String {
        self.lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n")
    }

    /// The last `n` bytes of the captured text (for the timeout status
    /// message's "most recent ~500 bytes of each stream").
    #[must_use]
    pub fn tail(&self, n: usize) -> String {
        let full = self.full_text();
        if full.len() <= n {
            full
        } else {
            full[full.len() - n..].to_string()
        }
    }

    /// Whether anything has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
