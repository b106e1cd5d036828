//! Header-driven rate limiting and backoff for the LLM transport (spec §4.B).
//!
//! All mutable state lives behind one [`std::sync::Mutex`], matching §5's
//! "single mutex; `wait_if_needed` is serialized" — no `.await` is ever held
//! across a lock acquisition; the lock is taken only to read or update plain
//! data, and the actual sleep happens after it is released.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Per-million-token-family remaining/limit/reset state (spec "Rate-Limit
/// State" in §3).
#[derive(Debug, Default, Clone, Copy)]
struct Family {
    limit: Option<u64>,
    remaining: Option<u64>,
    reset: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    tokens: Family,
    input_tokens: Family,
    output_tokens: Family,
    requests: Family,
    retry_after: Option<u64>,
    last_error_seen: bool,
    pending_backoff: Option<Duration>,
}

/// Tracks Anthropic-style rate-limit headers and computes backoff.
pub struct RateLimiter {
    state: Mutex<State>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Construct with no observed limits yet.
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    /// Update tracked state from the four header families plus `retry-after`.
    ///
    /// `headers` yields lowercased header name/value pairs, as returned by
    /// any HTTP client; this crate does not depend on a particular one.
    pub fn update_from_headers<'a>(&self, headers: impl Iterator<Item = (&'a str, &'a str)>) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (name, value) in headers {
            match name {
                "anthropic-ratelimit-tokens-limit" => state.tokens.limit = value.parse().ok(),
                "anthropic-ratelimit-tokens-remaining" => state.tokens.remaining = value.parse().ok(),
                "anthropic-ratelimit-tokens-reset" => state.tokens.reset = parse_reset(value),
                "anthropic-ratelimit-input-tokens-limit" => state.input_tokens.limit = value.parse().ok(),
                "anthropic-ratelimit-input-tokens-remaining" => {
                    state.input_tokens.remaining = value.parse().ok();
                }
                "anthropic-ratelimit-input-tokens-reset" => state.input_tokens.reset = parse_reset(value),
                "anthropic-ratelimit-output-tokens-limit" => state.output_tokens.limit = value.parse().ok(),
                "anthropic-ratelimit-output-tokens-remaining" => {
                    state.output_tokens.remaining = value.parse().ok();
                }
                "anthropic-ratelimit-output-tokens-reset" => state.output_tokens.reset = parse_reset(value),
                "anthropic-ratelimit-requests-limit" => state.requests.limit = value.parse().ok(),
                "anthropic-ratelimit-requests-remaining" => state.requests.remaining = value.parse().ok(),
                "anthropic-ratelimit-requests-reset" => state.requests.reset = parse_reset(value),
                "retry-after" => state.retry_after = value.parse().ok(),
                _ => {}
            }
        }
    }

    /// Record a rate-limit error response, computing and storing the backoff
    /// to apply on the next `wait_if_needed`.
    ///
    /// Precedence: `retry-after` (if present and positive) > earliest known
    /// reset time (floored at 3 seconds) > a flat 60-second default.
    #[must_use]
    pub fn record_rate_limit_error(&self) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.last_error_seen = true;

        if let Some(retry_after) = state.retry_after.filter(|s| *s > 0) {
            let backoff = Duration::from_secs(retry_after);
            state.pending_backoff = Some(backoff);
            return backoff;
        }

        let now = Utc::now();
        let earliest_reset = [
            state.tokens.reset,
            state.input_tokens.reset,
            state.output_tokens.reset,
            state.requests.reset,
        ]
        .into_iter()
        .flatten()
        .min();

        let backoff = match earliest_reset {
            Some(reset) => {
                let secs = (reset - now).num_seconds().max(3);
                Duration::from_secs(u64::try_from(secs).unwrap_or(3))
            }
            None => Duration::from_secs(60),
        };
        state.pending_backoff = Some(backoff);
        backoff
    }

    /// Sleep as directed by any pending backoff or approaching-limit
    /// counter, then return. No-op if everything is healthy or unknown.
    pub async fn wait_if_needed(&self) {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.pending_backoff.take()
        };
        if let Some(backoff) = pending {
            tracing::warn!(?backoff, "rate limit backoff");
            tokio::time::sleep(backoff).await;
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.last_error_seen = false;
            return;
        }

        let wait = {
            let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = Utc::now();
            [
                (state.tokens, 1000u64),
                (state.input_tokens, 1000),
                (state.output_tokens, 1000),
                (state.requests, 5),
            ]
            .into_iter()
            .find_map(|(family, threshold)| approaching_wait(family, threshold, now))
        };
        if let Some(wait) = wait {
            tracing::info!(?wait, "approaching rate limit, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

fn approaching_wait(family: Family, threshold: u64, now: DateTime<Utc>) -> Option<Duration> {
    let remaining = family.remaining?;
    if remaining >= threshold {
        return None;
    }
    match family.reset {
        Some(reset) => {
            let secs = (reset - now).num_seconds().max(0);
            Some(Duration::from_secs(u64::try_from(secs).unwrap_or(0)))
        }
        None => Some(Duration::from_secs(60)),
    }
}

fn parse_reset(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_header_families() {
        let limiter = RateLimiter::new();
        limiter.update_from_headers(
            [
                ("anthropic-ratelimit-tokens-limit", "100000"),
                ("anthropic-ratelimit-tokens-remaining", "500"),
                ("anthropic-ratelimit-tokens-reset", "2026-07-28T12:00:00Z"),
                ("anthropic-ratelimit-requests-remaining", "2"),
                ("retry-after", "5"),
            ]
            .into_iter(),
        );
        let state = limiter.state.lock().unwrap();
        assert_eq!(state.tokens.limit, Some(100_000));
        assert_eq!(state.tokens.remaining, Some(500));
        assert_eq!(state.requests.remaining, Some(2));
        assert_eq!(state.retry_after, Some(5));
    }

    #[test]
    fn retry_after_takes_precedence() {
        let limiter = RateLimiter::new();
        limiter.update_from_headers([("retry-after", "7")].into_iter());
        let backoff = limiter.record_rate_limit_error();
        assert_eq!(backoff, Duration::from_secs(7));
    }

    #[test]
    fn falls_back_to_sixty_seconds_with_no_information() {
        let limiter = RateLimiter::new();
        let backoff = limiter.record_rate_limit_error();
        assert_eq!(backoff, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_consumes_pending_backoff_once() {
        let limiter = RateLimiter::new();
        limiter.update_from_headers([("retry-after", "2")].into_iter());
        limiter.record_rate_limit_error();

        let start = tokio::time::Instant::now();
        limiter.wait_if_needed().await;
        assert!(start.elapsed() >= Duration::from_secs(2));

        // Second call with nothing pending and no tracked limits is a no-op.
        let start2 = tokio::time::Instant::now();
        limiter.wait_if_needed().await;
        assert!(start2.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn approaching_request_limit_waits_for_reset() {
        let limiter = RateLimiter::new();
        let reset = (Utc::now() + chrono::Duration::seconds(3)).to_rfc3339();
        limiter.update_from_headers(
            [
                ("anthropic-ratelimit-requests-remaining", "1"),
                ("anthropic-ratelimit-requests-reset", reset.as_str()),
            ]
            .into_iter(),
        );
        let start = tokio::time::Instant::now();
        limiter.wait_if_needed().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
