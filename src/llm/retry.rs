//! Shared retry helpers for AI providers.
//!
//! Adapters retry transient HTTP failures with jittered exponential
//! backoff; the provider manager spaces its cross-adapter passes with a
//! linear delay.

use std::time::Duration;

use rand::Rng;

/// Returns `true` if the HTTP status code is transient and worth retrying.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Calculate exponential backoff delay with random jitter for in-adapter
/// HTTP retries.
///
/// Base delay is 1 second, doubled each attempt, with +/-25% jitter.
pub(crate) fn http_backoff_delay(attempt: u32) -> Duration {
    let base_ms: u64 = 1000u64.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = base_ms / 4;
    let jitter = if jitter_range > 0 {
        let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
        offset as i64 - jitter_range as i64
    } else {
        0
    };
    let delay_ms = (base_ms as i64 + jitter).max(100) as u64;
    Duration::from_millis(delay_ms)
}

/// Delay between failover passes, growing linearly with the pass index.
pub(crate) fn pass_delay(pass: u32) -> Duration {
    Duration::from_millis(500u64.saturating_mul(u64::from(pass) + 1))
}
