//! Per-adapter request interval enforcement.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ProviderError;

/// Gate that rejects requests arriving before the backend's minimum
/// request interval has elapsed.
///
/// The rejection is immediate rather than a queued wait: the provider
/// manager treats `RateLimited` as a signal to advance to the next
/// adapter in its preference order.
#[derive(Debug)]
pub struct RequestGate {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Claim a request slot, recording the attempt time on success.
    pub fn try_acquire(&self, provider: &str) -> Result<(), ProviderError> {
        let mut last = self.last_request.lock().expect("request gate poisoned");
        let now = Instant::now();

        if let Some(prev) = *last {
            let elapsed = now.duration_since(prev);
            if elapsed < self.min_interval {
                return Err(ProviderError::RateLimited {
                    provider: provider.to_string(),
                    retry_in: self.min_interval - elapsed,
                });
            }
        }

        *last = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_passes() {
        let gate = RequestGate::new(Duration::from_millis(100));
        assert!(gate.try_acquire("test").is_ok());
    }

    #[test]
    fn immediate_second_request_is_rate_limited() {
        let gate = RequestGate::new(Duration::from_secs(60));
        gate.try_acquire("test").unwrap();

        let err = gate.try_acquire("test").unwrap_err();
        match err {
            ProviderError::RateLimited { provider, retry_in } => {
                assert_eq!(provider, "test");
                assert!(retry_in <= Duration::from_secs(60));
                assert!(retry_in > Duration::from_secs(59));
            }
            other => panic!("expected RateLimited, got: {other:?}"),
        }
    }

    #[test]
    fn request_passes_after_interval() {
        let gate = RequestGate::new(Duration::from_millis(10));
        gate.try_acquire("test").unwrap();
        std::thread::sleep(Duration::from_millis(15));
        assert!(gate.try_acquire("test").is_ok());
    }

    #[test]
    fn zero_interval_never_limits() {
        let gate = RequestGate::new(Duration::ZERO);
        for _ in 0..10 {
            assert!(gate.try_acquire("test").is_ok());
        }
    }
}
