//! Quota backoff policy and the interruptible wait behind it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::rate_limit::WINDOW;

/// Fixed, non-adaptive backoff applied when a strategy reports quota
/// exhaustion: wait one full window, then retry the same strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaBackoff {
    /// Delay before the retry.
    pub wait: Duration,
    /// Retries per strategy after a quota rejection.
    pub retries: u32,
}

impl Default for QuotaBackoff {
    fn default() -> Self {
        Self {
            wait: WINDOW,
            retries: 1,
        }
    }
}

impl QuotaBackoff {
    pub fn fixed(wait: Duration) -> Self {
        Self {
            wait,
            ..Self::default()
        }
    }

    /// Whether attempt number `attempt` (0-based) may be followed by a retry.
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.retries
    }
}

/// Marker returned when a wait was interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Sleeps for `duration` unless `token` is cancelled first.
pub async fn wait_or_cancel(duration: Duration, token: &CancellationToken) -> Result<(), Interrupted> {
    tokio::select! {
        biased;

        _ = token.cancelled() => Err(Interrupted),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
