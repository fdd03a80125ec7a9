use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Enforces a minimum spacing between consecutive upstream calls made by
/// one strategy (the lookup call and the timeline call, for instance).
///
/// This is process-local pacing only; the shared request budget lives in
/// [`crate::rate_limit::RateLimiter`].
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Option<Arc<DirectRateLimiter>>,
    spacing: Duration,
}

impl RequestPacer {
    /// One call per `spacing`, no burst. A zero spacing disables pacing.
    pub fn new(spacing: Duration) -> Self {
        let limiter = Quota::with_period(spacing)
            .map(|quota| quota.allow_burst(NonZeroU32::MIN))
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        Self { limiter, spacing }
    }

    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Waits until the next call is allowed.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("spacing", &self.spacing)
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}
