//! Strategy trait and request/outcome types.
//!
//! A strategy is one way of obtaining raw posts for a handle. The
//! orchestrator only sees the four-way [`StrategyOutcome`] plus the
//! strategy's own [`Strategy::normalize`] step; how raw items are obtained
//! is private to each implementation.
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | [`StrategyOutcome::Ok`] | Call succeeded with raw items |
//! | [`StrategyOutcome::Empty`] | Call succeeded but yielded nothing usable |
//! | [`StrategyOutcome::QuotaExhausted`] | Upstream answered with a 429 equivalent |
//! | [`StrategyOutcome::Unavailable`] | Endpoint or network failure |
//!
//! # Example Implementation
//!
//! ```rust,ignore
//! use chirpfetch_core::{FetchRequest, NormalizedItem, RawBatch, Strategy, StrategyDescriptor, StrategyOutcome};
//!
//! struct Archive { descriptor: StrategyDescriptor }
//!
//! impl Strategy for Archive {
//!     fn descriptor(&self) -> &StrategyDescriptor { &self.descriptor }
//!
//!     fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a> {
//!         Box::pin(async move { StrategyOutcome::Empty })
//!     }
//!
//!     fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem> { Vec::new() }
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::{Handle, NormalizedItem, UtcDateTime, ValidationError};

/// Identifiers of the built-in strategies. The same string is reported as
/// `source` when the strategy wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    BearerApi,
    SyndicationApi,
    GuestToken,
    NitterScraping,
    OfflineGenerator,
}

impl StrategyId {
    pub const ALL: [Self; 5] = [
        Self::BearerApi,
        Self::SyndicationApi,
        Self::GuestToken,
        Self::NitterScraping,
        Self::OfflineGenerator,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BearerApi => "bearer_api",
            Self::SyndicationApi => "syndication_api",
            Self::GuestToken => "guest_token",
            Self::NitterScraping => "nitter_scraping",
            Self::OfflineGenerator => "offline_generator",
        }
    }

    /// Default trial position; lower runs first.
    pub const fn default_priority(self) -> u16 {
        match self {
            Self::BearerApi => 10,
            Self::SyndicationApi => 20,
            Self::GuestToken => 30,
            Self::NitterScraping => 40,
            Self::OfflineGenerator => 90,
        }
    }
}

impl Display for StrategyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bearer_api" => Ok(Self::BearerApi),
            "syndication_api" => Ok(Self::SyndicationApi),
            "guest_token" => Ok(Self::GuestToken),
            "nitter_scraping" => Ok(Self::NitterScraping),
            "offline_generator" => Ok(Self::OfflineGenerator),
            other => Err(ValidationError::InvalidStrategy {
                value: other.to_owned(),
            }),
        }
    }
}

/// Static configuration of one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDescriptor {
    pub name: String,
    pub priority: u16,
    pub timeout: Duration,
    /// Retries granted after a quota rejection. Always 1.
    pub max_quota_retries: u32,
    /// Whether an attempt performs a network round trip and therefore
    /// charges the shared rate budget.
    pub network: bool,
}

impl StrategyDescriptor {
    pub fn network(name: impl Into<String>, priority: u16, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            priority,
            timeout,
            max_quota_retries: 1,
            network: true,
        }
    }

    pub fn offline(name: impl Into<String>, priority: u16, timeout: Duration) -> Self {
        Self {
            network: false,
            ..Self::network(name, priority, timeout)
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Upper bound on the item count any single strategy attempt is asked for.
/// Larger requests are clamped; the orchestrator still truncates to the
/// caller's own `max_count`.
pub const MAX_FETCH_COUNT: usize = 200;

/// Input handed to [`Strategy::try_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub handle: Handle,
    pub max_count: usize,
    /// Point in time after which the attempt is abandoned.
    pub deadline: Instant,
}

impl FetchRequest {
    /// `max_count` is clamped to [`MAX_FETCH_COUNT`].
    pub fn new(handle: Handle, max_count: usize, deadline: Instant) -> Result<Self, ValidationError> {
        if max_count == 0 {
            return Err(ValidationError::ZeroMaxCount);
        }
        Ok(Self {
            handle,
            max_count: max_count.min(MAX_FETCH_COUNT),
            deadline,
        })
    }

    /// Time left before the deadline, at least one millisecond.
    pub fn remaining(&self) -> Duration {
        self.deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_millis(1))
    }

    /// Caps a per-call HTTP timeout so it never outlives the deadline.
    pub fn http_timeout_ms(&self, preferred: Duration) -> u64 {
        let capped = preferred.min(self.remaining());
        capped.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

/// Raw endpoint objects in source order, plus the context `normalize`
/// needs to stay a pure function of its input.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    pub handle: Handle,
    /// Captured once per fetch; used when a source lacks its own timestamp.
    pub fetched_at: UtcDateTime,
    pub items: Vec<Value>,
}

impl RawBatch {
    pub fn new(handle: Handle, fetched_at: UtcDateTime, items: Vec<Value>) -> Self {
        Self {
            handle,
            fetched_at,
            items,
        }
    }
}

/// Four-way result of one strategy attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Ok(RawBatch),
    Empty,
    QuotaExhausted,
    Unavailable(String),
}

impl StrategyOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Wraps raw items, turning an empty list into [`StrategyOutcome::Empty`].
    pub fn from_items(handle: Handle, fetched_at: UtcDateTime, items: Vec<Value>) -> Self {
        if items.is_empty() {
            Self::Empty
        } else {
            Self::Ok(RawBatch::new(handle, fetched_at, items))
        }
    }
}

pub type StrategyFuture<'a> = Pin<Box<dyn Future<Output = StrategyOutcome> + Send + 'a>>;

/// Acquisition strategy contract.
///
/// Implementations must be `Send + Sync`; the orchestrator holds them as
/// `Arc<dyn Strategy>` and runs each attempt on the tokio runtime.
pub trait Strategy: Send + Sync {
    /// Static name, priority and timeout budget.
    fn descriptor(&self) -> &StrategyDescriptor;

    /// Attempts one fetch. Failures are reported through the outcome,
    /// never by panicking. A strategy backed by several hosts must try all
    /// of them before reporting [`StrategyOutcome::Unavailable`].
    fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a>;

    /// Converts raw items into validated items in source order, dropping
    /// invalid candidates. Must be pure: equal input, equal output.
    fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

/// Applies `convert` to each raw item, keeping the ones that validate.
pub fn normalize_each<F>(raw: &RawBatch, mut convert: F) -> Vec<NormalizedItem>
where
    F: FnMut(&Value) -> Result<NormalizedItem, ValidationError>,
{
    raw.items
        .iter()
        .filter_map(|value| match convert(value) {
            Ok(item) => Some(item),
            Err(error) => {
                tracing::trace!(%error, "discarding raw item");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_ids_round_trip_through_strings() {
        for id in StrategyId::ALL {
            assert_eq!(id.as_str().parse::<StrategyId>(), Ok(id));
        }
        assert!(matches!(
            "carrier_pigeon".parse::<StrategyId>(),
            Err(ValidationError::InvalidStrategy { .. })
        ));
    }

    #[test]
    fn default_priorities_put_offline_generator_last() {
        let mut ids = StrategyId::ALL.to_vec();
        ids.sort_by_key(|id| id.default_priority());
        assert_eq!(ids.last(), Some(&StrategyId::OfflineGenerator));
        assert_eq!(ids.first(), Some(&StrategyId::BearerApi));
    }

    #[test]
    fn fetch_request_rejects_zero_max_count() {
        let handle = Handle::parse("example").expect("valid handle");
        let err = FetchRequest::new(handle, 0, Instant::now()).expect_err("zero must fail");
        assert_eq!(err, ValidationError::ZeroMaxCount);
    }

    #[test]
    fn fetch_request_clamps_oversized_max_count() {
        let handle = Handle::parse("example").expect("valid handle");
        let request = FetchRequest::new(handle, usize::MAX, Instant::now()).expect("valid request");
        assert_eq!(request.max_count, MAX_FETCH_COUNT);
    }

    #[test]
    fn empty_item_list_becomes_empty_outcome() {
        let handle = Handle::parse("example").expect("valid handle");
        let outcome = StrategyOutcome::from_items(handle, UtcDateTime::now(), Vec::new());
        assert_eq!(outcome, StrategyOutcome::Empty);
    }

    #[test]
    fn offline_descriptor_does_not_touch_network() {
        let descriptor = StrategyDescriptor::offline("gen", 90, Duration::from_secs(5));
        assert!(!descriptor.network);
        assert_eq!(descriptor.max_quota_retries, 1);
    }
}
