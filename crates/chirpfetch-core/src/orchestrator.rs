//! Acquisition orchestrator: admission, sequential strategy trials, quota
//! backoff and failure aggregation.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::{wait_or_cancel, QuotaBackoff};
use crate::cache::{CacheMode, ResponseCache};
use crate::config::AcquisitionConfig;
use crate::http_client::HttpClient;
use crate::rate_limit::{JsonFileStore, RateLimiter, DEFAULT_BUDGET_CEILING, DEFAULT_STATE_FILE};
use crate::strategy::{FetchRequest, Strategy, StrategyOutcome};
use crate::{ConfigError, Handle, NormalizedItem};

const PREVIEW_ITEMS: usize = 3;
const PREVIEW_CHARS: usize = 50;

/// Machine-readable failure taxonomy. The serialized form is the variant
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AcquisitionErrorKind {
    RateLimited,
    QuotaExhaustedTransient,
    StrategyUnavailable,
    AllStrategiesExhausted,
    InvalidInput,
    Cancelled,
    InternalError,
}

impl AcquisitionErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "RateLimited",
            Self::QuotaExhaustedTransient => "QuotaExhaustedTransient",
            Self::StrategyUnavailable => "StrategyUnavailable",
            Self::AllStrategiesExhausted => "AllStrategiesExhausted",
            Self::InvalidInput => "InvalidInput",
            Self::Cancelled => "Cancelled",
            Self::InternalError => "InternalError",
        }
    }
}

impl Display for AcquisitionErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one strategy did not win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub kind: AcquisitionErrorKind,
    pub reason: String,
}

impl StrategyFailure {
    fn new(strategy: &str, kind: AcquisitionErrorKind, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.to_owned(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Outcome of one `acquire` call. `error` is present iff `success` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionResult {
    pub success: bool,
    pub items: Vec<NormalizedItem>,
    /// Winning strategy name.
    pub source: Option<String>,
    pub error: Option<AcquisitionErrorKind>,
    pub detail: Option<String>,
    pub handle: String,
    pub failures: Vec<StrategyFailure>,
    /// Only for [`AcquisitionErrorKind::RateLimited`].
    pub retry_after: Option<Duration>,
    /// Items were served from the response cache.
    pub cached: bool,
}

impl AcquisitionResult {
    fn succeeded(handle: &Handle, source: &str, items: Vec<NormalizedItem>, failures: Vec<StrategyFailure>) -> Self {
        Self {
            success: true,
            items,
            source: Some(source.to_owned()),
            error: None,
            detail: None,
            handle: handle.as_str().to_owned(),
            failures,
            retry_after: None,
            cached: false,
        }
    }

    fn failed(
        handle: impl Into<String>,
        kind: AcquisitionErrorKind,
        detail: impl Into<String>,
        failures: Vec<StrategyFailure>,
    ) -> Self {
        Self {
            success: false,
            items: Vec::new(),
            source: None,
            error: Some(kind),
            detail: Some(detail.into()),
            handle: handle.into(),
            failures,
            retry_after: None,
            cached: false,
        }
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }
}

/// Best-effort display form of input that failed handle validation.
fn display_handle(input: &str) -> String {
    let trimmed = input.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed).to_lowercase()
}

enum Trial {
    Finished(StrategyOutcome),
    TimedOut,
    Crashed(String),
    Cancelled,
}

enum StrategyRun {
    Won(Vec<NormalizedItem>),
    Failed(StrategyFailure),
    Cancelled,
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return format!("strategy task ended abnormally: {error}");
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("strategy panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("strategy panicked: {message}")
    } else {
        String::from("strategy panicked")
    }
}

/// Walks a priority-ordered strategy chain under a shared rate budget.
pub struct AcquisitionOrchestrator {
    strategies: Vec<Arc<dyn Strategy>>,
    limiter: RateLimiter,
    backoff: QuotaBackoff,
    cache: Option<ResponseCache>,
}

impl AcquisitionOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Strategies in trial order.
    pub fn strategies(&self) -> &[Arc<dyn Strategy>] {
        &self.strategies
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub async fn acquire(&self, handle: &str, max_count: usize) -> AcquisitionResult {
        self.acquire_with_cancel(handle, max_count, &CancellationToken::new())
            .await
    }

    /// Like [`Self::acquire`], aborting promptly with
    /// [`AcquisitionErrorKind::Cancelled`] once `token` fires, including
    /// mid-call and mid-backoff.
    pub async fn acquire_with_cancel(
        &self,
        handle: &str,
        max_count: usize,
        token: &CancellationToken,
    ) -> AcquisitionResult {
        self.acquire_with(handle, max_count, CacheMode::Use, token)
            .await
    }

    /// Full form of [`Self::acquire`]. With a cache configured and `mode`
    /// allowing reads, a fresh entry covering `max_count` is returned
    /// without touching the rate budget. Wins from network strategies are
    /// stored unless `mode` is [`CacheMode::Bypass`]; generated content is
    /// never cached.
    pub async fn acquire_with(
        &self,
        handle: &str,
        max_count: usize,
        mode: CacheMode,
        token: &CancellationToken,
    ) -> AcquisitionResult {
        let handle = match Handle::parse(handle) {
            Ok(handle) => handle,
            Err(error) => {
                return AcquisitionResult::failed(
                    display_handle(handle),
                    AcquisitionErrorKind::InvalidInput,
                    error.to_string(),
                    Vec::new(),
                );
            }
        };
        if max_count == 0 {
            return AcquisitionResult::failed(
                handle.as_str(),
                AcquisitionErrorKind::InvalidInput,
                crate::ValidationError::ZeroMaxCount.to_string(),
                Vec::new(),
            );
        }
        if token.is_cancelled() {
            return AcquisitionResult::failed(
                handle.as_str(),
                AcquisitionErrorKind::Cancelled,
                "acquisition cancelled before start",
                Vec::new(),
            );
        }

        if let Some(hit) = self.cached(&handle, max_count, mode) {
            return hit;
        }

        let admission = self.limiter.admit();
        if !admission.allowed {
            tracing::warn!(
                handle = %handle,
                used = admission.used,
                retry_after_secs = admission.retry_after.as_secs(),
                "rate budget exhausted; no strategy invoked"
            );
            let mut result = AcquisitionResult::failed(
                handle.as_str(),
                AcquisitionErrorKind::RateLimited,
                format!(
                    "rate budget of {} requests per window exhausted; retry after {} seconds",
                    self.limiter.budget_ceiling(),
                    admission.retry_after.as_secs()
                ),
                Vec::new(),
            );
            result.retry_after = Some(admission.retry_after);
            return result;
        }

        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match self.run_strategy(strategy, &handle, max_count, token).await {
                StrategyRun::Won(mut items) => {
                    items.truncate(max_count);
                    let preview: Vec<String> = items
                        .iter()
                        .take(PREVIEW_ITEMS)
                        .map(|item| item.text().chars().take(PREVIEW_CHARS).collect())
                        .collect();
                    tracing::info!(
                        handle = %handle,
                        source = strategy.name(),
                        count = items.len(),
                        ?preview,
                        "acquisition succeeded"
                    );
                    if let Some(cache) = &self.cache {
                        if mode.writes() && strategy.descriptor().network {
                            cache.put(&handle, strategy.name(), max_count, &items);
                        }
                    }
                    return AcquisitionResult::succeeded(&handle, strategy.name(), items, failures);
                }
                StrategyRun::Failed(failure) => {
                    tracing::debug!(
                        strategy = %failure.strategy,
                        kind = %failure.kind,
                        reason = %failure.reason,
                        "strategy did not produce items"
                    );
                    failures.push(failure);
                }
                StrategyRun::Cancelled => {
                    return AcquisitionResult::failed(
                        handle.as_str(),
                        AcquisitionErrorKind::Cancelled,
                        format!("acquisition cancelled during '{}'", strategy.name()),
                        failures,
                    );
                }
            }
        }

        tracing::warn!(handle = %handle, attempted = failures.len(), "every strategy failed");
        AcquisitionResult::failed(
            handle.as_str(),
            AcquisitionErrorKind::AllStrategiesExhausted,
            format!("all {} strategies failed for @{handle}", failures.len()),
            failures,
        )
    }

    fn cached(&self, handle: &Handle, max_count: usize, mode: CacheMode) -> Option<AcquisitionResult> {
        let cache = self.cache.as_ref().filter(|_| mode.reads())?;
        let entry = cache
            .get(handle)
            .filter(|entry| !entry.items.is_empty() && entry.covers(max_count))?;

        tracing::info!(
            handle = %handle,
            source = %entry.source,
            count = entry.items.len().min(max_count),
            "serving cached acquisition"
        );
        let mut items = entry.items;
        items.truncate(max_count);
        let mut result = AcquisitionResult::succeeded(handle, &entry.source, items, Vec::new());
        result.cached = true;
        Some(result)
    }

    async fn run_strategy(
        &self,
        strategy: &Arc<dyn Strategy>,
        handle: &Handle,
        max_count: usize,
        token: &CancellationToken,
    ) -> StrategyRun {
        let descriptor = strategy.descriptor();
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!(strategy = strategy.name(), attempt, "trying strategy");
            let trial = self.trial(strategy, handle, max_count, token).await;
            if descriptor.network {
                self.limiter.record_usage();
            }

            let outcome = match trial {
                Trial::Finished(outcome) => outcome,
                Trial::TimedOut => StrategyOutcome::unavailable(format!(
                    "timed out after {} ms",
                    descriptor.timeout.as_millis()
                )),
                Trial::Crashed(reason) => {
                    tracing::error!(strategy = strategy.name(), %reason, "strategy crashed");
                    return StrategyRun::Failed(StrategyFailure::new(
                        strategy.name(),
                        AcquisitionErrorKind::InternalError,
                        reason,
                    ));
                }
                Trial::Cancelled => return StrategyRun::Cancelled,
            };

            match outcome {
                StrategyOutcome::Ok(batch) => {
                    let items = strategy.normalize(&batch);
                    if items.is_empty() {
                        return StrategyRun::Failed(StrategyFailure::new(
                            strategy.name(),
                            AcquisitionErrorKind::StrategyUnavailable,
                            format!("none of {} raw items passed validation", batch.items.len()),
                        ));
                    }
                    return StrategyRun::Won(items);
                }
                StrategyOutcome::Empty => {
                    return StrategyRun::Failed(StrategyFailure::new(
                        strategy.name(),
                        AcquisitionErrorKind::StrategyUnavailable,
                        "returned no items",
                    ));
                }
                StrategyOutcome::Unavailable(reason) => {
                    return StrategyRun::Failed(StrategyFailure::new(
                        strategy.name(),
                        AcquisitionErrorKind::StrategyUnavailable,
                        reason,
                    ));
                }
                StrategyOutcome::QuotaExhausted => {
                    let may_retry = attempt < descriptor.max_quota_retries
                        && self.backoff.allows_retry_after(attempt);
                    if !may_retry {
                        return StrategyRun::Failed(StrategyFailure::new(
                            strategy.name(),
                            AcquisitionErrorKind::QuotaExhaustedTransient,
                            format!("quota still exhausted after {attempt} retry(ies)"),
                        ));
                    }

                    tracing::warn!(
                        strategy = strategy.name(),
                        wait_secs = self.backoff.wait.as_secs(),
                        "quota exhausted; backing off before retrying"
                    );
                    if wait_or_cancel(self.backoff.wait, token).await.is_err() {
                        return StrategyRun::Cancelled;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Runs one `try_fetch` on its own task so a panic surfaces as a
    /// [`JoinError`] instead of unwinding through the orchestrator.
    async fn trial(
        &self,
        strategy: &Arc<dyn Strategy>,
        handle: &Handle,
        max_count: usize,
        token: &CancellationToken,
    ) -> Trial {
        let deadline = Instant::now() + strategy.descriptor().timeout;
        let request = match FetchRequest::new(handle.clone(), max_count, deadline) {
            Ok(request) => request,
            Err(error) => return Trial::Crashed(error.to_string()),
        };
        let owned = Arc::clone(strategy);
        let mut task = tokio::spawn(async move { owned.try_fetch(request).await });

        tokio::select! {
            biased;

            _ = token.cancelled() => {
                task.abort();
                Trial::Cancelled
            }
            joined = tokio::time::timeout_at(deadline, &mut task) => match joined {
                Err(_elapsed) => {
                    task.abort();
                    Trial::TimedOut
                }
                Ok(Ok(outcome)) => Trial::Finished(outcome),
                Ok(Err(error)) => Trial::Crashed(panic_message(error)),
            },
        }
    }
}

impl std::fmt::Debug for AcquisitionOrchestrator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("AcquisitionOrchestrator")
            .field("strategies", &names)
            .field("limiter", &self.limiter)
            .field("backoff", &self.backoff)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Builder for [`AcquisitionOrchestrator`].
///
/// ```rust,ignore
/// let orchestrator = AcquisitionOrchestrator::builder()
///     .with_strategy(Arc::new(SyndicationStrategy::new(http_client)))
///     .with_strategy(Arc::new(OfflineGeneratorStrategy::new()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct OrchestratorBuilder {
    strategies: Vec<Arc<dyn Strategy>>,
    limiter: Option<RateLimiter>,
    backoff: QuotaBackoff,
    cache: Option<ResponseCache>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validated configuration: strategy chain, a file-backed limiter and,
    /// when a cache file is configured, the response cache.
    pub fn from_config(
        config: &AcquisitionConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ConfigError> {
        let strategies = config.build_strategies(http_client)?;
        let limiter = RateLimiter::new(
            Arc::new(JsonFileStore::new(&config.state_file)),
            config.budget_ceiling,
        );
        let mut builder = Self::new().with_strategies(strategies).with_rate_limiter(limiter);
        if let Some(path) = &config.cache_file {
            builder = builder.with_cache(ResponseCache::new(path).with_ttl(config.cache_ttl));
        }
        Ok(builder)
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_strategies<I>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Strategy>>,
    {
        self.strategies.extend(strategies);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_backoff(mut self, backoff: QuotaBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sorts strategies by priority; ties keep insertion order.
    pub fn build(self) -> Result<AcquisitionOrchestrator, ConfigError> {
        if self.strategies.is_empty() {
            return Err(ConfigError::EmptyChain);
        }
        let limiter = match self.limiter {
            Some(limiter) => limiter,
            None => RateLimiter::new(
                Arc::new(JsonFileStore::new(DEFAULT_STATE_FILE)),
                DEFAULT_BUDGET_CEILING,
            ),
        };
        if limiter.budget_ceiling() == 0 {
            return Err(ConfigError::ZeroBudgetCeiling);
        }

        let mut strategies = self.strategies;
        strategies.sort_by_key(|strategy| strategy.descriptor().priority);

        Ok(AcquisitionOrchestrator {
            strategies,
            limiter,
            backoff: self.backoff,
            cache: self.cache,
        })
    }
}
