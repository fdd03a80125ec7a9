//! Core engine for chirpfetch.
//!
//! This crate contains:
//! - Handle and post domain models with validation
//! - The persisted fixed-window rate budget and response cache
//! - The `Strategy` contract and the built-in strategies
//! - The acquisition orchestrator and its JSON report

pub mod backoff;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod mirror_health;
pub mod orchestrator;
pub mod pacing;
pub mod rate_limit;
pub mod report;
pub mod strategies;
pub mod strategy;

pub use backoff::{wait_or_cancel, Interrupted, QuotaBackoff};
pub use cache::{CacheMode, CachedAcquisition, ResponseCache, DEFAULT_CACHE_TTL};
pub use config::AcquisitionConfig;
pub use domain::{
    validate_text, Handle, ItemMetrics, NormalizedItem, UtcDateTime, MIN_TEXT_LEN_EXCLUSIVE,
};
pub use error::{ConfigError, ValidationError};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use mirror_health::{MirrorHealth, MirrorHealthConfig};
pub use orchestrator::{
    AcquisitionErrorKind, AcquisitionOrchestrator, AcquisitionResult, OrchestratorBuilder,
    StrategyFailure,
};
pub use pacing::RequestPacer;
pub use rate_limit::{
    Admission, Clock, JsonFileStore, MemoryStore, RateLimitState, RateLimitStore, RateLimiter,
    StoreError, SystemClock,
};
pub use report::AcquisitionReport;
pub use strategies::{
    BearerApiStrategy, GuestSearchStrategy, MirrorScrapeStrategy, OfflineGeneratorStrategy,
    SyndicationStrategy, MAX_GENERATED_PER_CALL,
};
pub use strategy::{
    normalize_each, FetchRequest, RawBatch, Strategy, StrategyDescriptor, StrategyFuture,
    StrategyId, StrategyOutcome, MAX_FETCH_COUNT,
};
