//! Persisted fixed-window request budget shared by every network call.
//!
//! State is a single JSON document:
//!
//! ```json
//! {"requests": [1700000000.25, 1700000003.5], "last_reset": 1699999990.0}
//! ```
//!
//! Every operation loads the document, mutates it in memory and writes it
//! back. Nothing is cached between calls, so two processes sharing one file
//! race with last-write-wins semantics and may lose usage records. Run a
//! single orchestrator per state file.
//!
//! Storage errors never surface: an unreadable or corrupt file is treated as
//! a fresh, empty window and a failed write is logged and ignored. The
//! limiter therefore fails open.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the accounting window.
pub const WINDOW: Duration = Duration::from_secs(900);
/// Admissions allowed per window unless configured otherwise.
pub const DEFAULT_BUDGET_CEILING: u32 = 250;
/// State file location, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "twitter_rate_limits.json";

/// Persisted limiter state. Timestamps are fractional epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitState {
    /// One entry per charged network call, oldest first.
    pub requests: Vec<f64>,
    /// Start of the current window.
    pub last_reset: f64,
}

impl RateLimitState {
    pub fn fresh(now: f64) -> Self {
        Self {
            requests: Vec::new(),
            last_reset: now,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store io error: {0}")]
    Io(#[from] io::Error),
    #[error("state store holds malformed data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable backing for [`RateLimitState`].
pub trait RateLimitStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<RateLimitState>, StoreError>;
    fn save(&self, state: &RateLimitState) -> Result<(), StoreError>;
}

/// JSON file store. The file is overwritten whole on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RateLimitStore for JsonFileStore {
    fn load(&self) -> Result<Option<RateLimitState>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, state: &RateLimitState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// In-memory store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<RateLimitState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RateLimitState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    pub fn snapshot(&self) -> Option<RateLimitState> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RateLimitStore for MemoryStore {
    fn load(&self) -> Result<Option<RateLimitState>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &RateLimitState) -> Result<(), StoreError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        Ok(())
    }
}

/// Wall-clock source in fractional epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    pub allowed: bool,
    /// Zero when allowed; otherwise time until the current window expires.
    pub retry_after: Duration,
    /// Charged calls inside the window after pruning.
    pub used: usize,
}

/// Fixed-window request budget backed by a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    budget_ceiling: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, budget_ceiling: u32) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            budget_ceiling,
            window: WINDOW,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub const fn budget_ceiling(&self) -> u32 {
        self.budget_ceiling
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self) -> Admission {
        self.admit_at(self.clock.now())
    }

    /// Admission check at an explicit instant.
    ///
    /// A window older than [`WINDOW`] is reset in full (not slid) and the
    /// call is admitted. Otherwise stale entries are pruned and the call is
    /// admitted while fewer than `budget_ceiling` entries remain. A denial
    /// reports the time until the window, not the oldest entry, expires.
    ///
    /// A window start that is not finite or lies in the future is treated
    /// as corrupt state and reset like an expired window.
    pub fn admit_at(&self, now: f64) -> Admission {
        let window = self.window.as_secs_f64();
        let mut state = self.load_or_fresh(now);

        let corrupt = !state.last_reset.is_finite() || state.last_reset > now;
        if corrupt {
            tracing::warn!(
                last_reset = state.last_reset,
                now,
                "rate-limit window start is not a past instant; starting a fresh window"
            );
        }

        if corrupt || now - state.last_reset > window {
            state = RateLimitState::fresh(now);
            self.persist(&state);
            return Admission {
                allowed: true,
                retry_after: Duration::ZERO,
                used: 0,
            };
        }

        let before = state.requests.len();
        state.requests.retain(|&stamp| stamp.is_finite() && now - stamp < window);
        if state.requests.len() != before {
            self.persist(&state);
        }

        let used = state.requests.len();
        if used < self.budget_ceiling as usize {
            return Admission {
                allowed: true,
                retry_after: Duration::ZERO,
                used,
            };
        }

        let remaining = (window - (now - state.last_reset)).max(0.0);
        Admission {
            allowed: false,
            retry_after: Duration::try_from_secs_f64(remaining).unwrap_or(self.window),
            used,
        }
    }

    pub fn record_usage(&self) {
        self.record_usage_at(self.clock.now());
    }

    /// Charges one network call against the budget.
    pub fn record_usage_at(&self, now: f64) {
        let mut state = self.load_or_fresh(now);
        state.requests.push(now);
        self.persist(&state);
    }

    /// Current persisted state, or a fresh one when absent or unreadable.
    pub fn state(&self) -> RateLimitState {
        self.load_or_fresh(self.clock.now())
    }

    fn load_or_fresh(&self, now: f64) -> RateLimitState {
        match self.store.load() {
            Ok(Some(state)) => state,
            Ok(None) => RateLimitState::fresh(now),
            Err(error) => {
                tracing::warn!(%error, "rate-limit state unreadable; starting a fresh window");
                RateLimitState::fresh(now)
            }
        }
    }

    fn persist(&self, state: &RateLimitState) {
        if let Err(error) = self.store.save(state) {
            tracing::warn!(%error, "failed to persist rate-limit state");
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("budget_ceiling", &self.budget_ceiling)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: f64 = 1_700_000_000.0;

    fn limiter_with(store: Arc<MemoryStore>, ceiling: u32) -> RateLimiter {
        RateLimiter::new(store, ceiling)
    }

    #[test]
    fn pristine_store_admits() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter_with(store, 3);

        let admission = limiter.admit_at(T0);
        assert!(admission.allowed);
        assert_eq!(admission.retry_after, Duration::ZERO);
        assert_eq!(admission.used, 0);
    }

    #[test]
    fn denies_once_ceiling_is_reached_and_reports_window_remainder() {
        let store = Arc::new(MemoryStore::with_state(RateLimitState::fresh(T0)));
        let limiter = limiter_with(store, 3);

        for offset in 0..3 {
            let now = T0 + f64::from(offset);
            assert!(limiter.admit_at(now).allowed);
            limiter.record_usage_at(now);
        }

        let admission = limiter.admit_at(T0 + 100.0);
        assert!(!admission.allowed);
        assert_eq!(admission.used, 3);
        assert_eq!(admission.retry_after, Duration::from_secs(800));
    }

    #[test]
    fn expired_window_resets_in_full() {
        let store = Arc::new(MemoryStore::with_state(RateLimitState {
            requests: vec![T0 + 1.0, T0 + 899.0],
            last_reset: T0,
        }));
        let limiter = limiter_with(store.clone(), 1);

        let admission = limiter.admit_at(T0 + 901.0);
        assert!(admission.allowed);

        let state = store.snapshot().expect("reset must be persisted");
        assert!(state.requests.is_empty());
        assert_eq!(state.last_reset, T0 + 901.0);
    }

    #[test]
    fn exactly_one_window_old_is_not_yet_reset() {
        let store = Arc::new(MemoryStore::with_state(RateLimitState {
            requests: vec![T0 + 10.0],
            last_reset: T0,
        }));
        let limiter = limiter_with(store.clone(), 1);

        let admission = limiter.admit_at(T0 + 900.0);
        assert!(!admission.allowed);
        assert_eq!(store.snapshot().map(|s| s.last_reset), Some(T0));
    }

    #[test]
    fn future_window_start_is_reset_instead_of_trusted() {
        let store = Arc::new(MemoryStore::with_state(RateLimitState {
            requests: vec![1e20],
            last_reset: 1e20,
        }));
        let limiter = limiter_with(store.clone(), 1);

        let admission = limiter.admit_at(T0);
        assert!(admission.allowed);
        assert_eq!(store.snapshot(), Some(RateLimitState::fresh(T0)));
    }

    #[test]
    fn non_finite_entries_are_dropped() {
        let store = Arc::new(MemoryStore::with_state(RateLimitState {
            requests: vec![f64::NAN, T0 - 1.0],
            last_reset: T0 - 10.0,
        }));
        let limiter = limiter_with(store, 5);

        assert_eq!(limiter.admit_at(T0).used, 1);
    }

    #[test]
    fn stale_entries_are_pruned_on_admission() {
        let store = Arc::new(MemoryStore::with_state(RateLimitState {
            requests: vec![T0 - 1_000.0, T0 - 5.0],
            last_reset: T0 - 10.0,
        }));
        let limiter = limiter_with(store.clone(), 5);

        let admission = limiter.admit_at(T0);
        assert_eq!(admission.used, 1);
        assert_eq!(store.snapshot().map(|s| s.requests), Some(vec![T0 - 5.0]));
    }

    #[test]
    fn corrupt_file_fails_open_and_is_overwritten() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("limits.json");
        fs::write(&path, "{not json").expect("write corrupt state");
        let store = Arc::new(JsonFileStore::new(&path));
        let limiter = RateLimiter::new(store.clone(), 1);

        assert!(limiter.admit_at(T0).allowed);
        limiter.record_usage_at(T0);

        let state = store.load().expect("readable").expect("present");
        assert_eq!(state.requests, vec![T0]);
    }

    #[test]
    fn file_store_round_trips_wire_format() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("limits.json");
        let store = JsonFileStore::new(&path);

        assert!(store.load().expect("missing file is not an error").is_none());
        store
            .save(&RateLimitState {
                requests: vec![T0 + 0.5],
                last_reset: T0,
            })
            .expect("save");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["requests"][0], T0 + 0.5);
        assert_eq!(raw["last_reset"], T0);
    }
}
