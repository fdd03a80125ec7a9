//! Scripted strategies shared by the behavior tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chirpfetch_core::{
    normalize_each, FetchRequest, ItemMetrics, MemoryStore, NormalizedItem, RateLimitState,
    RateLimiter, RawBatch, Strategy, StrategyDescriptor, StrategyFuture, StrategyOutcome,
    UtcDateTime,
};
use serde_json::{json, Value};

/// One scripted answer to `try_fetch`.
#[derive(Debug, Clone)]
pub enum Step {
    Items(Vec<&'static str>),
    Empty,
    Quota,
    Unavailable(&'static str),
    /// Sleeps for the given time, then reports `Empty`.
    Stall(Duration),
}

/// Strategy that replays scripted steps and counts its attempts. Raw items
/// are `{id, text}` objects; texts are validated by `normalize`.
#[derive(Debug)]
pub struct ScriptedStrategy {
    descriptor: StrategyDescriptor,
    steps: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
}

impl ScriptedStrategy {
    pub fn network(name: &str, priority: u16, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            descriptor: StrategyDescriptor::network(name, priority, Duration::from_secs(10)),
            steps: Mutex::new(steps.into()),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn offline(name: &str, priority: u16, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            descriptor: StrategyDescriptor::offline(name, priority, Duration::from_secs(5)),
            steps: Mutex::new(steps.into()),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Strategy for ScriptedStrategy {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let step = self
                .steps
                .lock()
                .expect("script should not be poisoned")
                .pop_front()
                .unwrap_or(Step::Unavailable("script exhausted"));

            match step {
                Step::Items(texts) => {
                    let items: Vec<Value> = texts
                        .iter()
                        .enumerate()
                        .map(|(index, text)| {
                            json!({"id": format!("{}-{index}", self.descriptor.name), "text": text})
                        })
                        .collect();
                    StrategyOutcome::from_items(req.handle, UtcDateTime::now(), items)
                }
                Step::Empty => StrategyOutcome::Empty,
                Step::Quota => StrategyOutcome::QuotaExhausted,
                Step::Unavailable(reason) => StrategyOutcome::unavailable(reason),
                Step::Stall(duration) => {
                    tokio::time::sleep(duration).await;
                    StrategyOutcome::Empty
                }
            }
        })
    }

    fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem> {
        normalize_each(raw, |value| {
            let id = value["id"].as_str().unwrap_or_default();
            NormalizedItem::new(
                id,
                value["text"].as_str().unwrap_or_default(),
                raw.fetched_at,
                ItemMetrics::default(),
                format!("https://example.test/status/{id}"),
            )
        })
    }
}

/// In-memory limiter with the default ceiling; returns the store so tests
/// can count charged calls.
pub fn memory_limiter() -> (Arc<MemoryStore>, RateLimiter) {
    let store = Arc::new(MemoryStore::new());
    let limiter = RateLimiter::new(store.clone(), 250);
    (store, limiter)
}

/// Number of `RecordUsage` calls persisted so far.
pub fn charged_calls(store: &MemoryStore) -> usize {
    store
        .snapshot()
        .map(|state: RateLimitState| state.requests.len())
        .unwrap_or(0)
}
