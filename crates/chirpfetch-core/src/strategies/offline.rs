use std::time::Duration;

use serde_json::{json, Value};

use super::{json_count, json_string, json_timestamp};
use crate::strategy::{
    normalize_each, FetchRequest, RawBatch, Strategy, StrategyDescriptor, StrategyFuture,
    StrategyId, StrategyOutcome,
};
use crate::{Handle, ItemMetrics, NormalizedItem, UtcDateTime, ValidationError};

const TEMPLATES: [&str; 16] = [
    "Shipping a small improvement today, more to come soon.",
    "Spent the morning reading through old notes and found a few gems.",
    "Grateful for everyone who showed up to the meetup last night!",
    "Hot take: documentation is a feature, not an afterthought.",
    "Trying a new routine this week. Will report back on how it goes.",
    "The best conversations happen after the talk, in the hallway.",
    "Reminder to take a break and step outside for a bit.",
    "Working on something new behind the scenes. Stay tuned.",
    "Nothing beats a quiet evening with a good book.",
    "Small steps every day add up to big changes.",
    "Thanks for all the thoughtful replies on yesterday's thread.",
    "Weekend plans: coffee, a long walk and zero notifications.",
    "Learning in public is uncomfortable and completely worth it.",
    "Just wrapped up a long week. Proud of what the team built.",
    "If you have questions, my replies are open this afternoon.",
    "Sometimes the simplest solution really is the right one.",
];

const SUFFIXES: [&str; 6] = ["", " 🚀", " #buildinpublic", " What do you think?", " 🙌", " More soon."];

/// Most items one call generates, whatever count is requested.
pub const MAX_GENERATED_PER_CALL: usize = 100;

/// Thirty days, in minutes.
const MAX_AGE_MINUTES: u64 = 30 * 24 * 60;

/// Last-resort generator. Produces plausible, clearly synthetic items
/// without any network access, so it never charges the rate budget.
#[derive(Debug, Clone)]
pub struct OfflineGeneratorStrategy {
    descriptor: StrategyDescriptor,
}

impl Default for OfflineGeneratorStrategy {
    fn default() -> Self {
        let id = StrategyId::OfflineGenerator;
        Self {
            descriptor: StrategyDescriptor::offline(
                id.as_str(),
                id.default_priority(),
                Duration::from_secs(5),
            ),
        }
    }
}

impl OfflineGeneratorStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_descriptor(mut self, descriptor: StrategyDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }
}

fn handle_seed(handle: &Handle) -> u64 {
    handle
        .as_str()
        .bytes()
        .fold(0_u64, |acc, byte| acc.wrapping_mul(33).wrapping_add(u64::from(byte)))
}

/// Deterministic raw items for `handle`: equal inputs give equal output.
/// Items are newest first and dated within thirty days before `fetched_at`.
/// At most [`MAX_GENERATED_PER_CALL`] items are produced.
pub fn generate_items(handle: &Handle, count: usize, fetched_at: UtcDateTime) -> Vec<Value> {
    let count = count.min(MAX_GENERATED_PER_CALL);
    let seed = handle_seed(handle);
    let mut rng = fastrand::Rng::with_seed(seed);

    let mut ages: Vec<u64> = (0..count).map(|_| rng.u64(1..=MAX_AGE_MINUTES)).collect();
    ages.sort_unstable();

    ages.into_iter()
        .enumerate()
        .map(|(index, age_minutes)| {
            let template = TEMPLATES[rng.usize(..TEMPLATES.len())];
            let suffix = SUFFIXES[rng.usize(..SUFFIXES.len())];
            let likes = rng.u64(50..=500);
            let status = rng.u64(1_000_000_000_000_000_000..=9_999_999_999_999_999_999);
            let created_at = fetched_at.saturating_sub(time::Duration::minutes(age_minutes as i64));

            json!({
                "id": format!("generated_{}_{index}", handle.as_str()),
                "text": format!("{template}{suffix}"),
                "created_at": created_at.format_rfc3339(),
                "retweet_count": rng.u64(1..=(likes / 10).max(15)),
                "like_count": likes,
                "reply_count": rng.u64(0..=(likes / 20).max(10)),
                "quote_count": rng.u64(0..=(likes / 50).max(5)),
                "url": format!("https://twitter.com/{}/status/{status}", handle.as_str()),
            })
        })
        .collect()
}

impl Strategy for OfflineGeneratorStrategy {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a> {
        Box::pin(async move {
            let fetched_at = UtcDateTime::now();
            let items = generate_items(&req.handle, req.max_count, fetched_at);
            StrategyOutcome::from_items(req.handle, fetched_at, items)
        })
    }

    fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem> {
        normalize_each(raw, |value| {
            let id = json_string(value, "id").ok_or(ValidationError::EmptyItemId)?;
            let text = value.get("text").and_then(Value::as_str).unwrap_or_default();
            let url = value.get("url").and_then(Value::as_str).unwrap_or_default();
            let metrics = ItemMetrics::new(
                json_count(value, "retweet_count"),
                json_count(value, "like_count"),
                json_count(value, "reply_count"),
                json_count(value, "quote_count"),
            );

            NormalizedItem::new(
                id,
                text,
                json_timestamp(value, "created_at", raw.fetched_at),
                metrics,
                url,
            )
        })
    }
}
