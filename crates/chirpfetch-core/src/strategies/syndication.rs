use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{check_status, json_string, json_timestamp, legacy_metrics, parse_body, transport_failure};
use crate::http_client::{HttpClient, HttpRequest, BROWSER_USER_AGENT};
use crate::strategy::{
    normalize_each, FetchRequest, RawBatch, Strategy, StrategyDescriptor, StrategyFuture,
    StrategyId, StrategyOutcome,
};
use crate::{NormalizedItem, ValidationError};

const DEFAULT_ENDPOINT: &str = "https://syndication.twitter.com/srv/timeline-profile/screen-name";
const MAX_PER_CALL: usize = 20;

/// Public embed-timeline endpoint. Needs no credential.
#[derive(Clone)]
pub struct SyndicationStrategy {
    descriptor: StrategyDescriptor,
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
}

impl SyndicationStrategy {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        let id = StrategyId::SyndicationApi;
        Self {
            descriptor: StrategyDescriptor::network(
                id.as_str(),
                id.default_priority(),
                Duration::from_secs(10),
            ),
            http_client,
            endpoint: String::from(DEFAULT_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_descriptor(mut self, descriptor: StrategyDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }
}

/// Pulls `body.children[].tweet` out of a timeline document, skipping
/// children that carry no post.
fn timeline_posts(document: &Value) -> Vec<Value> {
    document
        .get("body")
        .and_then(|body| body.get("children"))
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.get("tweet"))
                .filter(|tweet| tweet.is_object())
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

impl Strategy for SyndicationStrategy {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a> {
        Box::pin(async move {
            let fetched_at = crate::UtcDateTime::now();
            let request = HttpRequest::get(format!("{}/{}", self.endpoint, req.handle.as_str()))
                .with_query("limit", req.max_count.min(MAX_PER_CALL))
                .with_query("showReplies", "false")
                .with_query("showRetweets", "false")
                .with_header("user-agent", BROWSER_USER_AGENT)
                .with_header("accept", "application/json")
                .with_header("referer", "https://twitter.com/")
                .with_timeout_ms(req.http_timeout_ms(self.descriptor.timeout));

            let response = match self.http_client.execute(request).await {
                Ok(response) => response,
                Err(error) => return transport_failure("timeline read", &error),
            };
            if let Err(outcome) = check_status(self.name(), "timeline read", &response) {
                return outcome;
            }
            let document = match parse_body("timeline read", &response.body) {
                Ok(document) => document,
                Err(outcome) => return outcome,
            };

            StrategyOutcome::from_items(req.handle, fetched_at, timeline_posts(&document))
        })
    }

    fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem> {
        let handle = raw.handle.as_str();
        normalize_each(raw, |value| {
            let id = json_string(value, "id_str")
                .or_else(|| json_string(value, "id"))
                .ok_or(ValidationError::EmptyItemId)?;
            let text = value
                .get("text")
                .or_else(|| value.get("full_text"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let url = format!("https://twitter.com/{handle}/status/{id}");

            NormalizedItem::new(
                id,
                text,
                json_timestamp(value, "created_at", raw.fetched_at),
                legacy_metrics(value),
                url,
            )
        })
    }
}

impl std::fmt::Debug for SyndicationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyndicationStrategy")
            .field("descriptor", &self.descriptor)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
