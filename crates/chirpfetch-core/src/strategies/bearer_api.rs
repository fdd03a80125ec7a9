use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{check_status, json_count, json_string, json_timestamp, parse_body, transport_failure};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::pacing::RequestPacer;
use crate::strategy::{
    normalize_each, FetchRequest, RawBatch, Strategy, StrategyDescriptor, StrategyFuture,
    StrategyId, StrategyOutcome,
};
use crate::{ItemMetrics, NormalizedItem, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const CALL_TIMEOUT: Duration = Duration::from_secs(10);
/// The timeline endpoint rejects `max_results` outside 5..=100; this
/// strategy never asks for more than 10 per call.
const MIN_RESULTS: usize = 5;
const MAX_RESULTS: usize = 10;

/// Official v2 API: user lookup followed by a timeline read.
#[derive(Clone)]
pub struct BearerApiStrategy {
    descriptor: StrategyDescriptor,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    pacer: RequestPacer,
}

impl BearerApiStrategy {
    pub fn new(http_client: Arc<dyn HttpClient>, bearer_token: impl Into<String>) -> Self {
        let id = StrategyId::BearerApi;
        Self {
            descriptor: StrategyDescriptor::network(
                id.as_str(),
                id.default_priority(),
                Duration::from_secs(25),
            ),
            http_client,
            auth: HttpAuth::BearerToken(bearer_token.into()),
            base_url: String::from(DEFAULT_BASE_URL),
            pacer: RequestPacer::new(Duration::from_secs(1)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_descriptor(mut self, descriptor: StrategyDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    async fn lookup_user_id(&self, req: &FetchRequest) -> Result<Option<String>, StrategyOutcome> {
        let request = HttpRequest::get(format!(
            "{}/2/users/by/username/{}",
            self.base_url,
            req.handle.as_str()
        ))
        .with_auth(&self.auth)
        .with_timeout_ms(req.http_timeout_ms(CALL_TIMEOUT));

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| transport_failure("user lookup", &error))?;
        check_status(self.name(), "user lookup", &response)?;
        let body = parse_body("user lookup", &response.body)?;

        Ok(body.get("data").and_then(|data| json_string(data, "id")))
    }

    async fn read_timeline(&self, req: &FetchRequest, user_id: &str) -> Result<Vec<Value>, StrategyOutcome> {
        let max_results = req.max_count.clamp(MIN_RESULTS, MAX_RESULTS);
        let request = HttpRequest::get(format!("{}/2/users/{user_id}/tweets", self.base_url))
            .with_query("max_results", max_results)
            .with_query("tweet.fields", "created_at,public_metrics")
            .with_auth(&self.auth)
            .with_timeout_ms(req.http_timeout_ms(CALL_TIMEOUT));

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| transport_failure("timeline read", &error))?;
        check_status(self.name(), "timeline read", &response)?;
        let body = parse_body("timeline read", &response.body)?;

        Ok(match body.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        })
    }
}

impl Strategy for BearerApiStrategy {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a> {
        Box::pin(async move {
            let fetched_at = crate::UtcDateTime::now();
            let user_id = match self.lookup_user_id(&req).await {
                Ok(Some(user_id)) => user_id,
                Ok(None) => {
                    tracing::debug!(handle = %req.handle, "user lookup found no account");
                    return StrategyOutcome::Empty;
                }
                Err(outcome) => return outcome,
            };

            // Two calls in quick succession trip the upstream burst limit.
            self.pacer.ready().await;

            match self.read_timeline(&req, &user_id).await {
                Ok(items) => StrategyOutcome::from_items(req.handle, fetched_at, items),
                Err(outcome) => outcome,
            }
        })
    }

    fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem> {
        normalize_each(raw, |value| {
            let id = json_string(value, "id").ok_or(ValidationError::EmptyItemId)?;
            let text = value.get("text").and_then(Value::as_str).unwrap_or_default();
            let metrics = value
                .get("public_metrics")
                .map(|m| {
                    ItemMetrics::new(
                        json_count(m, "retweet_count"),
                        json_count(m, "like_count"),
                        json_count(m, "reply_count"),
                        json_count(m, "quote_count"),
                    )
                })
                .unwrap_or_default();
            let url = format!("https://twitter.com/i/web/status/{id}");

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

impl std::fmt::Debug for BearerApiStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerApiStrategy")
            .field("descriptor", &self.descriptor)
            .field("auth", &self.auth)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
