use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::{check_status, json_string, json_timestamp, legacy_metrics, parse_body, transport_failure};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, BROWSER_USER_AGENT};
use crate::strategy::{
    normalize_each, FetchRequest, RawBatch, Strategy, StrategyDescriptor, StrategyFuture,
    StrategyId, StrategyOutcome,
};
use crate::{ItemMetrics, NormalizedItem, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PER_CALL: usize = 100;
const GUEST_TOKEN_HEADER: &str = "x-guest-token";

/// Guest-session search: activates a guest token with the web client's
/// bearer credential, then searches `from:<handle>`.
///
/// The guest token is cached across attempts and dropped when the search
/// endpoint rejects it.
pub struct GuestSearchStrategy {
    descriptor: StrategyDescriptor,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    guest_token: Mutex<Option<String>>,
}

impl GuestSearchStrategy {
    pub fn new(http_client: Arc<dyn HttpClient>, web_bearer_token: impl Into<String>) -> Self {
        let id = StrategyId::GuestToken;
        Self {
            descriptor: StrategyDescriptor::network(
                id.as_str(),
                id.default_priority(),
                Duration::from_secs(15),
            ),
            http_client,
            auth: HttpAuth::BearerToken(web_bearer_token.into()),
            base_url: String::from(DEFAULT_BASE_URL),
            guest_token: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_descriptor(mut self, descriptor: StrategyDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    fn cached_token(&self) -> Option<String> {
        self.guest_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store_token(&self, token: Option<String>) {
        *self.guest_token.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }

    async fn guest_token(&self, req: &FetchRequest) -> Result<String, StrategyOutcome> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let request = HttpRequest::post(format!("{}/1.1/guest/activate.json", self.base_url))
            .with_auth(&self.auth)
            .with_header("user-agent", BROWSER_USER_AGENT)
            .with_timeout_ms(req.http_timeout_ms(CALL_TIMEOUT));
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| transport_failure("guest activation", &error))?;
        check_status(self.name(), "guest activation", &response)?;
        let body = parse_body("guest activation", &response.body)?;

        let token = json_string(&body, "guest_token")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| StrategyOutcome::unavailable("guest activation returned no token"))?;
        self.store_token(Some(token.clone()));
        Ok(token)
    }
}

impl Strategy for GuestSearchStrategy {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a> {
        Box::pin(async move {
            let fetched_at = crate::UtcDateTime::now();
            let token = match self.guest_token(&req).await {
                Ok(token) => token,
                Err(outcome) => return outcome,
            };

            let request = HttpRequest::get(format!("{}/1.1/search/tweets.json", self.base_url))
                .with_query("q", format!("from:{}", req.handle.as_str()))
                .with_query("result_type", "recent")
                .with_query("count", req.max_count.min(MAX_PER_CALL))
                .with_query("include_entities", "false")
                .with_query("tweet_mode", "extended")
                .with_auth(&self.auth)
                .with_auth(&HttpAuth::Header {
                    name: String::from(GUEST_TOKEN_HEADER),
                    value: token,
                })
                .with_header("user-agent", BROWSER_USER_AGENT)
                .with_timeout_ms(req.http_timeout_ms(CALL_TIMEOUT));

            let response = match self.http_client.execute(request).await {
                Ok(response) => response,
                Err(error) => return transport_failure("search", &error),
            };
            if matches!(response.status, 401 | 403) {
                self.store_token(None);
                return StrategyOutcome::unavailable(format!(
                    "guest token rejected with status {}",
                    response.status
                ));
            }
            if let Err(outcome) = check_status(self.name(), "search", &response) {
                return outcome;
            }
            let body = match parse_body("search", &response.body) {
                Ok(body) => body,
                Err(outcome) => return outcome,
            };

            let statuses = match body.get("statuses") {
                Some(Value::Array(statuses)) => statuses.clone(),
                _ => Vec::new(),
            };
            StrategyOutcome::from_items(req.handle, fetched_at, statuses)
        })
    }

    fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem> {
        let handle = raw.handle.as_str();
        normalize_each(raw, |value| {
            let id = json_string(value, "id_str")
                .or_else(|| json_string(value, "id"))
                .ok_or(ValidationError::EmptyItemId)?;
            let text = value
                .get("full_text")
                .or_else(|| value.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let legacy = legacy_metrics(value);
            // Search results carry no reply counter.
            let metrics = ItemMetrics::new(legacy.repost_count, legacy.like_count, 0, legacy.quote_count);
            let url = format!("https://twitter.com/{handle}/status/{id}");

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

impl std::fmt::Debug for GuestSearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestSearchStrategy")
            .field("descriptor", &self.descriptor)
            .field("auth", &self.auth)
            .field("base_url", &self.base_url)
            .field("has_guest_token", &self.cached_token().is_some())
            .finish()
    }
}
