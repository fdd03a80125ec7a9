//! Built-in acquisition strategies.
//!
//! | Strategy | Backing | Charges budget |
//! |----------|---------|----------------|
//! | [`BearerApiStrategy`] | bearer-token user lookup + timeline | yes |
//! | [`SyndicationStrategy`] | public syndication timeline | yes |
//! | [`GuestSearchStrategy`] | guest-token activation + search | yes |
//! | [`MirrorScrapeStrategy`] | mirrored-frontend HTML pages | yes |
//! | [`OfflineGeneratorStrategy`] | deterministic templates | no |

mod bearer_api;
mod guest_search;
mod mirror;
mod offline;
mod syndication;

pub use bearer_api::BearerApiStrategy;
pub use guest_search::GuestSearchStrategy;
pub use mirror::{MirrorScrapeStrategy, DEFAULT_MIRROR_HOSTS};
pub use offline::{generate_items, OfflineGeneratorStrategy, MAX_GENERATED_PER_CALL};
pub use syndication::SyndicationStrategy;

use serde_json::Value;

use crate::http_client::{HttpError, HttpResponse};
use crate::strategy::StrategyOutcome;
use crate::{ItemMetrics, UtcDateTime};

/// Maps a response status onto the outcome contract. `Ok` means the caller
/// should go on and parse the body.
pub(crate) fn check_status<'r>(
    strategy: &str,
    call: &str,
    response: &'r HttpResponse,
) -> Result<&'r HttpResponse, StrategyOutcome> {
    if response.is_quota_exhausted() {
        tracing::warn!(strategy, call, "upstream reported quota exhaustion");
        return Err(StrategyOutcome::QuotaExhausted);
    }
    if !response.is_success() {
        return Err(StrategyOutcome::unavailable(format!(
            "{call} returned status {}",
            response.status
        )));
    }
    Ok(response)
}

pub(crate) fn transport_failure(call: &str, error: &HttpError) -> StrategyOutcome {
    if error.is_timeout() {
        StrategyOutcome::unavailable(format!("{call} timed out: {}", error.message()))
    } else {
        StrategyOutcome::unavailable(format!("{call} transport error: {}", error.message()))
    }
}

pub(crate) fn parse_body(call: &str, body: &str) -> Result<Value, StrategyOutcome> {
    serde_json::from_str(body)
        .map_err(|error| StrategyOutcome::unavailable(format!("{call} returned malformed json: {error}")))
}

/// String field; numeric ids are rendered as decimal strings.
pub(crate) fn json_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Non-negative counter; absent, negative or malformed values read as 0.
pub(crate) fn json_count(value: &Value, key: &str) -> u64 {
    match value.get(key) {
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Upstream timestamp as text or epoch seconds; anything unreadable falls
/// back to the batch fetch time.
pub(crate) fn json_timestamp(value: &Value, key: &str, fallback: UtcDateTime) -> UtcDateTime {
    let parsed = match value.get(key) {
        Some(Value::String(raw)) => UtcDateTime::parse_upstream(raw).ok(),
        Some(Value::Number(seconds)) => seconds.as_f64().and_then(UtcDateTime::from_unix_seconds),
        _ => None,
    };
    parsed.unwrap_or(fallback)
}

/// Legacy REST payload counters (`favorite_count` is the like counter).
pub(crate) fn legacy_metrics(value: &Value) -> ItemMetrics {
    ItemMetrics::new(
        json_count(value, "retweet_count"),
        json_count(value, "favorite_count"),
        json_count(value, "reply_count"),
        json_count(value, "quote_count"),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};

    /// Replays scripted responses in order and records every request.
    #[derive(Debug, Default)]
    pub struct ScriptedHttpClient {
        responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        pub fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self
                .responses
                .lock()
                .expect("response script should not be poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(HttpError::new("no scripted response left")));
            Box::pin(async move { response })
        }
    }
}
