use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chirpfetch_core::{
    BearerApiStrategy, FetchRequest, GuestSearchStrategy, Handle, HttpClient, HttpError,
    HttpRequest, HttpResponse, MirrorScrapeStrategy, OfflineGeneratorStrategy, RawBatch,
    RequestPacer, Strategy, StrategyOutcome, SyndicationStrategy, UtcDateTime,
    MIN_TEXT_LEN_EXCLUSIVE,
};
use serde_json::json;
use tokio::time::Instant;

/// Replays the same canned response for every request.
#[derive(Debug)]
struct CannedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    fallback: Result<HttpResponse, HttpError>,
}

impl CannedHttpClient {
    fn always(response: Result<HttpResponse, HttpError>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: response,
        })
    }

    fn sequence(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            fallback: Err(HttpError::new("script exhausted")),
        })
    }
}

impl HttpClient for CannedHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = self
            .responses
            .lock()
            .expect("script should not be poisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { response })
    }
}

struct StrategyCase {
    name: &'static str,
    build: fn(Arc<CannedHttpClient>) -> Arc<dyn Strategy>,
    network: bool,
}

fn network_cases() -> Vec<StrategyCase> {
    vec![
        StrategyCase {
            name: "bearer_api",
            build: |client| {
                Arc::new(
                    BearerApiStrategy::new(client, "token")
                        .with_base_url("https://api.test")
                        .with_pacer(RequestPacer::unpaced()),
                )
            },
            network: true,
        },
        StrategyCase {
            name: "syndication_api",
            build: |client| Arc::new(SyndicationStrategy::new(client).with_endpoint("https://syndication.test")),
            network: true,
        },
        StrategyCase {
            name: "guest_token",
            build: |client| Arc::new(GuestSearchStrategy::new(client, "web").with_base_url("https://api.test")),
            network: true,
        },
        StrategyCase {
            name: "nitter_scraping",
            build: |client| Arc::new(MirrorScrapeStrategy::new(client).with_hosts(["a.test", "b.test"])),
            network: true,
        },
    ]
}

fn request() -> FetchRequest {
    FetchRequest::new(
        Handle::parse("example").expect("valid handle"),
        10,
        Instant::now() + Duration::from_secs(30),
    )
    .expect("valid request")
}

fn sample_batch(name: &str) -> RawBatch {
    let handle = Handle::parse("example").expect("valid handle");
    let fetched_at = UtcDateTime::parse("2024-05-01T00:00:00Z").expect("valid timestamp");
    let items = match name {
        "bearer_api" => vec![
            json!({"id": "1", "text": "bearer payload post", "created_at": "2024-04-30T10:00:00.000Z",
                   "public_metrics": {"retweet_count": 1, "like_count": 2, "reply_count": 0, "quote_count": 0}}),
            json!({"id": "2", "text": "ten chars!"}),
        ],
        "syndication_api" | "guest_token" => vec![
            json!({"id_str": "1", "full_text": "legacy payload post", "text": "legacy payload post",
                   "created_at": "Tue Apr 30 10:00:00 +0000 2024", "favorite_count": 3}),
            json!({"id_str": "", "text": "post without a usable id"}),
        ],
        "nitter_scraping" => vec![
            json!({"host": "a.test", "index": 0, "text": "scraped payload post"}),
            json!({"host": "a.test", "index": 1, "text": "   short   "}),
        ],
        _ => Vec::new(),
    };
    RawBatch::new(handle, fetched_at, items)
}

#[test]
fn every_strategy_reports_its_registered_name_and_network_flag() {
    for case in network_cases() {
        let strategy = (case.build)(CannedHttpClient::always(Err(HttpError::new("unused"))));
        assert_eq!(strategy.name(), case.name);
        assert_eq!(strategy.descriptor().network, case.network, "strategy '{}'", case.name);
        assert_eq!(strategy.descriptor().max_quota_retries, 1, "strategy '{}'", case.name);
    }

    let offline = OfflineGeneratorStrategy::new();
    assert_eq!(offline.name(), "offline_generator");
    assert!(!offline.descriptor().network);
}

#[test]
fn normalize_is_pure_and_only_emits_valid_items() {
    for case in network_cases() {
        let strategy = (case.build)(CannedHttpClient::always(Err(HttpError::new("unused"))));
        let batch = sample_batch(case.name);

        let first = strategy.normalize(&batch);
        let second = strategy.normalize(&batch);

        assert_eq!(first, second, "strategy '{}': normalize must be pure", case.name);
        assert_eq!(first.len(), 1, "strategy '{}': invalid candidates dropped", case.name);
        for item in &first {
            assert!(!item.id().is_empty(), "strategy '{}': id present", case.name);
            assert!(
                item.text().chars().count() > MIN_TEXT_LEN_EXCLUSIVE,
                "strategy '{}': text validated",
                case.name
            );
            assert!(item.source_url().starts_with("https://"), "strategy '{}': url", case.name);
        }
    }
}

#[tokio::test]
async fn quota_rejection_surfaces_as_quota_exhausted() {
    for case in network_cases() {
        let strategy = (case.build)(CannedHttpClient::always(Ok(HttpResponse::new(429, ""))));
        let outcome = strategy.try_fetch(request()).await;
        assert_eq!(
            outcome,
            StrategyOutcome::QuotaExhausted,
            "strategy '{}'",
            case.name
        );
    }
}

#[tokio::test]
async fn transport_failure_surfaces_as_unavailable_not_panic() {
    for case in network_cases() {
        let strategy = (case.build)(CannedHttpClient::always(Err(HttpError::new("connection reset"))));
        let outcome = strategy.try_fetch(request()).await;
        assert!(
            matches!(outcome, StrategyOutcome::Unavailable(_)),
            "strategy '{}': got {outcome:?}",
            case.name
        );
    }
}

#[tokio::test]
async fn server_errors_surface_as_unavailable() {
    for case in network_cases() {
        let strategy = (case.build)(CannedHttpClient::always(Ok(HttpResponse::new(503, ""))));
        let outcome = strategy.try_fetch(request()).await;
        assert!(
            matches!(outcome, StrategyOutcome::Unavailable(_)),
            "strategy '{}': got {outcome:?}",
            case.name
        );
    }
}

#[tokio::test]
async fn successful_payloads_round_trip_through_normalize() {
    let bearer_client = CannedHttpClient::sequence(vec![
        Ok(HttpResponse::ok_json(r#"{"data":{"id":"42"}}"#)),
        Ok(HttpResponse::ok_json(
            r#"{"data":[{"id":"1","text":"timeline post from the api"}]}"#,
        )),
    ]);
    let bearer = BearerApiStrategy::new(bearer_client, "token").with_pacer(RequestPacer::unpaced());

    let StrategyOutcome::Ok(batch) = bearer.try_fetch(request()).await else {
        panic!("bearer strategy should succeed");
    };
    let items = bearer.normalize(&batch);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].created_at(), batch.fetched_at);
}
