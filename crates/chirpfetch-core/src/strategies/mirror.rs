use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use serde_json::{json, Value};

use super::{json_count, transport_failure};
use crate::http_client::{HttpClient, HttpRequest, BROWSER_USER_AGENT};
use crate::mirror_health::MirrorHealth;
use crate::strategy::{
    normalize_each, FetchRequest, RawBatch, Strategy, StrategyDescriptor, StrategyFuture,
    StrategyId, StrategyOutcome,
};
use crate::{validate_text, ItemMetrics, NormalizedItem, ValidationError};

pub const DEFAULT_MIRROR_HOSTS: [&str; 5] = [
    "nitter.poast.org",
    "nitter.privacydev.net",
    "nitter.cz",
    "nitter.ktachibana.party",
    "nitter.fdn.fr",
];

const PER_HOST_TIMEOUT: Duration = Duration::from_secs(10);
/// Error and captcha pages are small; a real profile page is not.
const MIN_PAGE_BYTES: usize = 5000;

/// Scrapes mirrored-frontend profile pages, one host at a time, until a
/// host yields posts.
pub struct MirrorScrapeStrategy {
    descriptor: StrategyDescriptor,
    http_client: Arc<dyn HttpClient>,
    hosts: Vec<String>,
    health: Arc<MirrorHealth>,
}

impl MirrorScrapeStrategy {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        let id = StrategyId::NitterScraping;
        Self {
            descriptor: StrategyDescriptor::network(
                id.as_str(),
                id.default_priority(),
                Duration::from_secs(60),
            ),
            http_client,
            hosts: DEFAULT_MIRROR_HOSTS.iter().map(|host| (*host).to_owned()).collect(),
            health: Arc::new(MirrorHealth::default()),
        }
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_health(mut self, health: Arc<MirrorHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn with_descriptor(mut self, descriptor: StrategyDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

fn profile_url(host: &str, handle: &str) -> String {
    if host.contains("://") {
        format!("{}/{handle}", host.trim_end_matches('/'))
    } else {
        format!("https://{host}/{handle}")
    }
}

/// Post texts from `.tweet-content` elements in page order, without
/// reposts or texts that would fail validation.
fn extract_posts(page: &str, limit: usize) -> Vec<String> {
    let Ok(content) = Selector::parse(".tweet-content") else {
        return Vec::new();
    };
    let document = Html::parse_document(page);

    document
        .select(&content)
        .map(|element| element.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.starts_with("RT @"))
        .filter(|text| validate_text(text).is_ok())
        .take(limit)
        .collect()
}

#[derive(Debug, Default)]
struct HostTally {
    tried: usize,
    quota: usize,
    empty: usize,
    reasons: Vec<String>,
}

impl Strategy for MirrorScrapeStrategy {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    fn try_fetch<'a>(&'a self, req: FetchRequest) -> StrategyFuture<'a> {
        Box::pin(async move {
            let fetched_at = crate::UtcDateTime::now();
            let mut tally = HostTally::default();

            for host in &self.hosts {
                if !self.health.should_try(host) {
                    tracing::debug!(%host, "mirror host cooling down; skipped");
                    tally.reasons.push(format!("{host}: cooling down"));
                    continue;
                }
                tally.tried += 1;

                let request = HttpRequest::get(profile_url(host, req.handle.as_str()))
                    .with_header("user-agent", BROWSER_USER_AGENT)
                    .with_header("accept", "text/html,application/xhtml+xml")
                    .with_timeout_ms(req.http_timeout_ms(PER_HOST_TIMEOUT));

                let response = match self.http_client.execute(request).await {
                    Ok(response) => response,
                    Err(error) => {
                        self.health.record_failure(host);
                        if let StrategyOutcome::Unavailable(reason) = transport_failure("page fetch", &error) {
                            tally.reasons.push(format!("{host}: {reason}"));
                        }
                        continue;
                    }
                };

                if response.is_quota_exhausted() {
                    tally.quota += 1;
                    tally.reasons.push(format!("{host}: status 429"));
                    continue;
                }
                if response.status != 200 || response.body.len() <= MIN_PAGE_BYTES {
                    self.health.record_failure(host);
                    tally.reasons.push(format!(
                        "{host}: status {} with {} bytes",
                        response.status,
                        response.body.len()
                    ));
                    continue;
                }

                self.health.record_success(host);
                let posts = extract_posts(&response.body, req.max_count);
                if posts.is_empty() {
                    tally.empty += 1;
                    tally.reasons.push(format!("{host}: no posts on page"));
                    continue;
                }

                tracing::debug!(%host, posts = posts.len(), "mirror host served posts");
                let items = posts
                    .into_iter()
                    .enumerate()
                    .map(|(index, text)| json!({"host": host, "index": index, "text": text}))
                    .collect();
                return StrategyOutcome::from_items(req.handle, fetched_at, items);
            }

            if tally.tried == 0 {
                return StrategyOutcome::unavailable("every mirror host is cooling down");
            }
            if tally.quota == tally.tried {
                return StrategyOutcome::QuotaExhausted;
            }
            if tally.empty == tally.tried {
                return StrategyOutcome::Empty;
            }
            StrategyOutcome::Unavailable(tally.reasons.join("; "))
        })
    }

    fn normalize(&self, raw: &RawBatch) -> Vec<NormalizedItem> {
        let handle = raw.handle.as_str();
        normalize_each(raw, |value| {
            let host = value.get("host").and_then(Value::as_str).unwrap_or_default();
            if host.is_empty() {
                return Err(ValidationError::EmptyItemId);
            }
            let id = format!("nitter_{host}_{}", json_count(value, "index"));
            let text = value.get("text").and_then(Value::as_str).unwrap_or_default();

            NormalizedItem::new(
                id,
                text,
                raw.fetched_at,
                ItemMetrics::default(),
                format!("https://twitter.com/{handle}/status/unknown"),
            )
        })
    }
}

impl std::fmt::Debug for MirrorScrapeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorScrapeStrategy")
            .field("descriptor", &self.descriptor)
            .field("hosts", &self.hosts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::mirror_health::MirrorHealthConfig;
    use crate::strategies::test_support::ScriptedHttpClient;
    use crate::Handle;
    use tokio::time::Instant;

    fn request() -> FetchRequest {
        FetchRequest::new(
            Handle::parse("example").expect("valid handle"),
            10,
            Instant::now() + Duration::from_secs(60),
        )
        .expect("valid request")
    }

    fn profile_page(posts: &[&str]) -> String {
        let mut page = String::from("<html><body><div class=\"timeline\">");
        for post in posts {
            page.push_str("<div class=\"timeline-item\"><div class=\"tweet-content media-body\">");
            page.push_str(post);
            page.push_str("</div></div>");
        }
        page.push_str("</div><div class=\"filler\">");
        page.push_str(&"x".repeat(MIN_PAGE_BYTES));
        page.push_str("</div></body></html>");
        page
    }

    fn strategy(client: Arc<ScriptedHttpClient>, hosts: &[&str]) -> MirrorScrapeStrategy {
        MirrorScrapeStrategy::new(client).with_hosts(hosts.iter().copied())
    }

    #[test]
    fn extraction_skips_reposts_and_short_texts() {
        let page = profile_page(&[
            "first   mirrored\n post text",
            "RT @someone: reposted content here",
            "tiny",
            "<a href=\"/x\">linked</a> words inside the post",
        ]);

        let posts = extract_posts(&page, 10);
        assert_eq!(
            posts,
            vec![
                String::from("first mirrored post text"),
                String::from("linked words inside the post"),
            ]
        );
    }

    #[tokio::test]
    async fn falls_through_failing_hosts_to_a_working_one() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Err(HttpError::new("connection refused")),
            Ok(HttpResponse::new(200, "<html>captcha</html>")),
            Ok(HttpResponse::new(200, profile_page(&["a post served by the third host"]))),
        ]));
        let strategy = strategy(client.clone(), &["a.test", "b.test", "c.test"]);

        let outcome = strategy.try_fetch(request()).await;
        let StrategyOutcome::Ok(batch) = outcome else {
            panic!("expected ok outcome, got {outcome:?}");
        };
        let items = strategy.normalize(&batch);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id(), "nitter_c.test_0");
        assert_eq!(items[0].source_url(), "https://twitter.com/example/status/unknown");

        let urls: Vec<String> = client.recorded_requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec!["https://a.test/example", "https://b.test/example", "https://c.test/example"]
        );
    }

    #[tokio::test]
    async fn exhausts_every_host_before_reporting_unavailable() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(502, "")),
            Ok(HttpResponse::new(503, "")),
        ]));
        let outcome = strategy(client.clone(), &["a.test", "b.test"]).try_fetch(request()).await;

        assert_eq!(client.recorded_requests().len(), 2);
        let StrategyOutcome::Unavailable(reason) = outcome else {
            panic!("expected unavailable outcome, got {outcome:?}");
        };
        assert!(reason.contains("a.test: status 502"));
        assert!(reason.contains("b.test: status 503"));
    }

    #[tokio::test]
    async fn quota_rejection_from_every_host_is_quota_exhausted() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
        ]));
        let outcome = strategy(client, &["a.test", "b.test"]).try_fetch(request()).await;
        assert_eq!(outcome, StrategyOutcome::QuotaExhausted);
    }

    #[tokio::test]
    async fn benched_host_is_skipped() {
        let health = Arc::new(MirrorHealth::new(MirrorHealthConfig {
            failure_threshold: 1,
            cool_down: Duration::from_secs(300),
        }));
        health.record_failure("a.test");
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::new(
            200,
            profile_page(&["served by the healthy host"]),
        ))]));
        let strategy = strategy(client.clone(), &["a.test", "b.test"]).with_health(health);

        assert!(matches!(strategy.try_fetch(request()).await, StrategyOutcome::Ok(_)));
        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://b.test/example");
    }

    #[tokio::test]
    async fn pages_without_posts_are_empty() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::new(200, profile_page(&[])))]));
        let outcome = strategy(client, &["a.test"]).try_fetch(request()).await;
        assert_eq!(outcome, StrategyOutcome::Empty);
    }
}
