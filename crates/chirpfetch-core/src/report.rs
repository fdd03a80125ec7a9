use serde::Serialize;

use crate::orchestrator::{AcquisitionErrorKind, AcquisitionResult, StrategyFailure};
use crate::strategy::StrategyId;
use crate::NormalizedItem;

/// `source` reported when admission was denied.
pub const SOURCE_RATE_LIMITED: &str = "rate_limit_prevented";
/// `source` reported for every other failure.
pub const SOURCE_FAILED: &str = "failed";

/// Machine-readable JSON object printed by the invocation surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionReport {
    pub success: bool,
    pub tweets: Vec<NormalizedItem>,
    pub username: String,
    pub count: usize,
    pub source: String,
    /// Machine code, e.g. `"AllStrategiesExhausted"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AcquisitionErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<StrategyFailure>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

impl AcquisitionReport {
    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

fn success_note(handle: &str, source: &str, cached: bool) -> String {
    if cached {
        format!("Cached tweets from @{handle} via {source}")
    } else if source == StrategyId::OfflineGenerator.as_str() {
        format!("Generated sample content for @{handle}; no live posts could be fetched")
    } else {
        format!("Real tweets from @{handle} via {source}")
    }
}

impl From<AcquisitionResult> for AcquisitionReport {
    fn from(result: AcquisitionResult) -> Self {
        let source = match (&result.source, result.error) {
            (Some(source), _) if result.success => source.clone(),
            (_, Some(AcquisitionErrorKind::RateLimited)) => String::from(SOURCE_RATE_LIMITED),
            _ => String::from(SOURCE_FAILED),
        };
        let note = result
            .success
            .then(|| success_note(&result.handle, &source, result.cached));
        // Round up so a caller that waits the reported time is admitted.
        let retry_after_secs = result
            .retry_after
            .map(|wait| wait.as_secs() + u64::from(wait.subsec_nanos() > 0));

        Self {
            success: result.success,
            count: result.items.len(),
            tweets: result.items,
            username: result.handle,
            source,
            error: result.error,
            detail: result.detail,
            note,
            retry_after_secs,
            failures: result.failures,
            cached: result.cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ItemMetrics, UtcDateTime};
    use std::time::Duration;

    fn item() -> NormalizedItem {
        NormalizedItem::new(
            "1",
            "a reportable post body",
            UtcDateTime::parse("2024-05-01T00:00:00Z").expect("valid timestamp"),
            ItemMetrics::new(1, 2, 3, 4),
            "https://twitter.com/i/web/status/1",
        )
        .expect("valid item")
    }

    fn result(success: bool) -> AcquisitionResult {
        AcquisitionResult {
            success,
            items: Vec::new(),
            source: None,
            error: None,
            detail: None,
            handle: String::from("example"),
            failures: Vec::new(),
            retry_after: None,
            cached: false,
        }
    }

    #[test]
    fn success_report_carries_tweets_and_note() {
        let report = AcquisitionReport::from(AcquisitionResult {
            items: vec![item()],
            source: Some(String::from("syndication_api")),
            ..result(true)
        });
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json(false).expect("serializable")).expect("json");

        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 1);
        assert_eq!(json["username"], "example");
        assert_eq!(json["source"], "syndication_api");
        assert_eq!(json["note"], "Real tweets from @example via syndication_api");
        assert_eq!(json["tweets"][0]["retweet_count"], 1);
        assert_eq!(json["tweets"][0]["url"], "https://twitter.com/i/web/status/1");
        assert!(json.get("error").is_none());
        assert!(json.get("failures").is_none());
        assert!(json.get("cached").is_none());
    }

    #[test]
    fn cached_report_is_flagged_and_annotated() {
        let report = AcquisitionReport::from(AcquisitionResult {
            items: vec![item()],
            source: Some(String::from("bearer_api")),
            cached: true,
            ..result(true)
        });
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json(false).expect("serializable")).expect("json");

        assert_eq!(json["cached"], true);
        assert_eq!(json["source"], "bearer_api");
        assert_eq!(json["note"], "Cached tweets from @example via bearer_api");
    }

    #[test]
    fn rate_limited_report_uses_prevented_source_and_rounds_retry_up() {
        let report = AcquisitionReport::from(AcquisitionResult {
            error: Some(AcquisitionErrorKind::RateLimited),
            retry_after: Some(Duration::from_millis(799_250)),
            ..result(false)
        });

        assert_eq!(report.source, SOURCE_RATE_LIMITED);
        assert_eq!(report.retry_after_secs, Some(800));
        assert!(report.note.is_none());
    }

    #[test]
    fn exhausted_report_serializes_error_code_and_empty_tweets() {
        let report = AcquisitionReport::from(AcquisitionResult {
            error: Some(AcquisitionErrorKind::AllStrategiesExhausted),
            detail: Some(String::from("all 2 strategies failed for @example")),
            ..result(false)
        });
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json(true).expect("serializable")).expect("json");

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "AllStrategiesExhausted");
        assert_eq!(json["source"], "failed");
        assert_eq!(json["tweets"], serde_json::json!([]));
    }

    #[test]
    fn offline_success_is_flagged_as_generated() {
        let report = AcquisitionReport::from(AcquisitionResult {
            items: vec![item()],
            source: Some(String::from("offline_generator")),
            ..result(true)
        });
        assert!(report
            .note
            .as_deref()
            .is_some_and(|note| note.starts_with("Generated sample content")));
    }
}
