use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Item text must be strictly longer than this many characters after trimming.
pub const MIN_TEXT_LEN_EXCLUSIVE: usize = 10;

/// Engagement counters. Unknown counters default to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetrics {
    #[serde(rename = "retweet_count")]
    pub repost_count: u64,
    pub like_count: u64,
    pub reply_count: u64,
    pub quote_count: u64,
}

impl ItemMetrics {
    pub const fn new(repost_count: u64, like_count: u64, reply_count: u64, quote_count: u64) -> Self {
        Self {
            repost_count,
            like_count,
            reply_count,
            quote_count,
        }
    }
}

/// Common post representation every strategy produces.
///
/// Fields are private; an item is immutable once it has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    id: String,
    text: String,
    created_at: UtcDateTime,
    #[serde(flatten)]
    metrics: ItemMetrics,
    #[serde(rename = "url")]
    source_url: String,
}

impl NormalizedItem {
    /// Builds a validated item. Text is stored trimmed.
    pub fn new(
        id: impl Into<String>,
        text: impl AsRef<str>,
        created_at: UtcDateTime,
        metrics: ItemMetrics,
        source_url: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyItemId);
        }

        let text = validate_text(text.as_ref())?;

        Ok(Self {
            id,
            text,
            created_at,
            metrics,
            source_url: source_url.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn created_at(&self) -> UtcDateTime {
        self.created_at
    }

    pub const fn metrics(&self) -> ItemMetrics {
        self.metrics
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }
}

/// Applies the text-length rule and returns the trimmed text.
pub fn validate_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if len <= MIN_TEXT_LEN_EXCLUSIVE {
        return Err(ValidationError::ItemTextTooShort {
            len,
            min: MIN_TEXT_LEN_EXCLUSIVE,
        });
    }
    Ok(trimmed.to_owned())
}
