use thiserror::Error;

/// Validation and contract errors exposed by `chirpfetch-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("handle cannot be empty")]
    EmptyHandle,
    #[error("handle length {len} exceeds max {max}")]
    HandleTooLong { len: usize, max: usize },
    #[error("handle contains invalid character '{ch}' at index {index}")]
    HandleInvalidChar { ch: char, index: usize },

    #[error("max count must be greater than zero")]
    ZeroMaxCount,

    #[error("item text must be longer than {min} characters after trimming (got {len})")]
    ItemTextTooShort { len: usize, min: usize },
    #[error("item id cannot be empty")]
    EmptyItemId,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unrecognized timestamp format: '{value}'")]
    UnrecognizedTimestamp { value: String },

    #[error("invalid strategy '{value}', expected one of bearer_api, syndication_api, guest_token, nitter_scraping, offline_generator")]
    InvalidStrategy { value: String },
}

/// Startup configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("strategy '{strategy}' requires {variable} to be set")]
    MissingCredential {
        strategy: &'static str,
        variable: &'static str,
    },
    #[error("budget ceiling must be greater than zero")]
    ZeroBudgetCeiling,
    #[error("invalid value for {variable}: '{value}'")]
    InvalidValue { variable: &'static str, value: String },
    #[error("strategy chain is empty")]
    EmptyChain,
    #[error("mirror host list is empty")]
    EmptyMirrorHosts,
    #[error("no response cache configured; pass --cache-file or set CHIRPFETCH_CACHE_FILE")]
    CacheNotConfigured,
}
