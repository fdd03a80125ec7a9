//! Startup configuration.
//!
//! | Variable | Fallback | Meaning |
//! |----------|----------|---------|
//! | `CHIRPFETCH_BEARER_TOKEN` | `TWITTER_BEARER_TOKEN` | credential for `bearer_api` |
//! | `CHIRPFETCH_GUEST_BEARER_TOKEN` | none | web-client credential for `guest_token` |
//! | `CHIRPFETCH_STATE_FILE` | `twitter_rate_limits.json` | persisted rate-limit state |
//! | `CHIRPFETCH_BUDGET_CEILING` | `250` | admissions per window |
//! | `CHIRPFETCH_MIRROR_HOSTS` | built-in list | comma-separated mirror hosts |
//! | `CHIRPFETCH_CACHE_FILE` | none (cache off) | response cache file |
//! | `CHIRPFETCH_CACHE_TTL_SECS` | `86400` | response cache lifetime |
//!
//! No credential is compiled in. Strategies whose credential is missing are
//! left out of the default chain; naming one explicitly is a startup error.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::http_client::HttpClient;
use crate::rate_limit::{DEFAULT_BUDGET_CEILING, DEFAULT_STATE_FILE};
use crate::strategies::{
    BearerApiStrategy, GuestSearchStrategy, MirrorScrapeStrategy, OfflineGeneratorStrategy,
    SyndicationStrategy, DEFAULT_MIRROR_HOSTS,
};
use crate::strategy::{Strategy, StrategyId};
use crate::ConfigError;

pub const BEARER_TOKEN_VAR: &str = "CHIRPFETCH_BEARER_TOKEN";
pub const LEGACY_BEARER_TOKEN_VAR: &str = "TWITTER_BEARER_TOKEN";
pub const GUEST_BEARER_TOKEN_VAR: &str = "CHIRPFETCH_GUEST_BEARER_TOKEN";
pub const STATE_FILE_VAR: &str = "CHIRPFETCH_STATE_FILE";
pub const BUDGET_CEILING_VAR: &str = "CHIRPFETCH_BUDGET_CEILING";
pub const MIRROR_HOSTS_VAR: &str = "CHIRPFETCH_MIRROR_HOSTS";
pub const CACHE_FILE_VAR: &str = "CHIRPFETCH_CACHE_FILE";
pub const CACHE_TTL_VAR: &str = "CHIRPFETCH_CACHE_TTL_SECS";

#[derive(Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub bearer_token: Option<String>,
    pub guest_bearer_token: Option<String>,
    pub state_file: PathBuf,
    pub budget_ceiling: u32,
    pub mirror_hosts: Vec<String>,
    /// Explicit ordered chain. `None` selects every strategy whose
    /// credential is present, in default priority order.
    pub strategies: Option<Vec<StrategyId>>,
    pub include_offline: bool,
    /// Response cache location; `None` disables caching.
    pub cache_file: Option<PathBuf>,
    pub cache_ttl: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            guest_bearer_token: None,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            budget_ceiling: DEFAULT_BUDGET_CEILING,
            mirror_hosts: DEFAULT_MIRROR_HOSTS.iter().map(|host| (*host).to_owned()).collect(),
            strategies: None,
            include_offline: true,
            cache_file: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl AcquisitionConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self {
            bearer_token: read(BEARER_TOKEN_VAR).or_else(|| read(LEGACY_BEARER_TOKEN_VAR)),
            guest_bearer_token: read(GUEST_BEARER_TOKEN_VAR),
            ..Self::default()
        };

        if let Some(path) = read(STATE_FILE_VAR) {
            config.state_file = PathBuf::from(path);
        }
        if let Some(raw) = read(BUDGET_CEILING_VAR) {
            config.budget_ceiling = raw.parse().map_err(|_| ConfigError::InvalidValue {
                variable: BUDGET_CEILING_VAR,
                value: raw.clone(),
            })?;
        }
        if let Some(path) = read(CACHE_FILE_VAR) {
            config.cache_file = Some(PathBuf::from(path));
        }
        if let Some(raw) = read(CACHE_TTL_VAR) {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                variable: CACHE_TTL_VAR,
                value: raw.clone(),
            })?;
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(raw) = read(MIRROR_HOSTS_VAR) {
            config.mirror_hosts = raw
                .split(',')
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .map(str::to_owned)
                .collect();
        }

        Ok(config)
    }

    pub fn with_strategies(mut self, strategies: Vec<StrategyId>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn with_offline(mut self, include_offline: bool) -> Self {
        self.include_offline = include_offline;
        self
    }

    pub fn with_state_file(mut self, state_file: impl Into<PathBuf>) -> Self {
        self.state_file = state_file.into();
        self
    }

    pub fn with_cache_file(mut self, cache_file: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(cache_file.into());
        self
    }

    fn credential_present(&self, id: StrategyId) -> bool {
        let present = |token: &Option<String>| token.as_deref().is_some_and(|t| !t.trim().is_empty());
        match id {
            StrategyId::BearerApi => present(&self.bearer_token),
            StrategyId::GuestToken => present(&self.guest_bearer_token),
            _ => true,
        }
    }

    /// Strategies to run, in trial order.
    pub fn strategy_chain(&self) -> Vec<StrategyId> {
        let mut chain: Vec<StrategyId> = match &self.strategies {
            Some(explicit) => {
                let mut seen = Vec::with_capacity(explicit.len());
                for id in explicit {
                    if !seen.contains(id) {
                        seen.push(*id);
                    }
                }
                seen
            }
            None => {
                let mut defaults: Vec<StrategyId> = StrategyId::ALL
                    .into_iter()
                    .filter(|id| self.credential_present(*id))
                    .collect();
                defaults.sort_by_key(|id| id.default_priority());
                defaults
            }
        };
        if !self.include_offline {
            chain.retain(|id| *id != StrategyId::OfflineGenerator);
        }
        chain
    }

    /// Startup checks; run before the first acquisition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget_ceiling == 0 {
            return Err(ConfigError::ZeroBudgetCeiling);
        }

        let chain = self.strategy_chain();
        if chain.is_empty() {
            return Err(ConfigError::EmptyChain);
        }
        if self.strategies.is_some() {
            for id in &chain {
                if !self.credential_present(*id) {
                    return Err(ConfigError::MissingCredential {
                        strategy: id.as_str(),
                        variable: credential_variable(*id),
                    });
                }
            }
        }
        if chain.contains(&StrategyId::NitterScraping) && self.mirror_hosts.is_empty() {
            return Err(ConfigError::EmptyMirrorHosts);
        }
        Ok(())
    }

    /// Validates and instantiates the chain. An explicit chain is tried in
    /// the order given; the default chain keeps default priorities.
    pub fn build_strategies(
        &self,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Vec<Arc<dyn Strategy>>, ConfigError> {
        self.validate()?;
        let explicit = self.strategies.is_some();

        self.strategy_chain()
            .into_iter()
            .enumerate()
            .map(|(position, id)| {
                let priority = if explicit {
                    u16::try_from((position + 1) * 10).unwrap_or(u16::MAX)
                } else {
                    id.default_priority()
                };
                self.build_strategy(id, priority, Arc::clone(&http_client))
            })
            .collect()
    }

    fn build_strategy(
        &self,
        id: StrategyId,
        priority: u16,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Arc<dyn Strategy>, ConfigError> {
        let missing = || ConfigError::MissingCredential {
            strategy: id.as_str(),
            variable: credential_variable(id),
        };

        let strategy: Arc<dyn Strategy> = match id {
            StrategyId::BearerApi => {
                let token = self.bearer_token.clone().ok_or_else(missing)?;
                let strategy = BearerApiStrategy::new(http_client, token);
                let descriptor = strategy.descriptor().clone().with_priority(priority);
                Arc::new(strategy.with_descriptor(descriptor))
            }
            StrategyId::SyndicationApi => {
                let strategy = SyndicationStrategy::new(http_client);
                let descriptor = strategy.descriptor().clone().with_priority(priority);
                Arc::new(strategy.with_descriptor(descriptor))
            }
            StrategyId::GuestToken => {
                let token = self.guest_bearer_token.clone().ok_or_else(missing)?;
                let strategy = GuestSearchStrategy::new(http_client, token);
                let descriptor = strategy.descriptor().clone().with_priority(priority);
                Arc::new(strategy.with_descriptor(descriptor))
            }
            StrategyId::NitterScraping => {
                let strategy = MirrorScrapeStrategy::new(http_client).with_hosts(self.mirror_hosts.clone());
                let descriptor = strategy.descriptor().clone().with_priority(priority);
                Arc::new(strategy.with_descriptor(descriptor))
            }
            StrategyId::OfflineGenerator => {
                let strategy = OfflineGeneratorStrategy::new();
                let descriptor = strategy.descriptor().clone().with_priority(priority);
                Arc::new(strategy.with_descriptor(descriptor))
            }
        };
        Ok(strategy)
    }
}

fn credential_variable(id: StrategyId) -> &'static str {
    match id {
        StrategyId::GuestToken => GUEST_BEARER_TOKEN_VAR,
        _ => BEARER_TOKEN_VAR,
    }
}

// Credentials must never reach logs.
impl std::fmt::Debug for AcquisitionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionConfig")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("guest_bearer_token", &self.guest_bearer_token.as_ref().map(|_| "<redacted>"))
            .field("state_file", &self.state_file)
            .field("budget_ceiling", &self.budget_ceiling)
            .field("mirror_hosts", &self.mirror_hosts)
            .field("strategies", &self.strategies)
            .field("include_offline", &self.include_offline)
            .field("cache_file", &self.cache_file)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}
