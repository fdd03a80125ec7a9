//! CLI argument definitions for chirpfetch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Acquire recent posts for a handle |
//! | `status` | Show the persisted rate budget |
//! | `strategies` | List the configured strategy chain |
//! | `clear-cache` | Remove the response cache file |
//!
//! # Examples
//!
//! ```bash
//! chirpfetch fetch @example 20 --pretty
//! chirpfetch fetch example --strategies syndication_api,nitter_scraping --no-offline
//! chirpfetch status --state-file /tmp/limits.json
//! chirpfetch fetch example 1 --cache-file posts-cache.json --refresh
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use chirpfetch_core::StrategyId;

#[derive(Debug, Parser)]
#[command(
    name = "chirpfetch",
    version,
    about = "Fetch recent posts for an account through a chain of fallback strategies"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log debug output to stderr (overrides CHIRPFETCH_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Rate-limit state file (overrides CHIRPFETCH_STATE_FILE).
    #[arg(long, global = true, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Response cache file (overrides CHIRPFETCH_CACHE_FILE).
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire recent posts for a handle.
    Fetch(FetchArgs),
    /// Show the persisted rate budget.
    Status,
    /// List the configured strategy chain in trial order.
    Strategies(ChainArgs),
    /// Remove the response cache file.
    ClearCache,
}

#[derive(Debug, Clone, Args)]
pub struct ChainArgs {
    /// Ordered, comma-separated strategy chain.
    #[arg(long, value_delimiter = ',', value_parser = parse_strategy)]
    pub strategies: Vec<StrategyId>,

    /// Never fall back to generated content.
    #[arg(long, default_value_t = false)]
    pub no_offline: bool,
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    /// Account handle, with or without a leading '@'.
    pub handle: String,

    /// Maximum number of posts to return.
    #[arg(default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_count: u64,

    /// Abandon the acquisition after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub deadline_secs: Option<u64>,

    /// Ignore cached posts but store the fresh result.
    #[arg(long, default_value_t = false, conflicts_with = "no_cache")]
    pub refresh: bool,

    /// Neither read nor write the response cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    #[command(flatten)]
    pub chain: ChainArgs,
}

fn parse_strategy(raw: &str) -> Result<StrategyId, String> {
    raw.parse::<StrategyId>().map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_defaults_to_fifty_posts() {
        let cli = Cli::try_parse_from(["chirpfetch", "fetch", "@Example"]).expect("valid args");
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch command");
        };
        assert_eq!(args.handle, "@Example");
        assert_eq!(args.max_count, 50);
        assert!(args.chain.strategies.is_empty());
        assert!(!args.chain.no_offline);
    }

    #[test]
    fn strategies_flag_parses_an_ordered_list() {
        let cli = Cli::try_parse_from([
            "chirpfetch",
            "fetch",
            "example",
            "5",
            "--strategies",
            "nitter_scraping,syndication_api",
            "--no-offline",
            "--pretty",
        ])
        .expect("valid args");
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch command");
        };
        assert_eq!(args.max_count, 5);
        assert_eq!(
            args.chain.strategies,
            vec![StrategyId::NitterScraping, StrategyId::SyndicationApi]
        );
        assert!(args.chain.no_offline);
        assert!(cli.pretty);
    }

    #[test]
    fn cache_flags_parse_and_conflict() {
        let cli = Cli::try_parse_from([
            "chirpfetch",
            "fetch",
            "example",
            "--cache-file",
            "cache.json",
            "--refresh",
        ])
        .expect("valid args");
        assert_eq!(cli.cache_file, Some(PathBuf::from("cache.json")));
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch command");
        };
        assert!(args.refresh);
        assert!(!args.no_cache);

        assert!(Cli::try_parse_from(["chirpfetch", "fetch", "example", "--refresh", "--no-cache"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["chirpfetch", "clear-cache"]).expect("valid args").command,
            Command::ClearCache
        ));
    }

    #[test]
    fn zero_max_count_and_unknown_strategy_are_usage_errors() {
        assert!(Cli::try_parse_from(["chirpfetch", "fetch", "example", "0"]).is_err());
        assert!(Cli::try_parse_from(["chirpfetch", "fetch", "example", "--strategies", "fax"]).is_err());
        assert!(Cli::try_parse_from(["chirpfetch", "fetch"]).is_err());
    }
}
