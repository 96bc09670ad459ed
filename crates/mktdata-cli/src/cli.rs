//! CLI argument definitions for mktdata.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `history` | Daily OHLCV bars with buy/sell volume |
//! | `quote` | Latest quote for one symbol |
//! | `quotes` | Latest quotes for many symbols |
//! | `sources` | Provider chains per market |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--config` | - | JSON pipeline config (otherwise `MKTDATA_*` env) |
//! | `--log-level` | `warn` | Log filter, `RUST_LOG` syntax |
//! | `--log-format` | `compact` | Log format (pretty, compact, json) |
//!
//! # Examples
//!
//! ```bash
//! mktdata history AAPL --market us --days 30
//! mktdata quote 600519 --market cn --currency USD --format table
//! mktdata quotes BTC ETH SOL --market crypto --pretty
//! mktdata sources --market hk
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mktdata_core::MarketKind;

use crate::logging::LogFormat;

/// Multi-source market data for crypto, US, Hong Kong and China A-share listings.
#[derive(Debug, Parser)]
#[command(
    name = "mktdata",
    author,
    version,
    about = "Multi-source market data CLI",
    long_about = "mktdata fetches daily bars and quotes through an ordered chain of \
providers per market, with caching, validation and a synthetic fallback.\n\
\n\
Results backed by synthetic data exit with code 3."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// JSON pipeline configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter such as `debug` or `mktdata_core=trace`. Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log line format (logs go to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Plain column table for terminal display.
    Table,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch daily bars for the last N sessions.
    ///
    /// # Examples
    ///
    ///   mktdata history AAPL --market us --days 30
    ///   mktdata history BTC --market crypto --refresh
    History(HistoryArgs),

    /// Fetch the latest quote for one symbol.
    Quote(QuoteArgs),

    /// Fetch quotes for several symbols; failures are left out.
    Quotes(QuotesArgs),

    /// Show the provider chain per market and operation.
    Sources(SourcesArgs),
}

/// Arguments for the `history` command.
#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Instrument symbol (e.g. AAPL, BTC, 0700.HK, 600519).
    pub symbol: String,

    /// Market: crypto, us, hk or cn.
    #[arg(long, default_value = "us_equity")]
    pub market: MarketKind,

    /// Number of daily sessions.
    #[arg(long, default_value_t = 30)]
    pub days: u32,

    /// Skip the cache read and store the fresh result.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Re-price OHLC into this currency.
    #[arg(long)]
    pub currency: Option<String>,
}

/// Arguments for the `quote` command.
#[derive(Debug, Args)]
pub struct QuoteArgs {
    pub symbol: String,

    #[arg(long, default_value = "us_equity")]
    pub market: MarketKind,

    /// Skip the cache read and store the fresh result.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Re-price the quote into this currency.
    #[arg(long)]
    pub currency: Option<String>,
}

/// Arguments for the `quotes` command.
#[derive(Debug, Args)]
pub struct QuotesArgs {
    /// One or more symbols of the same market.
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    #[arg(long, default_value = "us_equity")]
    pub market: MarketKind,

    /// Maximum number of symbols processed (at most 500).
    #[arg(long, default_value_t = 500)]
    pub limit: usize,
}

/// Arguments for the `sources` command.
#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Only this market; all markets when omitted.
    #[arg(long)]
    pub market: Option<MarketKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_history_with_market_alias() {
        let cli = Cli::parse_from([
            "mktdata", "history", "600519", "--market", "cn", "--days", "60", "--refresh",
        ]);
        match cli.command {
            Command::History(args) => {
                assert_eq!(args.market, MarketKind::CnEquity);
                assert_eq!(args.days, 60);
                assert!(args.refresh);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from([
            "mktdata", "quote", "BTC", "--market", "crypto", "--format", "table", "--log-format", "json",
        ]);
        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn unknown_market_is_rejected() {
        let result = Cli::try_parse_from(["mktdata", "quote", "EURUSD", "--market", "forex"]);
        assert!(result.is_err());
    }
}
