use std::time::Instant;

use serde::Serialize;

use mktdata_core::{MarketDataRouter, Quote};

use crate::cli::QuotesArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct QuotesResponseData {
    requested: usize,
    returned: usize,
    quotes: Vec<Quote>,
}

pub async fn run(args: &QuotesArgs, router: &MarketDataRouter) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let quotes = router
        .get_quotes_batch(&args.symbols, args.market, args.limit)
        .await?;

    let requested = args.symbols.len().min(args.limit);
    if quotes.len() < requested {
        tracing::info!(
            requested,
            returned = quotes.len(),
            "some symbols had no real quote and were left out"
        );
    }

    let data = serde_json::to_value(QuotesResponseData {
        requested,
        returned: quotes.len(),
        quotes,
    })?;
    let latency_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
    Ok(CommandResult::ok(data).with_latency(latency_ms))
}
