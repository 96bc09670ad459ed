use serde::Serialize;

use mktdata_core::{CacheMode, MarketDataRouter, Quote};

use crate::cli::QuoteArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct QuoteResponseData {
    currency: String,
    quote: Quote,
}

pub async fn run(args: &QuoteArgs, router: &MarketDataRouter) -> Result<CommandResult, CliError> {
    let mode = if args.refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    };
    let resolved = router.resolve_quote(&args.symbol, args.market, mode).await?;

    let (currency, quote) = match &args.currency {
        Some(currency) => (
            currency.to_ascii_uppercase(),
            router.converter().convert_quote(&resolved.data, currency).await?,
        ),
        None => (args.market.currency().to_owned(), resolved.data.clone()),
    };

    let data = serde_json::to_value(QuoteResponseData { currency, quote })?;
    Ok(CommandResult::resolved(data, &resolved))
}
