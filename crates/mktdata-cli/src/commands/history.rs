use serde::Serialize;

use mktdata_core::{CacheMode, MarketDataRouter, Series};

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct HistoryResponseData<'a> {
    currency: String,
    #[serde(flatten)]
    series: &'a Series,
}

pub async fn run(args: &HistoryArgs, router: &MarketDataRouter) -> Result<CommandResult, CliError> {
    let mode = if args.refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    };
    let resolved = router
        .resolve_history(&args.symbol, args.market, args.days, mode)
        .await?;

    let data = match &args.currency {
        Some(currency) => {
            let converted = router
                .converter()
                .convert_series(&resolved.data, currency)
                .await?;
            serde_json::to_value(HistoryResponseData {
                currency: currency.to_ascii_uppercase(),
                series: &converted,
            })?
        }
        None => serde_json::to_value(HistoryResponseData {
            currency: args.market.currency().to_owned(),
            series: &resolved.data,
        })?,
    };

    Ok(CommandResult::resolved(data, &resolved))
}
