use serde::Serialize;

use mktdata_core::{CircuitState, MarketDataRouter, MarketKind, Operation, ProviderId};

use crate::cli::SourcesArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct RouteRow {
    market: MarketKind,
    operation: Operation,
    priority: u8,
    provider: ProviderId,
    name: String,
    base_url: String,
    rate_limit_per_minute: u32,
    requires_api_key: bool,
    registered: bool,
    circuit: CircuitState,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    routes: Vec<RouteRow>,
}

pub fn run(args: &SourcesArgs, router: &MarketDataRouter) -> Result<CommandResult, CliError> {
    let markets = match args.market {
        Some(market) => vec![market],
        None => MarketKind::ALL.to_vec(),
    };

    let mut routes = Vec::new();
    for market in markets {
        for operation in Operation::ALL {
            for entry in router.route_plan(market, operation) {
                routes.push(RouteRow {
                    market,
                    operation,
                    priority: entry.spec.priority,
                    provider: entry.spec.id,
                    name: entry.spec.name,
                    base_url: entry.spec.base_url,
                    rate_limit_per_minute: entry.spec.rate_limit_per_minute,
                    requires_api_key: entry.spec.requires_api_key,
                    registered: entry.registered,
                    circuit: entry.circuit,
                });
            }
        }
    }

    let data = serde_json::to_value(SourcesResponseData { routes })?;
    Ok(CommandResult::ok(data))
}
