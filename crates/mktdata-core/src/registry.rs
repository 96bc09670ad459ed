use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;
use crate::{MarketKind, Operation, ProviderId};

/// Static description of one provider on one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub id: ProviderId,
    pub name: String,
    /// Lower is tried first.
    pub priority: u8,
    pub base_url: String,
    pub rate_limit_per_minute: u32,
    pub requires_api_key: bool,
}

impl ProviderSpec {
    pub fn new(id: ProviderId, priority: u8, settings: &ProviderSettings) -> Self {
        let (base_url, rate_limit_per_minute) = settings
            .endpoint(id)
            .map(|endpoint| (endpoint.base_url.clone(), endpoint.rate_limit_per_minute))
            .unwrap_or_default();
        Self {
            id,
            name: display_name(id).to_owned(),
            priority,
            base_url,
            rate_limit_per_minute,
            requires_api_key: id == ProviderId::Alphavantage,
        }
    }
}

fn display_name(id: ProviderId) -> &'static str {
    match id {
        ProviderId::Binance => "Binance",
        ProviderId::Yahoo => "Yahoo Finance",
        ProviderId::Alphavantage => "Alpha Vantage",
        ProviderId::Eastmoney => "Eastmoney",
        ProviderId::Sina => "Sina Finance",
        ProviderId::Fx => "Exchange rates",
        ProviderId::Mock => "Synthetic",
    }
}

/// Default fallback chains as `(provider, priority)`.
fn default_chain(market: MarketKind, operation: Operation) -> &'static [(ProviderId, u8)] {
    use MarketKind::*;
    use Operation::*;
    use ProviderId::*;

    match (market, operation) {
        (Crypto, History) => &[(Binance, 1), (Yahoo, 2)],
        (Crypto, Quote) => &[(Binance, 1), (Yahoo, 2)],
        (UsEquity, History) => &[(Yahoo, 1), (Alphavantage, 2)],
        (UsEquity, Quote) => &[(Yahoo, 1), (Alphavantage, 2)],
        (HkEquity, History) => &[(Yahoo, 1), (Eastmoney, 2)],
        (HkEquity, Quote) => &[(Eastmoney, 1), (Yahoo, 2)],
        (CnEquity, History) => &[(Eastmoney, 1), (Yahoo, 2)],
        (CnEquity, Quote) => &[(Sina, 1), (Eastmoney, 2), (Yahoo, 3)],
    }
}

/// Ordered provider chain for every `(market, operation)` pair.
///
/// Built once and never mutated. Chains are ordered by ascending priority;
/// equal priorities keep declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<(MarketKind, Operation), Vec<ProviderSpec>>,
}

impl RouteTable {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let mut builder = RouteTableBuilder::default();
        for market in MarketKind::ALL {
            for operation in Operation::ALL {
                for (id, priority) in default_chain(market, operation) {
                    builder = builder.route(market, operation, ProviderSpec::new(*id, *priority, settings));
                }
            }
        }
        builder.build()
    }

    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    pub fn chain(&self, market: MarketKind, operation: Operation) -> &[ProviderSpec] {
        self.routes
            .get(&(market, operation))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every provider referenced by any route, in id order.
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self
            .routes
            .values()
            .flat_map(|chain| chain.iter().map(|spec| spec.id))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::from_settings(&ProviderSettings::default())
    }
}

/// Builder for custom route tables.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: BTreeMap<(MarketKind, Operation), Vec<ProviderSpec>>,
}

impl RouteTableBuilder {
    /// Appends `spec` to the chain of `(market, operation)`.
    pub fn route(mut self, market: MarketKind, operation: Operation, spec: ProviderSpec) -> Self {
        self.routes.entry((market, operation)).or_default().push(spec);
        self
    }

    pub fn build(mut self) -> RouteTable {
        for chain in self.routes.values_mut() {
            chain.sort_by_key(|spec| spec.priority);
        }
        RouteTable {
            routes: self.routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_market_operation_has_a_chain() {
        let table = RouteTable::default();
        for market in MarketKind::ALL {
            for operation in Operation::ALL {
                assert!(!table.chain(market, operation).is_empty());
            }
        }
    }

    #[test]
    fn cn_quote_chain_order() {
        let table = RouteTable::default();
        let ids: Vec<ProviderId> = table
            .chain(MarketKind::CnEquity, Operation::Quote)
            .iter()
            .map(|spec| spec.id)
            .collect();
        assert_eq!(
            ids,
            vec![ProviderId::Sina, ProviderId::Eastmoney, ProviderId::Yahoo]
        );
    }

    #[test]
    fn priority_ties_keep_declaration_order() {
        let settings = ProviderSettings::default();
        let table = RouteTable::builder()
            .route(MarketKind::UsEquity, Operation::History, ProviderSpec::new(ProviderId::Alphavantage, 2, &settings))
            .route(MarketKind::UsEquity, Operation::History, ProviderSpec::new(ProviderId::Sina, 1, &settings))
            .route(MarketKind::UsEquity, Operation::History, ProviderSpec::new(ProviderId::Yahoo, 1, &settings))
            .build();

        let ids: Vec<ProviderId> = table
            .chain(MarketKind::UsEquity, Operation::History)
            .iter()
            .map(|spec| spec.id)
            .collect();
        assert_eq!(
            ids,
            vec![ProviderId::Sina, ProviderId::Yahoo, ProviderId::Alphavantage]
        );
    }

    #[test]
    fn only_alpha_vantage_needs_a_key() {
        let table = RouteTable::default();
        let mut keyed = Vec::new();
        for market in MarketKind::ALL {
            for operation in Operation::ALL {
                keyed.extend(
                    table
                        .chain(market, operation)
                        .iter()
                        .filter(|spec| spec.requires_api_key)
                        .map(|spec| spec.id),
                );
            }
        }
        assert!(keyed.iter().all(|id| *id == ProviderId::Alphavantage));
        assert!(!keyed.is_empty());
    }
}
