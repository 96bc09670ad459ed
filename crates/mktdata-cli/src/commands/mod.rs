mod history;
mod quote;
mod quotes;
mod sources;

use std::fs;

use mktdata_core::{AttemptFailure, MarketDataRouter, PipelineConfig, ProviderId, Resolved};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Command payload plus how it was obtained.
#[derive(Debug, Serialize)]
pub struct CommandResult {
    pub data: Value,
    pub meta: ResultMeta,
}

#[derive(Debug, Default, Serialize)]
pub struct ResultMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ProviderId>,
    pub source_chain: Vec<ProviderId>,
    pub cache_hit: bool,
    pub latency_ms: u64,
    /// Whether any part of `data` is synthetic.
    pub mock: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptView>,
}

/// Serializable form of a failed provider attempt.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    pub provider: ProviderId,
    pub code: &'static str,
    pub message: String,
}

impl From<&AttemptFailure> for AttemptView {
    fn from(attempt: &AttemptFailure) -> Self {
        Self {
            provider: attempt.provider,
            code: attempt.code(),
            message: attempt.error.message().to_owned(),
        }
    }
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            meta: ResultMeta::default(),
        }
    }

    pub fn resolved<T>(data: Value, resolved: &Resolved<T>) -> Self {
        Self {
            data,
            meta: ResultMeta {
                source: Some(resolved.source),
                source_chain: resolved.source_chain.clone(),
                cache_hit: resolved.cache_hit,
                latency_ms: resolved.latency_ms,
                mock: resolved.is_mock(),
                attempts: resolved.attempts.iter().map(AttemptView::from).collect(),
            },
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.meta.latency_ms = latency_ms;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = load_config(cli)?;
    let router = MarketDataRouter::builder(config).build();

    match &cli.command {
        Command::History(args) => history::run(args, &router).await,
        Command::Quote(args) => quote::run(args, &router).await,
        Command::Quotes(args) => quotes::run(args, &router).await,
        Command::Sources(args) => sources::run(args, &router),
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, CliError> {
    match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| CliError::Config {
                path: path.display().to_string(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "loading pipeline config file");
            Ok(PipelineConfig::from_json_str(&raw)?)
        }
        None => Ok(PipelineConfig::from_env()?),
    }
}
