// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use exchange::client::DownstreamClient;
use exchange::protocol::{self, ExchangeRequest};
use harvestd::store::{TokenClass, TokenStore};

/// Submit one harvested token downstream, with bounded retry/fallback.
#[derive(Debug, Parser)]
struct ExchangeCli {
    /// Path to the client config file (endpoint, session cookie).
    #[arg(long, default_value = "exchange.json", env = "EXCHANGE_CONFIG")]
    config: PathBuf,

    /// Path to the token file shared with the harvest daemon.
    #[arg(long, default_value = "tokens.json", env = "EXCHANGE_TOKENS_FILE")]
    tokens_file: PathBuf,

    /// Token class tried first.
    #[arg(long, default_value = "primary", env = "EXCHANGE_PREFERRED_CLASS")]
    preferred_class: TokenClass,

    /// Token class substituted after a rejection.
    #[arg(long, default_value = "secondary", env = "EXCHANGE_FALLBACK_CLASS")]
    fallback_class: TokenClass,

    /// Total submission budget per run.
    #[arg(long, default_value_t = 3, env = "EXCHANGE_MAX_ATTEMPTS")]
    max_attempts: u32,

    /// Maximum age of a usable preferred token, seconds.
    #[arg(long, default_value_t = 110, env = "EXCHANGE_FRESHNESS_SECS")]
    freshness_secs: u64,

    /// Maximum age of a usable fallback token, seconds.
    #[arg(long, default_value_t = 90, env = "EXCHANGE_FALLBACK_FRESHNESS_SECS")]
    fallback_freshness_secs: u64,
}

#[tokio::main]
async fn main() {
    let cli = ExchangeCli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: ExchangeCli) -> anyhow::Result<()> {
    let store = TokenStore::open(&cli.tokens_file);
    let client = DownstreamClient::new(cli.config)?;
    let request = ExchangeRequest {
        preferred_class: cli.preferred_class,
        fallback_class: cli.fallback_class,
        max_attempts: cli.max_attempts,
        freshness_window: Duration::from_secs(cli.freshness_secs),
        fallback_freshness_window: Duration::from_secs(cli.fallback_freshness_secs),
    };

    let payload = protocol::exchange(&store, &request, &client).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
