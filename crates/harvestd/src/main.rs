// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tracing::error;

use harvestd::config::HarvestConfig;
use harvestd::runtime::DetachedProvider;

#[tokio::main]
async fn main() {
    let config = HarvestConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // The default build runs detached: agent sessions are driven
    // externally and deliver tokens over the ingestion endpoint.
    if let Err(e) = harvestd::run(config, Arc::new(DetachedProvider)).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
