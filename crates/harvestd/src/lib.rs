// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harvestd: token harvest orchestrator.
//!
//! Supervises a pool of harvesting agents, appends every collected token
//! to a durable deduplicating store, and exposes an HTTP control plane
//! for mode control, token retrieval, and ingestion.

pub mod agent;
pub mod config;
pub mod error;
pub mod runtime;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::agent::supervisor::SessionSupervisor;
use crate::config::HarvestConfig;
use crate::runtime::RuntimeProvider;
use crate::state::AppState;
use crate::store::TokenStore;
use crate::transport::build_router;

/// Run the harvest daemon until shutdown.
pub async fn run(config: HarvestConfig, provider: Arc<dyn RuntimeProvider>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let config = Arc::new(config);

    let store = Arc::new(TokenStore::open(&config.tokens_file));
    let supervisor = SessionSupervisor::initialize(
        Arc::clone(&config),
        Arc::clone(&store),
        provider,
        shutdown.clone(),
    )
    .await?;

    let state = Arc::new(AppState {
        supervisor,
        store,
        config: Arc::clone(&config),
        shutdown: shutdown.clone(),
    });

    if config.auth_token.is_some() {
        tracing::info!("harvestd listening on {addr} (auth enabled)");
    } else {
        tracing::info!("harvestd listening on {addr}");
    }

    // Ctrl-C cancels the shutdown token, which stops the rotation and
    // harvest loops and drains the HTTP server.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
