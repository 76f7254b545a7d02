// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the harvest control plane.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with all control-plane routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Agent pool
        .route("/api/v1/agents", get(http::list_agents))
        .route("/api/v1/agents/{id}/ready", post(http::agent_ready))
        .route("/api/v1/agents/{id}/modes/{mode}/start", post(http::mode_start))
        .route("/api/v1/agents/{id}/modes/{mode}/stop", post(http::mode_stop))
        .route("/api/v1/agents/{id}/harvest", post(http::trigger_harvest))
        .route("/api/v1/agents/{id}/profile", delete(http::teardown_profile))
        // Token store
        .route("/api/v1/ingest", post(http::ingest_token))
        .route("/api/v1/tokens", get(http::list_tokens).delete(http::clear_tokens))
        .route("/api/v1/tokens/latest", get(http::latest_token))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
