// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the harvest control plane.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::agent::{HarvestMode, LifecycleState};
use crate::error::ControlError;
use crate::state::AppState;
use crate::store::{NewToken, Token, TokenClass};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_count: usize,
    pub token_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AgentInfo {
    pub id: u32,
    pub state: LifecycleState,
}

#[derive(Debug, Serialize)]
pub struct AgentStateResponse {
    pub id: u32,
    pub state: LifecycleState,
}

#[derive(Debug, Serialize)]
pub struct TeardownResponse {
    pub id: u32,
    pub released: bool,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub value: String,
    pub class: TokenClass,
    #[serde(default)]
    pub origin_action: String,
    #[serde(default)]
    pub source_agent_id: u32,
    // Unknown extra fields on the payload are ignored, never persisted.
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TokenListResponse {
    pub tokens: Vec<Token>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    #[serde(default)]
    pub class: Option<String>,
    /// Maximum token age in seconds; 0 (the default) skips the age check.
    #[serde(default)]
    pub max_age_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        agent_count: s.supervisor.agent_count(),
        token_count: s.store.total_count().await,
    })
}

/// `GET /api/v1/agents` — ordered lifecycle snapshot.
pub async fn list_agents(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let agents: Vec<AgentInfo> = s
        .supervisor
        .status()
        .await
        .into_iter()
        .map(|(id, state)| AgentInfo { id, state })
        .collect();
    Json(agents)
}

/// `POST /api/v1/agents/{id}/ready` — one-way readiness signal from the
/// agent's runtime. Idempotent.
pub async fn agent_ready(
    State(s): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> impl IntoResponse {
    match s.supervisor.mark_ready(id).await {
        Ok(state) => Json(AgentStateResponse { id, state }).into_response(),
        Err(e) => e.to_http_response(format!("agent {id} not found")).into_response(),
    }
}

/// `POST /api/v1/agents/{id}/modes/{mode}/start`
pub async fn mode_start(
    State(s): State<Arc<AppState>>,
    Path((id, mode)): Path<(u32, String)>,
) -> impl IntoResponse {
    let mode: HarvestMode = match mode.parse() {
        Ok(m) => m,
        Err(e) => return ControlError::BadRequest.to_http_response(e.to_string()).into_response(),
    };
    match s.supervisor.start_mode(id, mode).await {
        Ok(state) => Json(AgentStateResponse { id, state }).into_response(),
        Err(e) => e.to_http_response(describe(e, id)).into_response(),
    }
}

/// `POST /api/v1/agents/{id}/modes/{mode}/stop`
pub async fn mode_stop(
    State(s): State<Arc<AppState>>,
    Path((id, mode)): Path<(u32, String)>,
) -> impl IntoResponse {
    let mode: HarvestMode = match mode.parse() {
        Ok(m) => m,
        Err(e) => return ControlError::BadRequest.to_http_response(e.to_string()).into_response(),
    };
    match s.supervisor.stop_mode(id, mode).await {
        Ok(state) => Json(AgentStateResponse { id, state }).into_response(),
        Err(e) => e.to_http_response(describe(e, id)).into_response(),
    }
}

/// `POST /api/v1/agents/{id}/harvest` — one-shot harvest trigger.
pub async fn trigger_harvest(
    State(s): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> impl IntoResponse {
    match s.supervisor.trigger_harvest(id).await {
        Ok(total_count) => Json(IngestResponse { total_count }).into_response(),
        Err(e) => e.to_http_response(describe(e, id)).into_response(),
    }
}

/// `DELETE /api/v1/agents/{id}/profile` — release on-disk resources.
/// Rejected while the agent is initializing or harvesting.
pub async fn teardown_profile(
    State(s): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> impl IntoResponse {
    match s.supervisor.teardown_resource(id).await {
        Ok(()) => Json(TeardownResponse { id, released: true }).into_response(),
        Err(e) => e.to_http_response(describe(e, id)).into_response(),
    }
}

/// `POST /api/v1/ingest` — token delivery from an agent session.
pub async fn ingest_token(
    State(s): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> impl IntoResponse {
    if req.value.is_empty() {
        return ControlError::BadRequest.to_http_response("empty token value").into_response();
    }
    let appended = s
        .store
        .append(NewToken {
            value: req.value,
            class: req.class,
            origin_action: req.origin_action,
            source_agent_id: req.source_agent_id,
        })
        .await;
    match appended {
        Ok(total_count) => {
            tracing::info!(
                class = req.class.as_str(),
                agent = req.source_agent_id,
                total_count,
                "token ingested"
            );
            Json(IngestResponse { total_count }).into_response()
        }
        Err(e) => ControlError::StoreFailure.to_http_response(e.to_string()).into_response(),
    }
}

/// `GET /api/v1/tokens` — full snapshot.
pub async fn list_tokens(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let tokens = s.store.list_all().await;
    let total = tokens.len();
    Json(TokenListResponse { tokens, total })
}

/// `GET /api/v1/tokens/latest?class=&max_age_secs=`
pub async fn latest_token(
    State(s): State<Arc<AppState>>,
    Query(query): Query<LatestQuery>,
) -> impl IntoResponse {
    let class = match query.class.as_deref() {
        Some(raw) => match raw.parse::<TokenClass>() {
            Ok(c) => Some(c),
            Err(e) => {
                return ControlError::BadRequest.to_http_response(e.to_string()).into_response()
            }
        },
        None => None,
    };
    match s.store.latest(class, Duration::from_secs(query.max_age_secs)).await {
        Some(token) => Json(token).into_response(),
        None => ControlError::TokenNotFound
            .to_http_response("no token matches the requested class and age")
            .into_response(),
    }
}

/// `DELETE /api/v1/tokens` — wipe the store.
pub async fn clear_tokens(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.store.clear().await {
        Ok(removed) => {
            tracing::info!(removed, "token store cleared");
            Json(ClearResponse { removed }).into_response()
        }
        Err(e) => ControlError::StoreFailure.to_http_response(e.to_string()).into_response(),
    }
}

fn describe(e: ControlError, id: u32) -> String {
    match e {
        ControlError::AgentNotFound => format!("agent {id} not found"),
        ControlError::AgentNotReady => format!("agent {id} is not ready"),
        ControlError::AgentBusy => format!("agent {id} has an active harvest mode"),
        ControlError::RuntimeFailure => format!("agent {id} runtime attempt failed"),
        _ => e.to_string(),
    }
}
