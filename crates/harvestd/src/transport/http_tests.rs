// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::agent::supervisor::SessionSupervisor;
use crate::runtime::DetachedProvider;
use crate::state::AppState;
use crate::store::TokenStore;
use crate::test_support::{test_config, AnyhowExt};
use crate::transport::build_router;

async fn server_with(
    auth_token: Option<&str>,
) -> anyhow::Result<(tempfile::TempDir, axum_test::TestServer)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let mut config = test_config(path.clone());
    config.auth_token = auth_token.map(str::to_owned);
    let config = Arc::new(config);

    let shutdown = CancellationToken::new();
    let store = Arc::new(TokenStore::open(&path));
    let supervisor = SessionSupervisor::initialize(
        Arc::clone(&config),
        Arc::clone(&store),
        Arc::new(DetachedProvider),
        shutdown.clone(),
    )
    .await?;
    let state = Arc::new(AppState { supervisor, store, config, shutdown });
    let server = axum_test::TestServer::new(build_router(state)).anyhow()?;
    Ok((dir, server))
}

#[tokio::test]
async fn health_reports_pool_and_store() -> anyhow::Result<()> {
    let (_dir, server) = server_with(None).await?;

    let resp = server.get("/api/v1/health").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["agent_count"], 1);
    assert_eq!(body["token_count"], 0);
    Ok(())
}

#[tokio::test]
async fn ingest_list_latest_clear_round() -> anyhow::Result<()> {
    let (_dir, server) = server_with(None).await?;

    let resp = server
        .post("/api/v1/ingest")
        .json(&serde_json::json!({
            "value": "tok-1",
            "class": "primary",
            "origin_action": "challenge_solved",
            "source_agent_id": 0,
        }))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_count"], 1);

    // Re-delivering the same value replaces, never duplicates.
    let resp = server
        .post("/api/v1/ingest")
        .json(&serde_json::json!({"value": "tok-1", "class": "primary"}))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_count"], 1);

    let resp = server.get("/api/v1/tokens").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["tokens"][0]["value"], "tok-1");

    let resp = server.get("/api/v1/tokens/latest").add_query_param("class", "primary").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["value"], "tok-1");
    assert_eq!(body["class"], "primary");

    let resp = server.get("/api/v1/tokens/latest").add_query_param("class", "secondary").await;
    resp.assert_status(StatusCode::NOT_FOUND);

    let resp = server.delete("/api/v1/tokens").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["removed"], 1);

    let resp = server.get("/api/v1/tokens/latest").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn ingest_rejects_empty_value() -> anyhow::Result<()> {
    let (_dir, server) = server_with(None).await?;

    let resp = server
        .post("/api/v1/ingest")
        .json(&serde_json::json!({"value": "", "class": "primary"}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn latest_rejects_unknown_class() -> anyhow::Result<()> {
    let (_dir, server) = server_with(None).await?;

    let resp = server.get("/api/v1/tokens/latest").add_query_param("class", "bogus").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn agent_lifecycle_over_http() -> anyhow::Result<()> {
    let (_dir, server) = server_with(None).await?;

    let resp = server.get("/api/v1/agents").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body[0]["id"], 0);
    assert_eq!(body[0]["state"], "initializing");

    let resp = server.post("/api/v1/agents/0/modes/challenge/start").await;
    resp.assert_status(StatusCode::CONFLICT);

    let resp = server.post("/api/v1/agents/0/ready").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["state"], "idle");

    let resp = server.post("/api/v1/agents/0/modes/challenge/start").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["state"], "harvesting_challenge");

    let resp = server.post("/api/v1/agents/0/modes/sideways/start").await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server.post("/api/v1/agents/0/modes/challenge/stop").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["state"], "idle");

    let resp = server.delete("/api/v1/agents/0/profile").await;
    resp.assert_status(StatusCode::OK);

    let resp = server.post("/api/v1/agents/7/ready").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn detached_runtime_cannot_serve_manual_harvest() -> anyhow::Result<()> {
    let (_dir, server) = server_with(None).await?;

    server.post("/api/v1/agents/0/ready").await.assert_status(StatusCode::OK);
    let resp = server.post("/api/v1/agents/0/harvest").await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    Ok(())
}

#[tokio::test]
async fn bearer_auth_gates_control_but_not_agent_endpoints() -> anyhow::Result<()> {
    let (_dir, server) = server_with(Some("secret")).await?;

    server.get("/api/v1/tokens").await.assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/api/v1/tokens")
        .authorization_bearer("wrong")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/api/v1/tokens")
        .authorization_bearer("secret")
        .await
        .assert_status(StatusCode::OK);

    // Agent-facing endpoints carry no operator credential.
    server.get("/api/v1/health").await.assert_status(StatusCode::OK);
    server
        .post("/api/v1/ingest")
        .json(&serde_json::json!({"value": "tok-x", "class": "secondary"}))
        .await
        .assert_status(StatusCode::OK);
    server.post("/api/v1/agents/0/ready").await.assert_status(StatusCode::OK);
    Ok(())
}
