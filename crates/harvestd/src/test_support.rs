// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: scripted runtime handles and config
//! builders.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::HarvestConfig;
use crate::runtime::{AgentId, Harvested, RuntimeFailure, RuntimeHandle, RuntimeProvider};

/// Config with fast timers and parked retry paths, suitable for driving
/// loops deterministically in tests.
pub fn test_config(tokens_file: PathBuf) -> HarvestConfig {
    HarvestConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        auth_token: None,
        pool_size: 1,
        tokens_file,
        shared_runtime: false,
        // Long enough that no timer fires unless a test shortens it.
        rotation_ms: 3_600_000,
        ready_timeout_ms: 3_600_000,
        challenge_settle_ms: 10,
        challenge_retry_ms: 3_600_000,
        periodic_min_secs: 0,
        periodic_max_secs: 0,
        backoff_base_secs: 15,
        backoff_cap_secs: 300,
    }
}

pub fn harvested(value: &str) -> Harvested {
    Harvested { value: value.to_owned(), origin_action: "challenge_solved".to_owned() }
}

/// One scripted runtime interaction.
pub struct Scripted {
    pub delay: Duration,
    pub outcome: Result<Harvested, RuntimeFailure>,
}

/// Runtime handle driven by per-method scripts. Each call pops the next
/// scripted outcome; an exhausted script parks the caller forever, which
/// models an interaction that never resolves.
#[derive(Default)]
pub struct ScriptedHandle {
    challenges: Mutex<VecDeque<Scripted>>,
    requests: Mutex<VecDeque<Scripted>>,
    pub saves: AtomicU32,
    pub restores: AtomicU32,
    pub fronts: AtomicU32,
    pub releases: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_challenge(&self, outcome: Result<Harvested, RuntimeFailure>) {
        lock(&self.challenges).push_back(Scripted { delay: Duration::ZERO, outcome });
    }

    pub fn push_challenge_after(&self, delay: Duration, outcome: Result<Harvested, RuntimeFailure>) {
        lock(&self.challenges).push_back(Scripted { delay, outcome });
    }

    pub fn push_request(&self, outcome: Result<Harvested, RuntimeFailure>) {
        lock(&self.requests).push_back(Scripted { delay: Duration::ZERO, outcome });
    }

    async fn play(queue: &Mutex<VecDeque<Scripted>>) -> Result<Harvested, RuntimeFailure> {
        let next = lock(queue).pop_front();
        match next {
            Some(s) => {
                tokio::time::sleep(s.delay).await;
                s.outcome
            }
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl RuntimeHandle for ScriptedHandle {
    async fn present_challenge(&self) -> Result<Harvested, RuntimeFailure> {
        Self::play(&self.challenges).await
    }

    async fn request_token(&self) -> Result<Harvested, RuntimeFailure> {
        Self::play(&self.requests).await
    }

    async fn save_session_state(&self) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn restore_session_state(&self) -> anyhow::Result<()> {
        self.restores.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn bring_to_front(&self) -> anyhow::Result<()> {
        self.fronts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn release_profile(&self) -> anyhow::Result<()> {
        self.releases.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Provider returning one pre-built scripted handle per agent id.
pub struct ScriptedProvider {
    handles: Vec<Arc<ScriptedHandle>>,
}

impl ScriptedProvider {
    pub fn new(handles: Vec<Arc<ScriptedHandle>>) -> Arc<Self> {
        Arc::new(Self { handles })
    }
}

#[async_trait]
impl RuntimeProvider for ScriptedProvider {
    async fn acquire(&self, agent: AgentId) -> anyhow::Result<Arc<dyn RuntimeHandle>> {
        self.handles
            .get(agent as usize)
            .cloned()
            .map(|h| h as Arc<dyn RuntimeHandle>)
            .ok_or_else(|| anyhow::anyhow!("no scripted handle for agent {agent}"))
    }
}

pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}
