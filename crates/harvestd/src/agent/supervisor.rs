// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool supervisor: owns the fixed set of agents, applies control
//! commands, and runs foreground rotation in the shared-runtime topology.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::agent::{harvest, Agent, HarvestMode, LifecycleState};
use crate::config::HarvestConfig;
use crate::error::ControlError;
use crate::runtime::{AgentId, RuntimeProvider};
use crate::store::{NewToken, TokenClass, TokenStore};

/// Owns the agent pool for the process lifetime. Constructed once at
/// startup and passed by reference to every component — there is no
/// ambient registry.
pub struct SessionSupervisor {
    agents: Vec<Arc<Agent>>,
    config: Arc<HarvestConfig>,
    store: Arc<TokenStore>,
    shutdown: CancellationToken,
    /// Exclusive foreground right in the shared-runtime topology: held
    /// across one full rotation step, and by each agent across its own
    /// runtime interactions, so the two never interleave.
    foreground: Option<Arc<Mutex<()>>>,
}

impl SessionSupervisor {
    /// Create `pool_size` agents, each bound to a freshly acquired
    /// runtime handle, and spawn their setup tasks.
    pub async fn initialize(
        config: Arc<HarvestConfig>,
        store: Arc<TokenStore>,
        provider: Arc<dyn RuntimeProvider>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Arc<Self>> {
        let foreground = config.shared_runtime.then(|| Arc::new(Mutex::new(())));
        let mut agents = Vec::with_capacity(config.pool_size as usize);
        for id in 0..config.pool_size {
            let handle = provider.acquire(id).await?;
            agents.push(Agent::new(id, handle, foreground.clone()));
        }
        tracing::info!(pool_size = agents.len(), "agent pool initialized");

        let supervisor = Arc::new(Self {
            agents,
            config,
            store,
            shutdown,
            foreground,
        });
        for agent in &supervisor.agents {
            supervisor.spawn_setup(Arc::clone(agent));
        }
        if supervisor.config.shared_runtime {
            supervisor.spawn_rotation();
        }
        Ok(supervisor)
    }

    /// Per-agent setup: grab one best-effort bootstrap token, snapshot the
    /// initial session slot in the shared topology, then wait for the
    /// external ready signal — marking ready directly if none arrives.
    fn spawn_setup(&self, agent: Arc<Agent>) {
        let store = Arc::clone(&self.store);
        let ready_timeout = self.config.ready_timeout();
        let shared = self.config.shared_runtime;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            match agent.with_foreground(agent.runtime().request_token()).await {
                Ok(h) => {
                    let appended = store
                        .append(NewToken {
                            value: h.value,
                            class: TokenClass::Bootstrap,
                            origin_action: "initial_page_load".to_owned(),
                            source_agent_id: agent.id,
                        })
                        .await;
                    if let Err(e) = appended {
                        tracing::warn!(agent = agent.id, err = %e, "bootstrap token persistence failed");
                    }
                }
                Err(failure) => {
                    tracing::debug!(agent = agent.id, %failure, "no bootstrap token");
                }
            }

            if shared {
                if let Err(e) = agent.with_foreground(agent.runtime().save_session_state()).await {
                    tracing::debug!(agent = agent.id, err = %e, "initial session snapshot failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(ready_timeout) => {
                    if agent.mark_ready().await {
                        tracing::warn!(
                            agent = agent.id,
                            "no ready signal within timeout, marking ready directly"
                        );
                    }
                }
            }
        });
    }

    fn agent(&self, id: AgentId) -> Result<&Arc<Agent>, ControlError> {
        self.agents.get(id as usize).ok_or(ControlError::AgentNotFound)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Ordered lifecycle snapshot for external observers.
    pub async fn status(&self) -> Vec<(AgentId, LifecycleState)> {
        let mut out = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            out.push((agent.id, agent.lifecycle().await));
        }
        out
    }

    /// External readiness signal. Idempotent: repeat signals are no-ops.
    pub async fn mark_ready(&self, id: AgentId) -> Result<LifecycleState, ControlError> {
        let agent = self.agent(id)?;
        if agent.mark_ready().await {
            tracing::info!(agent = id, "agent ready");
        }
        Ok(agent.lifecycle().await)
    }

    /// Start (or switch to) a harvest mode on one agent.
    pub async fn start_mode(
        &self,
        id: AgentId,
        mode: HarvestMode,
    ) -> Result<LifecycleState, ControlError> {
        let agent = self.agent(id)?;
        if !agent.is_ready().await {
            return Err(ControlError::AgentNotReady);
        }
        let (cancel, generation) = agent.activate(mode).await;
        harvest::spawn_mode_loop(
            Arc::clone(agent),
            mode,
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            cancel,
            generation,
        );
        tracing::info!(agent = id, mode = mode.as_str(), "harvest mode started");
        Ok(agent.lifecycle().await)
    }

    /// Stop a harvest mode. Stopping a mode that is not running is an
    /// idempotent no-op, not an error.
    pub async fn stop_mode(
        &self,
        id: AgentId,
        mode: HarvestMode,
    ) -> Result<LifecycleState, ControlError> {
        let agent = self.agent(id)?;
        if !agent.is_ready().await {
            return Err(ControlError::AgentNotReady);
        }
        agent.stop_mode(mode).await;
        Ok(agent.lifecycle().await)
    }

    /// Single on-demand harvest attempt, outside any mode loop. Returns
    /// the new store total on success.
    pub async fn trigger_harvest(&self, id: AgentId) -> Result<usize, ControlError> {
        let agent = self.agent(id)?;
        if !agent.is_ready().await {
            return Err(ControlError::AgentNotReady);
        }
        harvest::harvest_once(agent, &self.store).await.map_err(|failure| {
            tracing::debug!(agent = id, %failure, "one-shot harvest failed");
            ControlError::RuntimeFailure
        })
    }

    /// Release an agent's on-disk session resources. Only valid while the
    /// agent is idle; rejected rather than corrupting in-flight state.
    pub async fn teardown_resource(&self, id: AgentId) -> Result<(), ControlError> {
        let agent = self.agent(id)?;
        match agent.lifecycle().await {
            LifecycleState::Initializing => return Err(ControlError::AgentNotReady),
            LifecycleState::Idle => {}
            _ => return Err(ControlError::AgentBusy),
        }
        agent.runtime().release_profile().await.map_err(|e| {
            tracing::warn!(agent = id, err = %e, "profile teardown failed");
            ControlError::Internal
        })?;
        tracing::info!(agent = id, "agent profile released");
        Ok(())
    }

    /// Foreground rotation for the shared-runtime topology: one agent per
    /// period takes the foreground, with its predecessor's session state
    /// saved off and its own restored first. Best-effort; a failed step is
    /// logged and skipped.
    fn spawn_rotation(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let period = self.config.rotation_interval();
        let Some(excl) = self.foreground.clone() else { return };
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut current: Option<usize> = None;

            loop {
                tokio::select! {
                    _ = supervisor.shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let next = match supervisor.next_ready_agent(current).await {
                    Some(idx) => idx,
                    None => continue,
                };
                if Some(next) == current {
                    continue;
                }

                // One step = save old, restore new, bring to front, under
                // the foreground right shared with every agent's runtime
                // interactions.
                let _step = excl.lock().await;
                if let Some(cur) = current {
                    if let Err(e) = supervisor.agents[cur].runtime().save_session_state().await {
                        tracing::debug!(agent = cur, err = %e, "session snapshot failed, skipping rotation");
                        continue;
                    }
                }
                let agent = &supervisor.agents[next];
                if let Err(e) = agent.runtime().restore_session_state().await {
                    tracing::debug!(agent = agent.id, err = %e, "session restore failed, skipping rotation");
                    continue;
                }
                if let Err(e) = agent.runtime().bring_to_front().await {
                    tracing::debug!(agent = agent.id, err = %e, "bring-to-front failed");
                    continue;
                }
                current = Some(next);
                tracing::debug!(agent = agent.id, "foreground rotated");
            }
        });
    }

    /// Index of the next ready agent after `current` in id order,
    /// wrapping. `None` when no agent is ready yet.
    async fn next_ready_agent(&self, current: Option<usize>) -> Option<usize> {
        let n = self.agents.len();
        if n == 0 {
            return None;
        }
        let start = current.map_or(0, |c| (c + 1) % n);
        for offset in 0..n {
            let idx = (start + offset) % n;
            if self.agents[idx].is_ready().await {
                return Some(idx);
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
