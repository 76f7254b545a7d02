// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised agents: lifecycle state, harvest modes, and the pool
//! supervisor.

pub mod harvest;
pub mod supervisor;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::runtime::{AgentId, RuntimeHandle};

/// Harvesting mode of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestMode {
    /// Interactive: present a solvable challenge and wait for completion.
    Challenge,
    /// Passive: request tokens on a randomized cadence.
    Periodic,
}

impl HarvestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Challenge => "challenge",
            Self::Periodic => "periodic",
        }
    }
}

impl std::str::FromStr for HarvestMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "challenge" => Ok(Self::Challenge),
            "periodic" => Ok(Self::Periodic),
            other => anyhow::bail!("unknown harvest mode: {other}"),
        }
    }
}

/// Observable lifecycle state of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created but not yet signalled ready by its runtime.
    Initializing,
    Idle,
    HarvestingChallenge,
    HarvestingPeriodic,
}

impl LifecycleState {
    fn for_mode(mode: HarvestMode) -> Self {
        match mode {
            HarvestMode::Challenge => Self::HarvestingChallenge,
            HarvestMode::Periodic => Self::HarvestingPeriodic,
        }
    }
}

/// The currently running harvest loop, if any.
struct ActiveMode {
    mode: HarvestMode,
    cancel: CancellationToken,
    /// Identifies which spawned loop owns the slot, so a loop exiting
    /// after a mode switch cannot clear its successor.
    generation: u64,
}

/// One supervised session. Created at pool initialization and never
/// destroyed, only stopped.
pub struct Agent {
    pub id: AgentId,
    runtime: Arc<dyn RuntimeHandle>,
    lifecycle: RwLock<LifecycleState>,
    active: Mutex<Option<ActiveMode>>,
    next_generation: std::sync::atomic::AtomicU64,
    /// Shared-runtime topologies only: the pool-wide foreground right,
    /// held across each runtime interaction so it cannot interleave with
    /// a rotation step (which holds the same lock).
    foreground: Option<Arc<Mutex<()>>>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        runtime: Arc<dyn RuntimeHandle>,
        foreground: Option<Arc<Mutex<()>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            runtime,
            lifecycle: RwLock::new(LifecycleState::Initializing),
            active: Mutex::new(None),
            next_generation: std::sync::atomic::AtomicU64::new(0),
            foreground,
        })
    }

    pub fn runtime(&self) -> &Arc<dyn RuntimeHandle> {
        &self.runtime
    }

    /// Run one runtime interaction, holding the pool-wide foreground
    /// right for its duration when the runtime is shared. In the
    /// one-runtime-per-agent topology this is a plain await.
    pub(crate) async fn with_foreground<T>(
        &self,
        interaction: impl std::future::Future<Output = T>,
    ) -> T {
        match &self.foreground {
            Some(excl) => {
                let _fg = excl.lock().await;
                interaction.await
            }
            None => interaction.await,
        }
    }

    pub async fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.read().await
    }

    pub async fn is_ready(&self) -> bool {
        *self.lifecycle.read().await != LifecycleState::Initializing
    }

    /// One-way readiness transition. Returns whether this call flipped the
    /// state (repeat signals are no-ops).
    pub async fn mark_ready(&self) -> bool {
        let mut lifecycle = self.lifecycle.write().await;
        if *lifecycle == LifecycleState::Initializing {
            *lifecycle = LifecycleState::Idle;
            true
        } else {
            false
        }
    }

    /// Stop whatever mode is running, cancelling any pending retry.
    /// Idempotent: stopping an idle agent is a no-op.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(prev) = active.take() {
            prev.cancel.cancel();
            tracing::info!(agent = self.id, mode = prev.mode.as_str(), "harvest mode stopped");
        }
        let mut lifecycle = self.lifecycle.write().await;
        if *lifecycle != LifecycleState::Initializing {
            *lifecycle = LifecycleState::Idle;
        }
    }

    /// Stop only if `mode` is the active one (explicit stop command for a
    /// specific mode). A stop for a mode that is not running is a no-op.
    pub async fn stop_mode(&self, mode: HarvestMode) {
        let is_active =
            { self.active.lock().await.as_ref().map(|a| a.mode) == Some(mode) };
        if is_active {
            self.stop().await;
        }
    }

    /// Record `mode` as active and hand back its cancellation token plus a
    /// generation for loop ownership. Any previously active mode is
    /// cancelled first (mode switch).
    pub(crate) async fn activate(&self, mode: HarvestMode) -> (CancellationToken, u64) {
        use std::sync::atomic::Ordering;
        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut active = self.active.lock().await;
            if let Some(prev) = active.take() {
                prev.cancel.cancel();
                tracing::info!(
                    agent = self.id,
                    from = prev.mode.as_str(),
                    to = mode.as_str(),
                    "switching harvest mode"
                );
            }
            *active = Some(ActiveMode { mode, cancel: cancel.clone(), generation });
        }
        *self.lifecycle.write().await = LifecycleState::for_mode(mode);
        (cancel, generation)
    }

    /// Called by a harvest loop when it exits on its own (runtime handle
    /// gone). Clears the active slot only if it still belongs to this
    /// loop's generation — a newer mode may have replaced it already.
    pub(crate) async fn deactivate(&self, generation: u64) {
        // The active guard stays held across the lifecycle write: releasing
        // it first would let a concurrent `activate` claim the slot and set
        // a harvesting state that this stale exit then clobbers to Idle.
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| a.generation == generation) {
            *active = None;
            let mut lifecycle = self.lifecycle.write().await;
            if *lifecycle != LifecycleState::Initializing {
                *lifecycle = LifecycleState::Idle;
            }
        }
    }

    /// Whether a harvest mode is currently active.
    pub async fn is_harvesting(&self) -> bool {
        self.active.lock().await.is_some()
    }
}
