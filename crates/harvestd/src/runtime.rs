// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runtime seam: the opaque external capability an agent uses to run
//! challenges inside its session.
//!
//! The daemon never drives a session directly; it only calls through
//! these traits. Completion is future-shaped, so dropping the call (mode
//! cancellation) uniformly discards any late response.

use std::sync::Arc;

use async_trait::async_trait;

/// Stable small-integer agent identifier.
pub type AgentId = u32;

/// A token produced by the runtime, before the store assigns order.
#[derive(Debug, Clone)]
pub struct Harvested {
    pub value: String,
    /// Free-form tag describing how the token was obtained.
    pub origin_action: String,
}

/// Failure outcomes of a runtime interaction.
///
/// Everything except `Gone` is a uniform transient failure that drives
/// the controller's retry path; `Gone` means the underlying handle was
/// invalidated and the harvest loop should end silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeFailure {
    /// The challenge or request did not resolve in time.
    Timeout,
    /// Explicit failure signal from the session.
    Failed(String),
    /// The capability is not present (yet) in the session.
    Unavailable,
    /// The handle is no longer valid (session torn down).
    Gone,
}

impl std::fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Unavailable => f.write_str("capability unavailable"),
            Self::Gone => f.write_str("handle gone"),
        }
    }
}

/// Acquires one runtime handle per agent at pool initialization.
#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    async fn acquire(&self, agent: AgentId) -> anyhow::Result<Arc<dyn RuntimeHandle>>;
}

/// Per-agent session capability.
#[async_trait]
pub trait RuntimeHandle: Send + Sync {
    /// Present a solvable challenge and wait for its completion.
    async fn present_challenge(&self) -> Result<Harvested, RuntimeFailure>;

    /// Best-effort, non-interactive token request.
    async fn request_token(&self) -> Result<Harvested, RuntimeFailure>;

    /// Snapshot this agent's session-local state (cookies, credentials)
    /// into its per-agent slot. Shared-runtime topology only.
    async fn save_session_state(&self) -> anyhow::Result<()>;

    /// Restore this agent's previously saved slot into the shared runtime.
    async fn restore_session_state(&self) -> anyhow::Result<()>;

    /// Bring this agent's view to the foreground of the shared runtime.
    async fn bring_to_front(&self) -> anyhow::Result<()>;

    /// Release the agent's on-disk session resources.
    async fn release_profile(&self) -> anyhow::Result<()>;
}

/// Provider for sessions that are driven wholly externally: harvest calls
/// report `Unavailable` (tokens arrive through the ingestion endpoint
/// instead) and rotation hooks are accepted as no-ops.
pub struct DetachedProvider;

#[async_trait]
impl RuntimeProvider for DetachedProvider {
    async fn acquire(&self, agent: AgentId) -> anyhow::Result<Arc<dyn RuntimeHandle>> {
        tracing::debug!(agent, "acquired detached runtime handle");
        Ok(Arc::new(DetachedHandle))
    }
}

struct DetachedHandle;

#[async_trait]
impl RuntimeHandle for DetachedHandle {
    async fn present_challenge(&self) -> Result<Harvested, RuntimeFailure> {
        Err(RuntimeFailure::Unavailable)
    }

    async fn request_token(&self) -> Result<Harvested, RuntimeFailure> {
        Err(RuntimeFailure::Unavailable)
    }

    async fn save_session_state(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn restore_session_state(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn bring_to_front(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn release_profile(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
