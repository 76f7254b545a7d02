// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent harvest loops.
//!
//! Loops are spawned by the supervisor and run until their cancellation
//! token fires or the runtime handle goes away. Cancellation drops any
//! in-flight runtime call, so a response arriving after a stop command is
//! discarded rather than appended.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, HarvestMode};
use crate::config::HarvestConfig;
use crate::runtime::{Harvested, RuntimeFailure};
use crate::store::{NewToken, TokenClass, TokenStore};

/// Spawn the loop for `mode` on `agent`. The agent's active-mode slot
/// must already be claimed (see [`Agent::activate`]).
pub fn spawn_mode_loop(
    agent: Arc<Agent>,
    mode: HarvestMode,
    config: Arc<HarvestConfig>,
    store: Arc<TokenStore>,
    cancel: CancellationToken,
    generation: u64,
) {
    tokio::spawn(async move {
        match mode {
            HarvestMode::Challenge => {
                challenge_loop(&agent, &config, &store, &cancel).await;
            }
            HarvestMode::Periodic => {
                periodic_loop(&agent, &config, &store, &cancel).await;
            }
        }
        agent.deactivate(generation).await;
    });
}

/// Interactive mode: present a challenge, wait for its completion, settle
/// briefly, repeat. Failures re-present after a short fixed delay.
async fn challenge_loop(
    agent: &Agent,
    config: &HarvestConfig,
    store: &TokenStore,
    cancel: &CancellationToken,
) {
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = agent.with_foreground(agent.runtime().present_challenge()) => outcome,
        };

        let delay = match outcome {
            Ok(harvested) => {
                if cancel.is_cancelled() {
                    break;
                }
                append_harvested(agent, store, TokenClass::Primary, harvested).await;
                config.challenge_settle()
            }
            Err(RuntimeFailure::Gone) => {
                tracing::debug!(agent = agent.id, "runtime handle gone, challenge loop ending");
                break;
            }
            Err(failure) => {
                tracing::debug!(agent = agent.id, %failure, "challenge attempt failed");
                config.challenge_retry()
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Passive mode: request a token, then wait a uniformly random interval
/// on success or an exponentially backed-off delay on failure.
async fn periodic_loop(
    agent: &Agent,
    config: &HarvestConfig,
    store: &TokenStore,
    cancel: &CancellationToken,
) {
    let mut consecutive_failures: u32 = 0;

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = agent.with_foreground(agent.runtime().request_token()) => outcome,
        };

        let delay = match outcome {
            Ok(harvested) => {
                if cancel.is_cancelled() {
                    break;
                }
                consecutive_failures = 0;
                append_harvested(agent, store, TokenClass::Secondary, harvested).await;
                jittered_interval(config.periodic_min_secs, config.periodic_max_secs)
            }
            Err(RuntimeFailure::Gone) => {
                tracing::debug!(agent = agent.id, "runtime handle gone, periodic loop ending");
                break;
            }
            Err(failure) => {
                consecutive_failures += 1;
                let delay = backoff_delay(
                    config.backoff_base_secs,
                    config.backoff_cap_secs,
                    consecutive_failures,
                );
                tracing::debug!(
                    agent = agent.id,
                    %failure,
                    consecutive_failures,
                    delay_secs = delay.as_secs(),
                    "periodic attempt failed, backing off"
                );
                delay
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One-shot harvest outside any mode loop (manual trigger).
pub async fn harvest_once(agent: &Agent, store: &TokenStore) -> Result<usize, RuntimeFailure> {
    let mut harvested = agent.with_foreground(agent.runtime().request_token()).await?;
    harvested.origin_action = "manual_trigger".to_owned();
    match store
        .append(NewToken {
            value: harvested.value,
            class: TokenClass::Secondary,
            origin_action: harvested.origin_action,
            source_agent_id: agent.id,
        })
        .await
    {
        Ok(total) => Ok(total),
        Err(e) => {
            tracing::warn!(agent = agent.id, err = %e, "one-shot token persistence failed");
            Err(RuntimeFailure::Failed(e.to_string()))
        }
    }
}

async fn append_harvested(agent: &Agent, store: &TokenStore, class: TokenClass, h: Harvested) {
    let result = store
        .append(NewToken {
            value: h.value,
            class,
            origin_action: h.origin_action,
            source_agent_id: agent.id,
        })
        .await;
    match result {
        Ok(total) => {
            tracing::info!(agent = agent.id, class = class.as_str(), total, "token stored");
        }
        Err(e) => {
            // Persistence failure loses this token but never the loop.
            tracing::warn!(agent = agent.id, err = %e, "token persistence failed");
        }
    }
}

/// Uniformly random interval in `[min_secs, max_secs]`, millisecond
/// granularity, so successive harvests carry no fixed-rate signature.
pub fn jittered_interval(min_secs: u64, max_secs: u64) -> Duration {
    let (lo, hi) = (min_secs.min(max_secs) * 1000, min_secs.max(max_secs) * 1000);
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

/// `base × 1.5^(consecutive-1)` seconds, capped. `consecutive` starts at 1
/// for the first failure.
pub fn backoff_delay(base_secs: u64, cap_secs: u64, consecutive: u32) -> Duration {
    let exponent = consecutive.saturating_sub(1).min(32);
    let delay = base_secs as f64 * 1.5_f64.powi(exponent as i32);
    Duration::from_secs_f64(delay.min(cap_secs as f64))
}

#[cfg(test)]
#[path = "harvest_tests.rs"]
mod tests;
