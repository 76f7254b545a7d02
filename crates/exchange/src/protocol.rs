// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry/fallback token submission.
//!
//! The protocol never resubmits a token the downstream just rejected,
//! consumes only the token that was actually accepted, and terminates
//! within `max_attempts` submissions regardless of store contents.
//! Rejected tokens are left in place to expire naturally.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use harvestd::store::{Token, TokenClass, TokenStore};

/// Downstream verdict for one submitted token.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Accepted; carries the downstream response payload.
    Success(serde_json::Value),
    /// The downstream explicitly rejected the token as invalid.
    RejectedInvalidToken,
    /// A failure unrelated to token validity. Never retried.
    Other(String),
}

/// Parameters for one exchange run.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub preferred_class: TokenClass,
    pub fallback_class: TokenClass,
    pub max_attempts: u32,
    pub freshness_window: Duration,
    /// Fallback tokens decay faster downstream, so their window may be
    /// shorter than the preferred one.
    pub fallback_freshness_window: Duration,
}

impl Default for ExchangeRequest {
    fn default() -> Self {
        Self {
            preferred_class: TokenClass::Primary,
            fallback_class: TokenClass::Secondary,
            max_attempts: 3,
            freshness_window: Duration::from_secs(110),
            fallback_freshness_window: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// No fresh token of the preferred class exists; nothing was submitted.
    NoUsableToken,
    /// Every candidate within the attempt budget was rejected.
    Exhausted,
    /// Downstream failure unrelated to token validity.
    Downstream(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUsableToken => f.write_str("no usable token"),
            Self::Exhausted => f.write_str("all attempts exhausted"),
            Self::Downstream(reason) => write!(f, "downstream error: {reason}"),
        }
    }
}

impl std::error::Error for ExchangeError {}

/// Performs the downstream exchange for one token.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Transport-level failures may surface as `Err` or as
    /// [`Outcome::Other`]; both end the protocol without retry.
    async fn submit(&self, token: &Token) -> anyhow::Result<Outcome>;
}

/// Run the exchange protocol once against `store`.
pub async fn exchange(
    store: &TokenStore,
    request: &ExchangeRequest,
    submitter: &dyn Submitter,
) -> Result<serde_json::Value, ExchangeError> {
    let mut candidate = store
        .latest(Some(request.preferred_class), request.freshness_window)
        .await
        .ok_or(ExchangeError::NoUsableToken)?;

    let mut rejected: HashSet<String> = HashSet::new();
    let mut attempts_used: u32 = 0;

    loop {
        attempts_used += 1;
        tracing::debug!(
            class = candidate.class.as_str(),
            seq = candidate.sequence_number,
            attempt = attempts_used,
            "submitting token"
        );

        let outcome = submitter
            .submit(&candidate)
            .await
            .map_err(|e| ExchangeError::Downstream(e.to_string()))?;

        match outcome {
            Outcome::Success(payload) => {
                if let Err(e) = store.consume(&candidate.value).await {
                    tracing::warn!(err = %e, "accepted token could not be removed from store");
                }
                tracing::info!(
                    class = candidate.class.as_str(),
                    attempts = attempts_used,
                    "exchange succeeded"
                );
                return Ok(payload);
            }
            Outcome::Other(reason) => return Err(ExchangeError::Downstream(reason)),
            Outcome::RejectedInvalidToken => {
                tracing::debug!(
                    class = candidate.class.as_str(),
                    seq = candidate.sequence_number,
                    "token rejected"
                );
                if attempts_used >= request.max_attempts {
                    return Err(ExchangeError::Exhausted);
                }
                rejected.insert(candidate.value.clone());

                // Freshest fallback first, then a *different* fresh
                // preferred token; anything already rejected is off limits.
                let fallback = store
                    .latest(Some(request.fallback_class), request.fallback_freshness_window)
                    .await
                    .filter(|t| !rejected.contains(&t.value));
                candidate = match fallback {
                    Some(t) => t,
                    None => store
                        .latest(Some(request.preferred_class), request.freshness_window)
                        .await
                        .filter(|t| !rejected.contains(&t.value))
                        .ok_or(ExchangeError::Exhausted)?,
                };
            }
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
