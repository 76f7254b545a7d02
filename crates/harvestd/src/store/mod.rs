// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, deduplicated token store shared by the harvesting daemon and
//! the exchange client.
//!
//! All operations go through one async mutex and re-read the canonical
//! file before acting, so a concurrently running peer process (the other
//! side of the harvest/exchange split) is always observed. Mutations
//! additionally hold an exclusive advisory lock on a sidecar file across
//! their load → mutate → save window, so peer-process read-modify-writes
//! never overwrite each other. Persistence is an atomic full-file
//! replacement; readers need no lock because a half-written file can
//! never be observed.

pub mod persist;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::store::persist::PersistedTokens;

/// Token class, by how the token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    /// Solved interactive challenge.
    Primary,
    /// Passive periodic harvest.
    Secondary,
    /// Captured during agent session setup.
    Bootstrap,
}

impl TokenClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Bootstrap => "bootstrap",
        }
    }
}

impl std::str::FromStr for TokenClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            "bootstrap" => Ok(Self::Bootstrap),
            other => anyhow::bail!("unknown token class: {other}"),
        }
    }
}

impl std::fmt::Display for TokenClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One harvested token. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub value: String,
    pub class: TokenClass,
    pub origin_action: String,
    pub source_agent_id: u32,
    /// Strictly increasing across the store lifetime; defines recency
    /// order independent of clock skew.
    pub sequence_number: u64,
    /// Epoch millis (UTC) at append time.
    pub created_at_ms: u64,
}

/// Fields accepted from a harvester when appending. Everything else on
/// the ingestion payload is ignored, not stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewToken {
    pub value: String,
    pub class: TokenClass,
    #[serde(default)]
    pub origin_action: String,
    #[serde(default)]
    pub source_agent_id: u32,
}

/// Handle to the durable token collection at a fixed path.
pub struct TokenStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    /// Monotonic floor for sequence assignment. Seeded from the highest
    /// persisted sequence at open so numbers never regress after a
    /// `consume` removes the current maximum.
    next_seq: u64,
}

impl TokenStore {
    /// Open the store at `path`, rehydrating the sequence floor from any
    /// existing file. The file itself is not created until first append.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = persist::load_or_default(&path);
        let next_seq = data.tokens.iter().map(|t| t.sequence_number).max().map_or(1, |m| m + 1);
        Self { path, inner: Mutex::new(StoreInner { next_seq }) }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append a token, assigning the next sequence number. Returns the new
    /// total count. A live entry with the same value is replaced, never
    /// duplicated. Fails only if persistence fails; the previously
    /// persisted state is retained in that case.
    pub async fn append(&self, new: NewToken) -> anyhow::Result<usize> {
        let mut inner = self.inner.lock().await;
        let _excl = persist::exclusive_lock(&self.path)?;
        let mut data = persist::load_or_default(&self.path);

        // A peer process may have appended since our last look.
        let file_max = data.tokens.iter().map(|t| t.sequence_number).max().unwrap_or(0);
        let seq = inner.next_seq.max(file_max + 1);

        data.tokens.retain(|t| t.value != new.value);
        data.tokens.push(Token {
            value: new.value,
            class: new.class,
            origin_action: new.origin_action,
            source_agent_id: new.source_agent_id,
            sequence_number: seq,
            created_at_ms: epoch_ms(),
        });
        data.total_count = data.tokens.len();
        data.last_updated_ms = epoch_ms();
        persist::save(&self.path, &data)?;

        inner.next_seq = seq + 1;
        Ok(data.total_count)
    }

    /// Snapshot of all live tokens in insertion order.
    pub async fn list_all(&self) -> Vec<Token> {
        let _inner = self.inner.lock().await;
        persist::load_or_default(&self.path).tokens
    }

    /// Current live token count.
    pub async fn total_count(&self) -> usize {
        let _inner = self.inner.lock().await;
        persist::load_or_default(&self.path).tokens.len()
    }

    /// The token with the greatest sequence number matching `class` (any
    /// class when `None`) whose age is at most `max_age`. A zero `max_age`
    /// skips the age check entirely. The boundary at exactly `max_age` is
    /// inclusive.
    pub async fn latest(&self, class: Option<TokenClass>, max_age: Duration) -> Option<Token> {
        let _inner = self.inner.lock().await;
        let data = persist::load_or_default(&self.path);
        let now = epoch_ms();
        data.tokens
            .into_iter()
            .filter(|t| class.map_or(true, |c| t.class == c))
            .filter(|t| {
                max_age.is_zero() || now.saturating_sub(t.created_at_ms) <= max_age.as_millis() as u64
            })
            .max_by_key(|t| t.sequence_number)
    }

    /// Remove the token with the given value. Returns whether a removal
    /// occurred; consuming an absent value is not an error.
    pub async fn consume(&self, value: &str) -> anyhow::Result<bool> {
        let _inner = self.inner.lock().await;
        let _excl = persist::exclusive_lock(&self.path)?;
        let mut data = persist::load_or_default(&self.path);
        let before = data.tokens.len();
        data.tokens.retain(|t| t.value != value);
        if data.tokens.len() == before {
            return Ok(false);
        }
        data.total_count = data.tokens.len();
        data.last_updated_ms = epoch_ms();
        persist::save(&self.path, &data)?;
        Ok(true)
    }

    /// Discard every token. Returns how many were removed.
    pub async fn clear(&self) -> anyhow::Result<usize> {
        let _inner = self.inner.lock().await;
        let _excl = persist::exclusive_lock(&self.path)?;
        let mut data = persist::load_or_default(&self.path);
        let removed = data.tokens.len();
        data.tokens.clear();
        data.total_count = 0;
        data.last_updated_ms = epoch_ms();
        persist::save(&self.path, &data)?;
        Ok(removed)
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
