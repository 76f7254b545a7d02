// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the harvest daemon.
#[derive(Debug, Clone, clap::Parser)]
pub struct HarvestConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "HARVESTD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5000, env = "HARVESTD_PORT")]
    pub port: u16,

    /// Bearer token for control-plane auth. If unset, auth is disabled.
    #[arg(long, env = "HARVESTD_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Number of supervised agents to create at startup.
    #[arg(long, default_value_t = 1, env = "HARVESTD_POOL_SIZE")]
    pub pool_size: u32,

    /// Path to the durable token file (shared with the exchange client).
    #[arg(long, default_value = "tokens.json", env = "HARVESTD_TOKENS_FILE")]
    pub tokens_file: std::path::PathBuf,

    /// Multiplex all agents over one shared runtime instance (tab
    /// topology) instead of one runtime per agent.
    #[arg(long, env = "HARVESTD_SHARED_RUNTIME")]
    pub shared_runtime: bool,

    /// Foreground rotation period in milliseconds (shared runtime only).
    #[arg(long, default_value_t = 15_000, env = "HARVESTD_ROTATION_MS")]
    pub rotation_ms: u64,

    /// How long to wait for an agent's external ready signal before
    /// marking it ready directly.
    #[arg(long, default_value_t = 90_000, env = "HARVESTD_READY_TIMEOUT_MS")]
    pub ready_timeout_ms: u64,

    /// Settle delay after a solved challenge before requesting the next.
    #[arg(long, default_value_t = 3_000, env = "HARVESTD_CHALLENGE_SETTLE_MS")]
    pub challenge_settle_ms: u64,

    /// Delay before re-presenting a failed or expired challenge.
    #[arg(long, default_value_t = 5_000, env = "HARVESTD_CHALLENGE_RETRY_MS")]
    pub challenge_retry_ms: u64,

    /// Lower bound of the randomized periodic-harvest interval, seconds.
    #[arg(long, default_value_t = 80, env = "HARVESTD_PERIODIC_MIN_SECS")]
    pub periodic_min_secs: u64,

    /// Upper bound of the randomized periodic-harvest interval, seconds.
    #[arg(long, default_value_t = 100, env = "HARVESTD_PERIODIC_MAX_SECS")]
    pub periodic_max_secs: u64,

    /// Base delay for periodic-harvest failure backoff, seconds.
    #[arg(long, default_value_t = 15, env = "HARVESTD_BACKOFF_BASE_SECS")]
    pub backoff_base_secs: u64,

    /// Cap for periodic-harvest failure backoff, seconds.
    #[arg(long, default_value_t = 300, env = "HARVESTD_BACKOFF_CAP_SECS")]
    pub backoff_cap_secs: u64,
}

impl HarvestConfig {
    pub fn rotation_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rotation_ms)
    }

    pub fn ready_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn challenge_settle(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.challenge_settle_ms)
    }

    pub fn challenge_retry(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.challenge_retry_ms)
    }
}
