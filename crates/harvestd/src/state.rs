// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::supervisor::SessionSupervisor;
use crate::config::HarvestConfig;
use crate::store::TokenStore;

/// Shared daemon state handed to the router.
pub struct AppState {
    pub supervisor: Arc<SessionSupervisor>,
    pub store: Arc<TokenStore>,
    pub config: Arc<HarvestConfig>,
    pub shutdown: CancellationToken,
}
