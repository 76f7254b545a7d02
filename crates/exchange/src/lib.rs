// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exchange client: consumes tokens from a harvestd store and submits
//! them to a downstream verifier with bounded retry and class fallback.

pub mod client;
pub mod config;
pub mod protocol;
