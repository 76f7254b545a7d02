// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token file persistence: load/save to JSON with atomic writes.

use std::fs::OpenOptions;
use std::path::Path;

use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};

use crate::store::Token;

/// The durable representation of the token collection.
///
/// This is the file both the harvesting daemon and the exchange client
/// read and write; it must stay parseable across restarts of either side.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedTokens {
    pub tokens: Vec<Token>,
    pub total_count: usize,
    /// Epoch millis of the last mutation.
    #[serde(default)]
    pub last_updated_ms: u64,
}

/// Load the token file, or return an empty collection when the file is
/// missing or unparseable (a half-written file can never exist on disk
/// thanks to the atomic replace in [`save`], so corrupt means external
/// tampering and is treated as empty rather than fatal).
pub fn load_or_default(path: &Path) -> PersistedTokens {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => PersistedTokens::default(),
    }
}

/// Save the token collection atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) to avoid corruption when
/// concurrent saves race on the same `.tmp` file — a shorter write can leave
/// trailing bytes from a longer previous write.
pub fn save(path: &Path, data: &PersistedTokens) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(data)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Exclusive advisory lock on the sidecar `<stem>.lock` file, held for one
/// load → mutate → save cycle. The daemon and the exchange client mutate
/// the same token file from separate processes; without this a
/// read-modify-write from one side can overwrite the other's just-saved
/// state. Released on drop.
pub fn exclusive_lock(path: &Path) -> anyhow::Result<Flock<std::fs::File>> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new().create(true).write(true).open(&lock_path)?;
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_file, errno)| {
        anyhow::anyhow!("flock on {} failed: {errno}", lock_path.display())
    })
}
