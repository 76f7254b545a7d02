// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration: load/save to JSON file with atomic writes.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Persisted exchange client configuration.
///
/// The session cookie is rewritten in place whenever the downstream
/// rotates it, so this file is both input and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Downstream submission endpoint.
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Name of the session cookie the downstream rotates, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
}

/// Load client configuration from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<ClientConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: ClientConfig = serde_json::from_str(&contents)?;
    Ok(config)
}

/// Save client configuration to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves racing
/// on the same `.tmp` file cannot leave trailing bytes from a longer
/// previous write.
pub fn save(path: &Path, config: &ClientConfig) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(config)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_replaces_atomically() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("exchange.json");
        let config = ClientConfig {
            endpoint: "http://127.0.0.1:9000/verify".to_owned(),
            session_id: Some("sess-1".to_owned()),
            session_cookie_name: Some("sid".to_owned()),
            session_cookie: None,
        };
        save(&path, &config)?;

        let mut loaded = load(&path)?;
        assert_eq!(loaded.endpoint, config.endpoint);
        assert_eq!(loaded.session_id.as_deref(), Some("sess-1"));
        assert_eq!(loaded.session_cookie, None);

        loaded.session_cookie = Some("rotated".to_owned());
        save(&path, &loaded)?;
        let reloaded = load(&path)?;
        assert_eq!(reloaded.session_cookie.as_deref(), Some("rotated"));

        // No temp droppings left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/exchange.json")).is_err());
    }
}
