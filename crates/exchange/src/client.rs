// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP submitter for the downstream verifier.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::Client;

use harvestd::store::Token;

use crate::config::{self, ClientConfig};
use crate::protocol::{Outcome, Submitter};

/// Submits tokens to the downstream endpoint and keeps the session
/// cookie in the config file current when the server rotates it.
pub struct DownstreamClient {
    config_path: PathBuf,
    config: Mutex<ClientConfig>,
    http: Client,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl DownstreamClient {
    pub fn new(config_path: PathBuf) -> anyhow::Result<Self> {
        let config = config::load(&config_path)?;
        let http = Client::builder().timeout(std::time::Duration::from_secs(30)).build()?;
        Ok(Self { config_path, config: Mutex::new(config), http })
    }

    fn cookie_header(config: &ClientConfig) -> Option<String> {
        match (&config.session_cookie_name, &config.session_cookie) {
            (Some(name), Some(value)) => Some(format!("{name}={value}")),
            _ => None,
        }
    }

    /// Persist a rotated session cookie back to the config file.
    fn store_rotated_cookie(&self, value: String) {
        let snapshot = {
            let mut config = lock(&self.config);
            if config.session_cookie.as_deref() == Some(value.as_str()) {
                return;
            }
            config.session_cookie = Some(value);
            config.clone()
        };
        if let Err(e) = config::save(&self.config_path, &snapshot) {
            tracing::warn!(err = %e, "rotated session cookie could not be persisted");
        } else {
            tracing::debug!("session cookie rotated");
        }
    }
}

#[async_trait]
impl Submitter for DownstreamClient {
    async fn submit(&self, token: &Token) -> anyhow::Result<Outcome> {
        let (endpoint, session_id, cookie, cookie_name) = {
            let config = lock(&self.config);
            (
                config.endpoint.clone(),
                config.session_id.clone(),
                Self::cookie_header(&config),
                config.session_cookie_name.clone(),
            )
        };

        let body = serde_json::json!({
            "token": token.value,
            "class": token.class.as_str(),
            "session_id": session_id,
        });
        let mut req = self.http.post(&endpoint).json(&body);
        if let Some(cookie) = cookie {
            req = req.header(reqwest::header::COOKIE, cookie);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();

        if let Some(name) = cookie_name {
            if let Some(rotated) = rotated_cookie(resp.headers(), &name) {
                self.store_rotated_cookie(rotated);
            }
        }

        let bytes = resp.bytes().await?;
        Ok(classify(status, &bytes))
    }
}

/// Map one downstream response to a protocol outcome.
///
/// The rejection signal is specifically a 403 whose JSON body says the
/// token failed validation; any other non-2xx is a non-token failure.
pub fn classify(status: u16, body: &[u8]) -> Outcome {
    if (200..300).contains(&status) {
        let payload = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
        return Outcome::Success(payload);
    }
    if status == 403 && is_token_rejection(body) {
        return Outcome::RejectedInvalidToken;
    }
    let snippet = String::from_utf8_lossy(&body[..body.len().min(200)]).into_owned();
    Outcome::Other(format!("status {status}: {snippet}"))
}

fn is_token_rejection(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .is_some_and(|msg| msg == "token validation failed")
}

/// Extract a rotated value for `name` from `Set-Cookie` headers.
fn rotated_cookie(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| {
            let pair = raw.split(';').next()?.trim();
            let value = pair.strip_prefix(name)?.strip_prefix('=')?;
            Some(value.to_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_loads_config_and_builds_client() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("exchange.json");
        crate::config::save(
            &path,
            &ClientConfig {
                endpoint: "http://127.0.0.1:9000/verify".to_owned(),
                session_id: None,
                session_cookie_name: None,
                session_cookie: None,
            },
        )?;
        let _client = DownstreamClient::new(path)?;
        Ok(())
    }

    #[test]
    fn success_carries_json_payload() -> anyhow::Result<()> {
        let Outcome::Success(payload) = classify(200, br#"{"result": "accepted"}"#) else {
            anyhow::bail!("expected a success outcome");
        };
        assert_eq!(payload["result"], "accepted");
        Ok(())
    }

    #[test]
    fn empty_success_body_is_null_payload() {
        assert!(matches!(classify(204, b""), Outcome::Success(serde_json::Value::Null)));
    }

    #[test]
    fn rejection_requires_exact_403_signature() {
        assert!(matches!(
            classify(403, br#"{"error": "token validation failed"}"#),
            Outcome::RejectedInvalidToken
        ));
        // A 403 for any other reason is not a token rejection.
        assert!(matches!(classify(403, br#"{"error": "ip blocked"}"#), Outcome::Other(_)));
        assert!(matches!(classify(403, b"forbidden"), Outcome::Other(_)));
        // The signature body under a different status is not a rejection.
        assert!(matches!(
            classify(500, br#"{"error": "token validation failed"}"#),
            Outcome::Other(_)
        ));
    }

    #[test]
    fn other_statuses_surface_with_snippet() -> anyhow::Result<()> {
        let Outcome::Other(msg) = classify(502, b"upstream down") else {
            anyhow::bail!("expected a non-token failure outcome");
        };
        assert!(msg.contains("502"), "{msg}");
        assert!(msg.contains("upstream down"), "{msg}");
        Ok(())
    }

    #[test]
    fn rotated_cookie_is_extracted_by_name() -> anyhow::Result<()> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.append(reqwest::header::SET_COOKIE, "other=1; Path=/".parse()?);
        headers
            .append(reqwest::header::SET_COOKIE, "sid=fresh-value; HttpOnly; Path=/".parse()?);
        assert_eq!(rotated_cookie(&headers, "sid").as_deref(), Some("fresh-value"));
        assert_eq!(rotated_cookie(&headers, "missing"), None);
        Ok(())
    }
}
