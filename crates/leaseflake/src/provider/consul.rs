//! A [`LockBackend`] implementation over Consul's HTTP session and KV APIs.
//!
//! This mirrors the calls a Consul-aware client makes by hand, since there
//! is no official Consul client crate: create a session with a TTL, acquire
//! a KV key under that session, renew the session periodically, and use a
//! blocking GET against the key to detect when the lock has been lost.

use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::provider::kv::{AcquireOutcome, LockBackend};

/// Configuration for a [`ConsulBackend`].
#[derive(Debug, Clone)]
pub struct ConsulBackendConfig {
    /// Base URL of the Consul HTTP API, e.g. `http://127.0.0.1:8500`.
    pub base_url: String,
    /// TTL given to the session backing any lock this backend acquires.
    /// Consul invalidates the session - and releases its locks - if it is
    /// not renewed within roughly twice this interval.
    pub session_ttl: Duration,
    /// Timeout applied to each individual HTTP request.
    pub request_timeout: Duration,
}

impl Default for ConsulBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8500".to_string(),
            session_ttl: Duration::from_secs(15),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Deserialize)]
struct SessionCreateResponse {
    #[serde(rename = "ID")]
    id: String,
}

/// A [`LockBackend`] backed by a real Consul agent, reached over its HTTP
/// API via a blocking [`reqwest::blocking::Client`].
///
/// One `ConsulBackend` holds at most one session and one acquired key at a
/// time, matching how [`crate::provider::LeasedProvider`] uses it.
pub struct ConsulBackend {
    client: reqwest::blocking::Client,
    config: ConsulBackendConfig,
    session_id: Mutex<Option<String>>,
    held_key: Mutex<Option<String>>,
}

impl ConsulBackend {
    /// Builds a backend pointed at `config.base_url`. Does not contact
    /// Consul until the first [`LockBackend::acquire`] call.
    pub fn new(config: ConsulBackendConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::BackendError(e.to_string()))?;
        Ok(Self {
            client,
            config,
            session_id: Mutex::new(None),
            held_key: Mutex::new(None),
        })
    }

    fn ensure_session(&self) -> Result<String> {
        let mut guard = self.session_id.lock().unwrap();
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }
        let url = format!("{}/v1/session/create", self.config.base_url);
        let body = serde_json::json!({
            "TTL": format!("{}s", self.config.session_ttl.as_secs()),
            "Behavior": "release",
        });
        let resp: SessionCreateResponse = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .map_err(|e| Error::BackendError(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::BackendError(e.to_string()))?
            .json()
            .map_err(|e| Error::BackendError(e.to_string()))?;
        *guard = Some(resp.id.clone());
        Ok(resp.id)
    }

    /// Forgets the current session and whatever key it was thought to hold,
    /// so the next [`LockBackend::acquire`] call mints a fresh session
    /// instead of reusing one Consul has already invalidated.
    fn forget_session(&self) {
        *self.session_id.lock().unwrap() = None;
        *self.held_key.lock().unwrap() = None;
    }
}

impl LockBackend for ConsulBackend {
    fn acquire(&self, key: &str) -> Result<AcquireOutcome> {
        let session = self.ensure_session()?;
        let url = format!("{}/v1/kv/{}?acquire={}", self.config.base_url, key, session);
        let acquired: bool = self
            .client
            .put(&url)
            .send()
            .map_err(|e| Error::BackendError(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::BackendError(e.to_string()))?
            .json()
            .map_err(|e| Error::BackendError(e.to_string()))?;

        if acquired {
            *self.held_key.lock().unwrap() = Some(key.to_string());
            Ok(AcquireOutcome::Acquired)
        } else {
            Ok(AcquireOutcome::Contended)
        }
    }

    fn renew(&self) -> Result<()> {
        let session = {
            let guard = self.session_id.lock().unwrap();
            guard.clone().ok_or_else(|| {
                Error::BackendError("renew called before any session was created".into())
            })?
        };
        let url = format!("{}/v1/session/renew/{}", self.config.base_url, session);
        let result = self
            .client
            .put(&url)
            .send()
            .map_err(|e| Error::BackendError(e.to_string()))
            .and_then(|resp| {
                resp.error_for_status()
                    .map_err(|e| Error::BackendError(format!("session renewal failed: {e}")))
            });

        // A failed renewal means Consul has already invalidated the session
        // (and released whatever it held). Forget it so the next acquire
        // mints a fresh one instead of repeatedly renewing a dead id.
        if result.is_err() {
            self.forget_session();
        }
        result.map(|_| ())
    }

    fn release(&self, key: &str) -> Result<()> {
        let session = self.session_id.lock().unwrap().clone();
        if let Some(session) = session {
            let url = format!("{}/v1/kv/{}?release={}", self.config.base_url, key, session);
            let _ = self.client.put(&url).send();
        }
        *self.held_key.lock().unwrap() = None;
        Ok(())
    }

    fn wait_for_loss(&self, timeout: Duration) -> Result<bool> {
        let Some(key) = self.held_key.lock().unwrap().clone() else {
            return Ok(true);
        };
        let url = format!(
            "{}/v1/kv/{}?wait={}s",
            self.config.base_url,
            key,
            timeout.as_secs().max(1)
        );
        #[derive(Deserialize)]
        struct KvEntry {
            #[serde(rename = "Session")]
            session: Option<String>,
        }
        let entries: Vec<KvEntry> = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::BackendError(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::BackendError(e.to_string()))?
            .json()
            .map_err(|e| Error::BackendError(e.to_string()))?;

        let current_session = self.session_id.lock().unwrap().clone();
        let still_ours = entries
            .first()
            .and_then(|e| e.session.as_ref())
            .is_some_and(|s| Some(s) == current_session.as_ref());

        if !still_ours {
            // The session that held this key is gone (expired or stolen);
            // mint a new one on the next acquire rather than reusing a
            // session Consul has already forgotten about.
            self.forget_session();
        }
        Ok(!still_ours)
    }
}
