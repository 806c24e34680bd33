//! Mock implementations of the credential seams for testing.
//!
//! Available to downstream crates behind the `test-utils` feature.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::credential::Credential;
use crate::error::AuthError;
use crate::login::LoginSurface;
use crate::store::{CredentialStore, StoreError, StoreKey, LAST_USED_ACCOUNT};

/// Map of `(service, account)` to stored blob.
type StorageData = Arc<Mutex<HashMap<(String, String), String>>>;

/// In-memory [`CredentialStore`] with the keyring store's entry layout,
/// including the per-service last-used pointer.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: StorageData,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw blob under `key`, bypassing serialization.
    pub fn put_raw(&self, key: &StoreKey, blob: &str) {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let mut data = self.data.lock().unwrap();
        data.insert((key.service.clone(), key.account.clone()), blob.to_string());
    }

    /// The raw blob stored under `key`, if any.
    #[must_use]
    pub fn raw(&self, key: &StoreKey) -> Option<String> {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let data = self.data.lock().unwrap();
        data.get(&(key.service.clone(), key.account.clone())).cloned()
    }

    /// Number of entries, pointer entries included.
    #[must_use]
    pub fn len(&self) -> usize {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.data.lock().unwrap().len()
    }

    /// Whether the store holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn store(&self, credential: &Credential, key: &StoreKey) -> Result<(), StoreError> {
        let blob = serde_json::to_string(credential)?;
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let mut data = self.data.lock().unwrap();
        data.insert((key.service.clone(), key.account.clone()), blob);
        data.insert(
            (key.service.clone(), LAST_USED_ACCOUNT.to_string()),
            key.account.clone(),
        );
        Ok(())
    }

    async fn retrieve(&self, key: &StoreKey) -> Result<Option<Credential>, StoreError> {
        let blob = {
            // SAFETY: Mutex poisoning is acceptable in test mocks
            let data = self.data.lock().unwrap();
            data.get(&(key.service.clone(), key.account.clone())).cloned()
        };
        match blob {
            Some(blob) => Ok(serde_json::from_str(&blob).ok()),
            None => Ok(None),
        }
    }

    async fn clear(&self, key: &StoreKey) -> Result<(), StoreError> {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let mut data = self.data.lock().unwrap();
        data.remove(&(key.service.clone(), key.account.clone()));

        let pointer = (key.service.clone(), LAST_USED_ACCOUNT.to_string());
        if data.get(&pointer) == Some(&key.account) {
            data.remove(&pointer);
        }
        Ok(())
    }

    async fn last_key(&self, service: &str) -> Result<Option<StoreKey>, StoreError> {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let data = self.data.lock().unwrap();
        Ok(data
            .get(&(service.to_string(), LAST_USED_ACCOUNT.to_string()))
            .map(|account| StoreKey {
                service: service.to_string(),
                account: account.clone(),
            }))
    }
}

struct SurfaceState {
    script: Mutex<VecDeque<Result<Url, AuthError>>>,
    seen: Mutex<Vec<Url>>,
    latency: Mutex<Option<Duration>>,
    echo_state: AtomicBool,
    sessions: AtomicUsize,
}

/// Scripted [`LoginSurface`] that answers sessions from a queue.
///
/// Each session pops the next scripted outcome; an exhausted script fails
/// the session, which makes accidental extra logins visible in tests.
/// Clones share the script and counters.
#[derive(Clone)]
pub struct ScriptedLoginSurface {
    state: Arc<SurfaceState>,
}

impl ScriptedLoginSurface {
    /// Create a surface with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(SurfaceState {
                script: Mutex::new(VecDeque::new()),
                seen: Mutex::new(Vec::new()),
                latency: Mutex::new(None),
                echo_state: AtomicBool::new(false),
                sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// Delay each session by `latency` before it resolves.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        *self.state.latency.lock().unwrap() = Some(latency);
        self
    }

    /// Echo the authorize URL's `state` parameter into each callback
    /// fragment, the way the real provider does.
    #[must_use]
    pub fn echoing_state(self) -> Self {
        self.state.echo_state.store(true, Ordering::SeqCst);
        self
    }

    /// Script the next session to resolve with `callback`.
    pub fn push_callback(&self, callback: Url) {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.state.script.lock().unwrap().push_back(Ok(callback));
    }

    /// Script the next session to fail with `error`.
    pub fn push_failure(&self, error: AuthError) {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.state.script.lock().unwrap().push_back(Err(error));
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// The authorize URL of the most recent session.
    #[must_use]
    pub fn last_authorize_url(&self) -> Option<Url> {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.state.seen.lock().unwrap().last().cloned()
    }

    fn echo_state_into(authorize_url: &Url, mut callback: Url) -> Url {
        let Some(state) = authorize_url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
        else {
            return callback;
        };
        let fragment = callback.fragment().unwrap_or_default().to_string();
        let echoed = if fragment.is_empty() {
            format!("state={state}")
        } else {
            format!("{fragment}&state={state}")
        };
        callback.set_fragment(Some(&echoed));
        callback
    }
}

impl Default for ScriptedLoginSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoginSurface for ScriptedLoginSurface {
    async fn authenticate(
        &self,
        authorize_url: Url,
        _callback_scheme: &str,
    ) -> Result<Url, AuthError> {
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        {
            // SAFETY: Mutex poisoning is acceptable in test mocks
            self.state.seen.lock().unwrap().push(authorize_url.clone());
        }

        let latency = {
            // SAFETY: Mutex poisoning is acceptable in test mocks
            *self.state.latency.lock().unwrap()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let next = {
            // SAFETY: Mutex poisoning is acceptable in test mocks
            self.state.script.lock().unwrap().pop_front()
        };
        match next {
            Some(Ok(callback)) => {
                if self.state.echo_state.load(Ordering::SeqCst) {
                    Ok(Self::echo_state_into(&authorize_url, callback))
                } else {
                    Ok(callback)
                }
            }
            Some(Err(error)) => Err(error),
            None => Err(AuthError::SessionStartFailure(
                "login surface script exhausted".to_string(),
            )),
        }
    }
}

/// A plausible credential for tests, refresh token included.
#[must_use]
pub fn test_credential(access_token: &str) -> Credential {
    Credential::new(
        access_token.to_string(),
        Url::parse("https://na1.example.com").expect("static URL is valid"),
        Url::parse("https://login.example.com/id/00Dx0000000BV7z/005x00000012Q9P")
            .expect("static URL is valid"),
        Some("refresh-1".to_string()),
        None,
    )
}
