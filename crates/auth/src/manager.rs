//! Credential lifecycle orchestration with single-flight acquisition.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::ConnectedAppConfig;
use crate::credential::Credential;
use crate::error::AuthError;
use crate::login::{LoginSurface, UserAgentFlow};
use crate::store::{CredentialStore, StoreKey};
use crate::token::TokenFlow;

type SharedGrant = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;
type SharedRevocation = Shared<BoxFuture<'static, Result<(), AuthError>>>;

/// Owner of the credential lifecycle for one connected app.
///
/// The manager ties together the secret store, the interactive login
/// surface, and the token endpoints. Its one hard guarantee is single
/// flight: no matter how many tasks ask for a credential at once, at most
/// one refresh-or-login operation runs, and every concurrent caller
/// receives that operation's result. The parameters of the first caller
/// win; joiners' arguments are ignored.
///
/// Cloning is cheap and all clones share the same in-flight state.
pub struct CredentialManager<S, L> {
    inner: Arc<Inner<S, L>>,
}

impl<S, L> Clone for CredentialManager<S, L> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<S, L> {
    config: ConnectedAppConfig,
    store: S,
    surface: L,
    tokens: TokenFlow,
    login: UserAgentFlow,
    in_flight: Mutex<Option<SharedGrant>>,
    revocation: Mutex<Option<SharedRevocation>>,
    // Hot copy of the store's last-used pointer, filled on first use.
    last_key: RwLock<Option<StoreKey>>,
}

impl<S, L> CredentialManager<S, L>
where
    S: CredentialStore + 'static,
    L: LoginSurface + 'static,
{
    /// Build a manager over the given store and login surface.
    #[must_use]
    pub fn new(config: ConnectedAppConfig, store: S, surface: L) -> Self {
        let tokens = TokenFlow::new(config.clone());
        let login = UserAgentFlow::new(config.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                surface,
                tokens,
                login,
                in_flight: Mutex::new(None),
                revocation: Mutex::new(None),
                last_key: RwLock::new(None),
            }),
        }
    }

    /// The connected app this manager authenticates for.
    #[must_use]
    pub fn config(&self) -> &ConnectedAppConfig {
        &self.inner.config
    }

    /// The last-used credential from the store, without any network traffic.
    pub async fn cached_credential(&self) -> Result<Option<Credential>, AuthError> {
        match self.inner.current_key().await? {
            Some(key) => Ok(self.inner.store.retrieve(&key).await?),
            None => Ok(None),
        }
    }

    /// Acquire a usable credential, joining any acquisition already running.
    ///
    /// A fresh operation refreshes `replacing` when it carries a refresh
    /// token, and otherwise (or when the refresh is rejected) falls back to
    /// interactive login. With `allows_login` false the fallback is skipped
    /// and the caller gets [`AuthError::UserAuthenticationRequired`] instead
    /// of a login prompt. The winning credential is persisted before it is
    /// returned.
    pub async fn grant_credential(
        &self,
        replacing: Option<Credential>,
        allows_login: bool,
    ) -> Result<Credential, AuthError> {
        let grant = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(running) => {
                    debug!("joining in-flight credential acquisition");
                    running.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let fresh = async move {
                        let result = inner.acquire(replacing, allows_login).await;
                        // Empty the slot before resolving so a later caller
                        // can never join an already-finished operation.
                        *inner.in_flight.lock().await = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };
        grant.await
    }

    /// Revoke `credential` remotely and delete it locally.
    ///
    /// Remote revocation is best effort: endpoint failures are logged and
    /// the local deletion still happens, so a signed-out user never keeps a
    /// resurrectable credential on disk. Concurrent calls join the same
    /// revocation.
    pub async fn revoke(&self, credential: &Credential) -> Result<(), AuthError> {
        let revocation = {
            let mut slot = self.inner.revocation.lock().await;
            match slot.as_ref() {
                Some(running) => {
                    debug!("joining in-flight revocation");
                    running.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let credential = credential.clone();
                    let fresh = async move {
                        let result = inner.revoke_and_clear(&credential).await;
                        *inner.revocation.lock().await = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };
        revocation.await
    }

    /// Revoke the last-used credential, if any.
    pub async fn log_out(&self) -> Result<(), AuthError> {
        match self.cached_credential().await? {
            Some(credential) => self.revoke(&credential).await,
            None => Ok(()),
        }
    }
}

impl<S, L> Inner<S, L>
where
    S: CredentialStore,
    L: LoginSurface,
{
    async fn acquire(
        &self,
        replacing: Option<Credential>,
        allows_login: bool,
    ) -> Result<Credential, AuthError> {
        let refreshed = match replacing.as_ref() {
            Some(old) if old.can_refresh() => self.tokens.refresh(old).await,
            _ => Err(AuthError::RefreshTokenUnavailable),
        };

        let refresh_err = match refreshed {
            Ok(fresh) => {
                self.persist(&fresh).await?;
                info!(user = ?fresh.user_id(), "access token refreshed");
                return Ok(fresh);
            }
            Err(err) => err,
        };

        if !allows_login {
            debug!(error = %refresh_err, "refresh unavailable and login is disallowed");
            return Err(AuthError::UserAuthenticationRequired);
        }

        debug!(error = %refresh_err, "refresh unavailable, starting interactive login");
        let fresh = self.login.run(&self.surface, None).await?;
        self.persist(&fresh).await?;
        info!(user = ?fresh.user_id(), "interactive login completed");
        Ok(fresh)
    }

    async fn persist(&self, credential: &Credential) -> Result<(), AuthError> {
        let identifier = credential.identifier()?;
        let key = StoreKey::new(&self.config.consumer_key, &identifier);
        self.store.store(credential, &key).await?;
        *self.last_key.write().await = Some(key);
        Ok(())
    }

    async fn current_key(&self) -> Result<Option<StoreKey>, AuthError> {
        if let Some(key) = self.last_key.read().await.clone() {
            return Ok(Some(key));
        }
        let recorded = self.store.last_key(&self.config.consumer_key).await?;
        if let Some(key) = &recorded {
            *self.last_key.write().await = Some(key.clone());
        }
        Ok(recorded)
    }

    async fn revoke_and_clear(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Err(err) = self.revoke_remote(credential).await {
            warn!(error = %err, "remote revocation failed, deleting local credential anyway");
        }

        let identifier = credential.identifier()?;
        let key = StoreKey::new(&self.config.consumer_key, &identifier);
        self.store.clear(&key).await?;

        let mut last = self.last_key.write().await;
        if last.as_ref() == Some(&key) {
            *last = None;
        }
        Ok(())
    }

    // Revoking the refresh token also kills access tokens minted from it,
    // so try it first and fall back to the access token.
    async fn revoke_remote(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(refresh) = credential.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            match self.tokens.revoke_token(refresh).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(error = %err, "refresh token revocation failed, revoking access token");
                }
            }
        }
        self.tokens.revoke_token(&credential.access_token).await
    }
}
