//! Secure credential persistence over the platform secret store.
//!
//! Credentials are serialized to JSON and written to the OS secret store
//! (macOS Keychain, Windows Credential Manager, Linux Secret Service) under
//! `service = consumer key`, `account = "{org id}:{user id}"`. A reserved
//! account per service holds the most recently used account so a caller can
//! ask for "the current credential" without naming a user.

use async_trait::async_trait;
use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

use crate::credential::{Credential, UserIdentifier};

/// Reserved account name holding the last-used account pointer for a service.
pub(crate) const LAST_USED_ACCOUNT: &str = "__last_used__";

/// Composite address of one credential in the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    /// Secret-store service: the connected app's consumer key.
    pub service: String,

    /// Secret-store account: `{org id}:{user id}`.
    pub account: String,
}

impl StoreKey {
    /// Address the credential of `user` under the given consumer key.
    #[must_use]
    pub fn new(consumer_key: &str, user: &UserIdentifier) -> Self {
        Self { service: consumer_key.to_string(), account: user.account() }
    }
}

/// Secret-store error kinds.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading an entry failed for a reason other than absence.
    #[error("secure store read failed: {0}")]
    ReadFailure(String),

    /// Writing an entry failed.
    #[error("secure store write failed: {0}")]
    WriteFailure(String),

    /// Deleting an entry failed for a reason other than absence.
    #[error("secure store delete failed: {0}")]
    DeleteFailure(String),

    /// No entry exists under the requested key. `retrieve` and `clear`
    /// absorb this internally; it never makes delete non-idempotent.
    #[error("no entry for this key")]
    ItemNotFound,

    /// The credential blob could not be serialized.
    #[error("credential serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence seam for credentials.
///
/// Absence is not an error at this layer: `retrieve` answers `None` for
/// missing or unreadable entries, and `clear` succeeds when there is nothing
/// to delete.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist `credential` under `key`, replacing any existing entry, and
    /// move the service's last-used pointer to `key`.
    async fn store(&self, credential: &Credential, key: &StoreKey) -> Result<(), StoreError>;

    /// Fetch the credential stored under `key`, if any.
    async fn retrieve(&self, key: &StoreKey) -> Result<Option<Credential>, StoreError>;

    /// Delete the entry under `key`. Deleting a missing entry succeeds.
    async fn clear(&self, key: &StoreKey) -> Result<(), StoreError>;

    /// The service's last-used key, if one was recorded.
    async fn last_key(&self, service: &str) -> Result<Option<StoreKey>, StoreError>;
}

/// Production store over the platform keychain via the `keyring` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringStore;

impl KeyringStore {
    /// Create a keyring-backed store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, account: &str) -> Result<Entry, StoreError> {
        Entry::new(service, account)
            .map_err(|e| StoreError::WriteFailure(format!("cannot address {account}: {e}")))
    }

    fn read_entry(service: &str, account: &str) -> Result<String, StoreError> {
        let entry = Entry::new(service, account)
            .map_err(|e| StoreError::ReadFailure(format!("cannot address {account}: {e}")))?;
        entry.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => StoreError::ItemNotFound,
            other => StoreError::ReadFailure(format!("{account}: {other}")),
        })
    }

    fn delete_entry(service: &str, account: &str) -> Result<(), StoreError> {
        let entry = Entry::new(service, account)
            .map_err(|e| StoreError::DeleteFailure(format!("cannot address {account}: {e}")))?;
        if let Err(e) = entry.delete_credential() {
            if !matches!(e, keyring::Error::NoEntry) {
                return Err(StoreError::DeleteFailure(format!("{account}: {e}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn store(&self, credential: &Credential, key: &StoreKey) -> Result<(), StoreError> {
        debug!(service = %key.service, account = %key.account, "storing credential");

        let blob = serde_json::to_string(credential)?;
        // set_password updates in place when the entry already exists.
        let entry = Self::entry(&key.service, &key.account)?;
        entry
            .set_password(&blob)
            .map_err(|e| StoreError::WriteFailure(format!("{}: {e}", key.account)))?;

        let pointer = Self::entry(&key.service, LAST_USED_ACCOUNT)?;
        pointer
            .set_password(&key.account)
            .map_err(|e| StoreError::WriteFailure(format!("last-used pointer: {e}")))?;

        Ok(())
    }

    async fn retrieve(&self, key: &StoreKey) -> Result<Option<Credential>, StoreError> {
        let blob = match Self::read_entry(&key.service, &key.account) {
            Ok(blob) => blob,
            Err(StoreError::ItemNotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_str(&blob) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(
                    account = %key.account,
                    error = %e,
                    "stored credential is unreadable, treating as absent"
                );
                Ok(None)
            }
        }
    }

    async fn clear(&self, key: &StoreKey) -> Result<(), StoreError> {
        debug!(service = %key.service, account = %key.account, "deleting credential");

        Self::delete_entry(&key.service, &key.account)?;

        // Drop the pointer too when it references the deleted account, so a
        // later default lookup does not resolve to a gone entry.
        match Self::read_entry(&key.service, LAST_USED_ACCOUNT) {
            Ok(last) if last == key.account => {
                Self::delete_entry(&key.service, LAST_USED_ACCOUNT)?;
            }
            Ok(_) | Err(StoreError::ItemNotFound) => {}
            Err(e) => return Err(e),
        }

        Ok(())
    }

    async fn last_key(&self, service: &str) -> Result<Option<StoreKey>, StoreError> {
        match Self::read_entry(service, LAST_USED_ACCOUNT) {
            Ok(account) => Ok(Some(StoreKey { service: service.to_string(), account })),
            Err(StoreError::ItemNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
