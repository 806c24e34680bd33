//! OAuth2 credential lifecycle for Salesforce client applications.
//!
//! This crate owns the hard part of talking to a Salesforce org from a
//! client app: obtaining a [`Credential`] through the user-agent login flow,
//! keeping it in the platform secret store, silently renewing it with the
//! refresh flow, and revoking it on logout. The [`CredentialManager`] at the
//! center guarantees that concurrent demand for a credential coalesces onto a
//! single in-flight acquisition, so an app never opens two login windows or
//! races two refresh calls against each other.
//!
//! # Collaborators
//!
//! Two seams are left to the embedding application:
//! - [`LoginSurface`]: turns an authorization URL into a callback URL by
//!   driving the platform's web-authentication session.
//! - [`CredentialStore`]: persists credentials; [`KeyringStore`] covers the
//!   platform keychains, and `testing::MemoryStore` covers tests.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod config;
pub mod credential;
pub mod error;
pub mod login;
pub mod manager;
pub mod store;
pub mod token;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use config::{
    ConnectedAppConfig, DEFAULT_API_VERSION, PRODUCTION_AUTH_ORIGIN, SANDBOX_AUTH_ORIGIN,
};
pub use credential::{Credential, UserIdentifier};
pub use error::AuthError;
pub use login::{LoginSurface, UserAgentFlow};
pub use manager::CredentialManager;
pub use store::{CredentialStore, KeyringStore, StoreError, StoreKey};
pub use token::TokenFlow;
