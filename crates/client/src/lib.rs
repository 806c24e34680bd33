//! Authenticated Salesforce REST pipeline.
//!
//! [`ConnectedApp`] pairs a credential manager from `forcekit-auth` with an
//! HTTP client and turns typed [`Resource`] descriptors into authenticated
//! requests. Expired sessions renew themselves in flight: an unauthorized
//! answer triggers one credential renewal and one retry, never more.
//!
//! The auth layer is re-exported as [`auth`] so applications need only one
//! direct dependency.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod app;
pub mod error;
pub mod records;
pub mod resource;

pub use forcekit_auth as auth;

pub use app::{ConnectedApp, RequestOptions};
pub use error::{ClientError, SalesforceError};
pub use records::{
    FieldValue, Identity, InsertResult, Limit, Photos, QueryResult, Record, SearchResult,
};
pub use resource::Resource;
