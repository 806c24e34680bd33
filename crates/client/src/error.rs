//! Error taxonomy for the request pipeline.

use forcekit_auth::AuthError;
use serde::Deserialize;
use thiserror::Error;

/// Request pipeline errors.
///
/// Credential problems stay in their own [`AuthError`] shape and pass
/// through transparently. HTTP answers split into [`ClientError::Resource`]
/// when the body carries the provider's structured error array and
/// [`ClientError::Http`] when it does not.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credential acquisition or persistence failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The provider rejected the request with a structured error body.
    #[error("request rejected: {code} (HTTP {status}): {message}")]
    Resource {
        /// HTTP status of the rejection.
        status: u16,
        /// Provider error code, such as `REQUIRED_FIELD_MISSING`.
        code: String,
        /// Human-readable description from the provider.
        message: String,
        /// Record fields the error refers to, when any.
        fields: Vec<String>,
    },

    /// Non-2xx answer without a decodable error body.
    #[error("request failed with HTTP {status}")]
    Http {
        /// HTTP status of the answer.
        status: u16,
    },

    /// A payload could not be decoded into the requested shape.
    #[error("payload decoding failed: {0}")]
    Decoding(String),

    /// The request never produced an HTTP answer.
    #[error("network failure: {0}")]
    Network(String),

    /// A request URL could not be built.
    #[error("invalid URL: {0}")]
    BadUrl(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::BadUrl(err.to_string())
    }
}

/// One element of the provider's error array, as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct SalesforceError {
    /// Human-readable description.
    pub message: String,

    /// Stable machine code.
    #[serde(rename = "errorCode")]
    pub error_code: String,

    /// Fields the error refers to. Often absent.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ClientError {
    /// Classify a non-2xx answer from its status and raw body.
    ///
    /// Bodies that decode as a non-empty provider error array become
    /// [`ClientError::Resource`] with the first element's details; anything
    /// else becomes [`ClientError::Http`].
    #[must_use]
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        if let Ok(errors) = serde_json::from_slice::<Vec<SalesforceError>>(body) {
            if let Some(first) = errors.into_iter().next() {
                return Self::Resource {
                    status,
                    code: first.error_code,
                    message: first.message,
                    fields: first.fields,
                };
            }
        }
        Self::Http { status }
    }
}
