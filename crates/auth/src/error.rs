//! Error taxonomy for the credential lifecycle.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the authorization flows and the credential manager.
///
/// Results of credential acquisition are fanned out to every concurrent
/// caller through a shared future, so this type is `Clone` and carries
/// rendered messages instead of source errors.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No usable credential and re-authentication was not permitted or
    /// did not succeed. The caller must obtain user interaction.
    #[error("user authentication required")]
    UserAuthenticationRequired,

    /// The credential holds no refresh token, so silent renewal is
    /// impossible. Detected before any network call.
    #[error("credential has no refresh token")]
    RefreshTokenUnavailable,

    /// The interactive web-authentication session could not be started or
    /// was abandoned before producing a callback.
    #[error("interactive login session failed: {0}")]
    SessionStartFailure(String),

    /// The callback URL returned by the login surface is missing required
    /// fields or is otherwise unusable.
    #[error("callback URL is unusable: {0}")]
    BadCallbackUrl(String),

    /// The identity URL does not end in the expected
    /// `/id/{org id}/{user id}` path segments.
    #[error("identity URL has no org/user path segments: {0}")]
    MalformedIdentityUrl(String),

    /// The token or revoke endpoint answered with a non-success status.
    #[error("token endpoint returned HTTP {status}: {message}")]
    EndpointFailure {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body, as far as it could be read.
        message: String,
    },

    /// Transport-level failure (connection, TLS, malformed response body).
    #[error("network failure: {0}")]
    Network(String),

    /// The secure credential store failed underneath the manager.
    #[error("credential store failure: {0}")]
    Store(String),

    /// A URL could not be built or parsed.
    #[error("invalid URL: {0}")]
    BadUrl(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        Self::BadUrl(err.to_string())
    }
}
