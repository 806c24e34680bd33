//! Connected-app configuration and OAuth endpoint URLs.
//!
//! A [`ConnectedAppConfig`] is created once at startup and never mutated. It
//! identifies the client application to the identity provider (consumer key
//! and callback URL) and pins the authorization host and REST API version
//! every other component derives its URLs from.

use url::Url;

use crate::error::AuthError;

/// Login origin for production orgs.
pub const PRODUCTION_AUTH_ORIGIN: &str = "https://login.salesforce.com";

/// Login origin for sandbox orgs.
pub const SANDBOX_AUTH_ORIGIN: &str = "https://test.salesforce.com";

/// REST API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "v59.0";

const AUTHORIZE_PATH: &str = "/services/oauth2/authorize";
const TOKEN_PATH: &str = "/services/oauth2/token";
const REVOKE_PATH: &str = "/services/oauth2/revoke";

/// Immutable configuration for one connected app.
///
/// # Examples
/// ```
/// use forcekit_auth::ConnectedAppConfig;
/// use url::Url;
///
/// let callback = Url::parse("myapp://auth/callback").unwrap();
/// let config = ConnectedAppConfig::new("3MVG9...consumer-key", callback);
///
/// assert_eq!(config.callback_scheme(), "myapp");
/// assert_eq!(config.api_version, "v59.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAppConfig {
    /// Consumer key of the connected app (OAuth client id).
    pub consumer_key: String,

    /// Redirect target registered for the app, usually a custom scheme.
    pub callback_url: Url,

    /// Origin of the authorization server, e.g.
    /// `https://login.salesforce.com`. Overridable for sandboxes, My Domain
    /// hosts, and test servers.
    pub auth_origin: String,

    /// REST API version, e.g. `v59.0`.
    pub api_version: String,
}

impl ConnectedAppConfig {
    /// Create a configuration pointing at the production login origin.
    #[must_use]
    pub fn new(consumer_key: impl Into<String>, callback_url: Url) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            callback_url,
            auth_origin: PRODUCTION_AUTH_ORIGIN.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Create a configuration pointing at the sandbox login origin.
    #[must_use]
    pub fn sandbox(consumer_key: impl Into<String>, callback_url: Url) -> Self {
        Self::new(consumer_key, callback_url).with_auth_origin(SANDBOX_AUTH_ORIGIN)
    }

    /// Replace the authorization origin, e.g. with a My Domain host or a
    /// local mock server.
    #[must_use]
    pub fn with_auth_origin(mut self, origin: impl Into<String>) -> Self {
        self.auth_origin = origin.into();
        self
    }

    /// Replace the REST API version.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Scheme of the callback URL, handed to the login surface so it knows
    /// which redirect ends the session.
    #[must_use]
    pub fn callback_scheme(&self) -> &str {
        self.callback_url.scheme()
    }

    /// Build the user-agent flow authorization URL.
    ///
    /// The provider is asked for a token response delivered in the callback
    /// fragment, with a touch-friendly login-and-consent prompt. `state` is
    /// echoed back by the provider; `login_hint` pre-fills the username.
    ///
    /// # Errors
    /// Returns [`AuthError::BadUrl`] when the configured origin is not a
    /// valid URL.
    pub fn authorize_url(
        &self,
        state: Option<&str>,
        login_hint: Option<&str>,
    ) -> Result<Url, AuthError> {
        let mut params = vec![
            ("response_type", "token".to_string()),
            ("client_id", self.consumer_key.clone()),
            ("redirect_uri", self.callback_url.to_string()),
            ("prompt", "login consent".to_string()),
            ("display", "touch".to_string()),
        ];

        if let Some(state) = state {
            params.push(("state", state.to_string()));
        }
        if let Some(hint) = login_hint {
            params.push(("login_hint", hint.to_string()));
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut url = self.endpoint(AUTHORIZE_PATH)?;
        url.set_query(Some(&query));
        Ok(url)
    }

    /// URL of the token endpoint (refresh grants).
    ///
    /// # Errors
    /// Returns [`AuthError::BadUrl`] when the configured origin is not a
    /// valid URL.
    pub fn token_url(&self) -> Result<Url, AuthError> {
        self.endpoint(TOKEN_PATH)
    }

    /// URL of the revoke endpoint.
    ///
    /// # Errors
    /// Returns [`AuthError::BadUrl`] when the configured origin is not a
    /// valid URL.
    pub fn revoke_url(&self) -> Result<Url, AuthError> {
        self.endpoint(REVOKE_PATH)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        let origin = Url::parse(&self.auth_origin)
            .map_err(|e| AuthError::BadUrl(format!("{}: {e}", self.auth_origin)))?;
        origin.join(path).map_err(|e| AuthError::BadUrl(format!("{path}: {e}")))
    }
}
