//! Non-interactive token endpoints: refresh and revoke.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ConnectedAppConfig;
use crate::credential::{datetime_from_unix_millis, Credential};
use crate::error::AuthError;

/// Token endpoint response body for a refresh grant.
///
/// The provider sends `issued_at` as a string of unix epoch milliseconds and
/// never returns a refresh token on refresh.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    instance_url: String,
    id: String,
    issued_at: Option<String>,
}

/// Client for the provider's token and revocation endpoints.
#[derive(Debug, Clone)]
pub struct TokenFlow {
    config: ConnectedAppConfig,
    http: Client,
}

impl TokenFlow {
    /// Build a flow with a default HTTP client (30s timeout).
    #[must_use]
    pub fn new(config: ConnectedAppConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, http }
    }

    /// Build a flow around an existing HTTP client.
    #[must_use]
    pub fn with_client(config: ConnectedAppConfig, http: Client) -> Self {
        Self { config, http }
    }

    /// Exchange `credential`'s refresh token for a fresh access token.
    ///
    /// Fails fast with [`AuthError::RefreshTokenUnavailable`] when the
    /// credential carries no refresh token, without a network call. A non-2xx
    /// endpoint answer maps to [`AuthError::EndpointFailure`].
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::RefreshTokenUnavailable)?;

        let token_url = self.config.token_url()?;
        debug!(url = %token_url, "refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.consumer_key.as_str()),
            ("refresh_token", refresh_token),
            ("format", "json"),
        ];
        let response = self.http.post(token_url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token endpoint rejected refresh");
            return Err(AuthError::EndpointFailure { status: status.as_u16(), message });
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("refresh response unreadable: {e}")))?;

        let instance_url = Url::parse(&body.instance_url)
            .map_err(|e| AuthError::BadUrl(e.to_string()))?;
        let identity_url =
            Url::parse(&body.id).map_err(|e| AuthError::BadUrl(e.to_string()))?;
        let issued_at = body
            .issued_at
            .and_then(|millis| millis.parse::<i64>().ok())
            .and_then(datetime_from_unix_millis);

        // The provider omits the refresh token on refresh; carry the input
        // one over so the next refresh still works.
        Ok(Credential::new(
            body.access_token,
            instance_url,
            identity_url,
            credential.refresh_token.clone(),
            issued_at,
        ))
    }

    /// Invalidate `token` at the provider's revocation endpoint.
    ///
    /// Either token kind can be revoked; revoking the refresh token also
    /// invalidates access tokens derived from it.
    pub async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let revoke_url = self.config.revoke_url()?;
        debug!(url = %revoke_url, "revoking token");

        let form = [("token", token)];
        let response = self.http.post(revoke_url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::EndpointFailure { status: status.as_u16(), message });
        }

        Ok(())
    }
}
