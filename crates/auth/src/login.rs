//! Interactive login over the OAuth2 user-agent flow.
//!
//! The flow opens the provider's authorize page in some user-visible surface
//! (system browser, embedded web view) and waits for the provider to redirect
//! to the app's callback URL with the credential fields in the fragment. The
//! surface itself is a seam: production embeds a browser, tests script the
//! callback.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tracing::debug;
use url::Url;

use crate::config::ConnectedAppConfig;
use crate::credential::Credential;
use crate::error::AuthError;

/// User-visible surface that can drive an authorize URL to its callback.
///
/// Implementations open `authorize_url`, let the user authenticate, and
/// resolve with the full callback URL once the provider redirects to the
/// app's `callback_scheme`. Cancellation and surface failures map to
/// [`AuthError::SessionStartFailure`].
#[async_trait]
pub trait LoginSurface: Send + Sync {
    /// Run one interactive session and return the callback URL it ended on.
    async fn authenticate(
        &self,
        authorize_url: Url,
        callback_scheme: &str,
    ) -> Result<Url, AuthError>;
}

/// One-shot runner for the user-agent flow.
#[derive(Debug, Clone)]
pub struct UserAgentFlow {
    config: ConnectedAppConfig,
}

impl UserAgentFlow {
    /// Build a flow for the given connected app.
    #[must_use]
    pub fn new(config: ConnectedAppConfig) -> Self {
        Self { config }
    }

    /// Drive one login session on `surface` and parse its callback.
    ///
    /// A fresh `state` value is attached to the authorize URL. When the
    /// provider echoes `state` in the callback fragment it must match;
    /// an absent echo is tolerated.
    pub async fn run<L>(
        &self,
        surface: &L,
        login_hint: Option<&str>,
    ) -> Result<Credential, AuthError>
    where
        L: LoginSurface + ?Sized,
    {
        let state = generate_state();
        let authorize_url = self.config.authorize_url(Some(&state), login_hint)?;

        debug!(origin = %self.config.auth_origin, "starting interactive login");
        let callback = surface
            .authenticate(authorize_url, self.config.callback_scheme())
            .await?;

        if let Some(echoed) = fragment_param(&callback, "state") {
            if echoed != state {
                return Err(AuthError::BadCallbackUrl(
                    "state echoed by the provider does not match".to_string(),
                ));
            }
        }

        Credential::from_callback_url(&callback)
    }
}

/// Random URL-safe state for authorize-request forgery detection.
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn fragment_param(url: &Url, name: &str) -> Option<String> {
    let fragment = url.fragment()?;
    url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    //! Unit tests for login.
    use super::*;
    use crate::testing::ScriptedLoginSurface;

    fn flow() -> UserAgentFlow {
        UserAgentFlow::new(ConnectedAppConfig::new(
            "consumer-key",
            Url::parse("forcekit://auth/callback").expect("valid URL"),
        ))
    }

    fn callback_url(fragment: &str) -> Url {
        let mut url = Url::parse("forcekit://auth/callback").expect("valid URL");
        url.set_fragment(Some(fragment));
        url
    }

    /// Validates `generate_state` behavior for the uniqueness scenario.
    ///
    /// Assertions:
    /// - Ensures two generated values differ.
    /// - Confirms the value is URL-safe base64 of 32 bytes (43 chars).
    #[test]
    fn test_generate_state_is_unique_and_url_safe() {
        let first = generate_state();
        let second = generate_state();

        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    /// Validates `UserAgentFlow::run` behavior for the successful login
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the callback fragment becomes a credential.
    /// - Confirms the surface ran exactly one session.
    /// - Confirms the surface received the authorize URL with the state
    ///   parameter attached.
    #[tokio::test]
    async fn test_run_parses_scripted_callback() {
        let surface = ScriptedLoginSurface::new();
        surface.push_callback(callback_url(
            "access_token=tok\
             &instance_url=https%3A%2F%2Fna1.example.com\
             &id=https%3A%2F%2Flogin.example.com%2Fid%2F00Dx0000000BV7z%2F005x00000012Q9P",
        ));

        let credential = flow().run(&surface, None).await.expect("login succeeds");

        assert_eq!(credential.access_token, "tok");
        assert_eq!(surface.sessions(), 1);
        let seen = surface.last_authorize_url().expect("authorize URL recorded");
        assert!(seen.query().unwrap_or_default().contains("state="));
    }

    /// Validates `UserAgentFlow::run` behavior for the state echo scenario.
    ///
    /// Assertions:
    /// - Confirms a matching echoed state is accepted.
    #[tokio::test]
    async fn test_run_accepts_matching_state_echo() {
        let surface = ScriptedLoginSurface::new().echoing_state();
        surface.push_callback(callback_url(
            "access_token=tok\
             &instance_url=https%3A%2F%2Fna1.example.com\
             &id=https%3A%2F%2Flogin.example.com%2Fid%2F00Dx0000000BV7z%2F005x00000012Q9P",
        ));

        let credential = flow().run(&surface, None).await.expect("login succeeds");
        assert_eq!(credential.access_token, "tok");
    }

    /// Validates `UserAgentFlow::run` behavior for the forged state scenario.
    ///
    /// Assertions:
    /// - Confirms a mismatched state echo is rejected as a bad callback.
    #[tokio::test]
    async fn test_run_rejects_state_mismatch() {
        let surface = ScriptedLoginSurface::new();
        surface.push_callback(callback_url(
            "access_token=tok\
             &instance_url=https%3A%2F%2Fna1.example.com\
             &id=https%3A%2F%2Flogin.example.com%2Fid%2F00Dx0000000BV7z%2F005x00000012Q9P\
             &state=not-what-was-sent",
        ));

        let result = flow().run(&surface, None).await;
        assert!(matches!(result, Err(AuthError::BadCallbackUrl(_))));
    }

    /// Validates `UserAgentFlow::run` behavior for the cancelled session
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a surface failure propagates unchanged.
    #[tokio::test]
    async fn test_run_propagates_surface_failure() {
        let surface = ScriptedLoginSurface::new();
        surface.push_failure(AuthError::SessionStartFailure("user cancelled".to_string()));

        let result = flow().run(&surface, None).await;
        assert!(matches!(result, Err(AuthError::SessionStartFailure(_))));
    }

    /// Validates `UserAgentFlow::run` behavior for the login hint scenario.
    ///
    /// Assertions:
    /// - Confirms the hint reaches the authorize URL the surface sees.
    #[tokio::test]
    async fn test_run_forwards_login_hint() {
        let surface = ScriptedLoginSurface::new();
        surface.push_callback(callback_url(
            "access_token=tok\
             &instance_url=https%3A%2F%2Fna1.example.com\
             &id=https%3A%2F%2Flogin.example.com%2Fid%2F00Dx0000000BV7z%2F005x00000012Q9P",
        ));

        flow()
            .run(&surface, Some("user@example.com"))
            .await
            .expect("login succeeds");

        let seen = surface.last_authorize_url().expect("authorize URL recorded");
        assert!(seen
            .query()
            .unwrap_or_default()
            .contains("login_hint=user%40example.com"));
    }
}
