//! The credential entity produced by a successful OAuth2 exchange.
//!
//! A [`Credential`] is an immutable value: refresh and re-login replace it
//! wholesale, they never mutate it. It is serialized as a JSON blob for the
//! secure store and rebuilt from provider responses by the flow executors.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Tokens and URLs obtained from a successful OAuth2 exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Short-lived bearer token authorizing API calls. Secret.
    pub access_token: String,

    /// Base URL of the org instance API calls are resolved against.
    pub instance_url: Url,

    /// Provider URL identifying the authenticated user and org.
    pub identity_url: Url,

    /// Long-lived token for silent renewal. Absent when the login scope
    /// excluded it; without it every renewal needs user interaction. Secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Time the provider issued the access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Assemble a credential from already-validated parts.
    #[must_use]
    pub fn new(
        access_token: String,
        instance_url: Url,
        identity_url: Url,
        refresh_token: Option<String>,
        issued_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self { access_token, instance_url, identity_url, refresh_token, issued_at }
    }

    /// Parse a credential out of the callback URL of a user-agent flow.
    ///
    /// The provider delivers the fields in the URL *fragment*, encoded like a
    /// query string: `access_token`, `instance_url`, `id` (the identity URL),
    /// plus optional `refresh_token` and `issued_at` (unix milliseconds).
    ///
    /// # Examples
    /// ```
    /// use forcekit_auth::Credential;
    /// use url::Url;
    ///
    /// let callback = Url::parse(
    ///     "myapp://auth/callback#access_token=00Dx0000000BV7z%21AQEAQ\
    ///      &instance_url=https%3A%2F%2Fna1.salesforce.com\
    ///      &id=https%3A%2F%2Flogin.salesforce.com%2Fid%2F00Dx0000000BV7z%2F005x00000012Q9P",
    /// )
    /// .unwrap();
    ///
    /// let credential = Credential::from_callback_url(&callback).unwrap();
    /// assert_eq!(credential.org_id(), Some("00Dx0000000BV7z"));
    /// assert_eq!(credential.user_id(), Some("005x00000012Q9P"));
    /// ```
    ///
    /// # Errors
    /// Returns [`AuthError::BadCallbackUrl`] when the fragment is absent or
    /// any of `access_token`, `instance_url`, `id` is missing or empty.
    pub fn from_callback_url(callback: &Url) -> Result<Self, AuthError> {
        let fragment = callback
            .fragment()
            .ok_or_else(|| AuthError::BadCallbackUrl("no fragment in callback URL".to_string()))?;

        let mut access_token = None;
        let mut instance_url = None;
        let mut identity_url = None;
        let mut refresh_token = None;
        let mut issued_at = None;

        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "instance_url" => instance_url = Some(value.into_owned()),
                "id" => identity_url = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                "issued_at" => {
                    issued_at =
                        value.parse::<i64>().ok().and_then(datetime_from_unix_millis);
                }
                _ => {}
            }
        }

        let access_token = access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| missing_field("access_token"))?;
        let instance_url = parse_url_field(instance_url, "instance_url")?;
        let identity_url = parse_url_field(identity_url, "id")?;

        Ok(Self {
            access_token,
            instance_url,
            identity_url,
            refresh_token: refresh_token.filter(|token| !token.is_empty()),
            issued_at,
        })
    }

    /// Whether silent renewal is possible for this credential.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    /// User id: the last path segment of the identity URL.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        let mut segments = identity_segments(&self.identity_url)?;
        segments.pop()
    }

    /// Org id: the second-to-last path segment of the identity URL.
    #[must_use]
    pub fn org_id(&self) -> Option<&str> {
        let segments = identity_segments(&self.identity_url)?;
        (segments.len() >= 2).then(|| segments[segments.len() - 2])
    }

    /// Identity of the credential's user, used as the store lookup key.
    ///
    /// # Errors
    /// Returns [`AuthError::MalformedIdentityUrl`] when the identity URL does
    /// not carry both path segments.
    pub fn identifier(&self) -> Result<UserIdentifier, AuthError> {
        match (self.org_id(), self.user_id()) {
            (Some(org_id), Some(user_id)) => Ok(UserIdentifier {
                user_id: user_id.to_string(),
                org_id: org_id.to_string(),
            }),
            _ => Err(AuthError::MalformedIdentityUrl(self.identity_url.to_string())),
        }
    }
}

/// Identity of an authenticated user within an org.
///
/// Together with the consumer key, the `(org id, user id)` pair addresses a
/// credential in the secure store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentifier {
    /// Provider-assigned user id, e.g. `005x00000012Q9P`.
    pub user_id: String,

    /// Provider-assigned org id, e.g. `00Dx0000000BV7z`.
    pub org_id: String,
}

impl UserIdentifier {
    /// Store account string: `{org id}:{user id}`.
    #[must_use]
    pub fn account(&self) -> String {
        format!("{}:{}", self.org_id, self.user_id)
    }
}

pub(crate) fn datetime_from_unix_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn identity_segments(identity_url: &Url) -> Option<Vec<&str>> {
    let segments: Vec<&str> =
        identity_url.path_segments()?.filter(|segment| !segment.is_empty()).collect();
    (!segments.is_empty()).then_some(segments)
}

fn parse_url_field(value: Option<String>, field: &str) -> Result<Url, AuthError> {
    let raw = value.filter(|v| !v.is_empty()).ok_or_else(|| missing_field(field))?;
    Url::parse(&raw)
        .map_err(|e| AuthError::BadCallbackUrl(format!("{field} is not a valid URL: {e}")))
}

fn missing_field(field: &str) -> AuthError {
    AuthError::BadCallbackUrl(format!("missing required field {field}"))
}
