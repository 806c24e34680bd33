//! Credential lifecycle tests over the in-memory store and a scripted
//! login surface, with the token endpoints mocked at HTTP level.
//!
//! Run with: `cargo test --features test-utils --test credential_lifecycle`

use std::time::Duration;

use futures::future::join_all;
use tokio_test::assert_ok;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forcekit_auth::testing::{test_credential, MemoryStore, ScriptedLoginSurface};
use forcekit_auth::{AuthError, ConnectedAppConfig, CredentialManager};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("forcekit_auth=debug")
        .with_test_writer()
        .try_init();
}

fn manager_for(
    server: &MockServer,
    store: MemoryStore,
    surface: ScriptedLoginSurface,
) -> CredentialManager<MemoryStore, ScriptedLoginSurface> {
    let config = ConnectedAppConfig::new(
        "consumer-key",
        Url::parse("forcekit://auth/callback").expect("valid URL"),
    )
    .with_auth_origin(server.uri());
    CredentialManager::new(config, store, surface)
}

fn login_callback(token: &str) -> Url {
    let mut url = Url::parse("forcekit://auth/callback").expect("valid URL");
    url.set_fragment(Some(&format!(
        "access_token={token}\
         &instance_url=https%3A%2F%2Fna1.example.com\
         &id=https%3A%2F%2Flogin.example.com%2Fid%2F00Dx0000000BV7z%2F005x00000012Q9P\
         &refresh_token=refresh-1\
         &issued_at=1700000000000"
    )));
    url
}

/// Validates `CredentialManager::grant_credential` behavior for the
/// concurrent login scenario.
///
/// Assertions:
/// - Ensures ten concurrent grants open exactly one login session. The
///   script holds a single callback, so a second session would fail.
/// - Confirms every caller receives the same credential.
#[tokio::test]
async fn test_concurrent_grants_share_one_login() {
    init_tracing();
    let server = MockServer::start().await;
    let surface = ScriptedLoginSurface::new().with_latency(Duration::from_millis(100));
    surface.push_callback(login_callback("shared-token"));
    let manager = manager_for(&server, MemoryStore::new(), surface.clone());

    let grants = (0..10).map(|_| {
        let manager = manager.clone();
        async move { manager.grant_credential(None, true).await }
    });
    let outcomes = join_all(grants).await;

    let first = outcomes[0].as_ref().expect("grant succeeds").clone();
    for outcome in &outcomes {
        let credential = outcome.as_ref().expect("grant succeeds");
        assert_eq!(*credential, first);
    }
    assert_eq!(surface.sessions(), 1);
    assert_eq!(first.access_token, "shared-token");
}

/// Validates `CredentialManager::grant_credential` behavior for the
/// concurrent refresh scenario.
///
/// Assertions:
/// - Ensures ten concurrent grants make exactly one token request. The
///   mock's expectation is verified when the server drops.
/// - Ensures no login session is opened.
/// - Confirms every caller receives the refreshed credential.
#[tokio::test]
async fn test_concurrent_grants_share_one_refresh() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "access_token": "fresh-token",
                    "instance_url": "https://na1.example.com",
                    "id": "https://login.example.com/id/00Dx0000000BV7z/005x00000012Q9P",
                    "issued_at": "1700000000000",
                }))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let surface = ScriptedLoginSurface::new();
    let manager = manager_for(&server, MemoryStore::new(), surface.clone());
    let stale = test_credential("stale-token");

    let grants = (0..10).map(|_| {
        let manager = manager.clone();
        let stale = stale.clone();
        async move { manager.grant_credential(Some(stale), true).await }
    });
    let outcomes = join_all(grants).await;

    for outcome in &outcomes {
        let credential = outcome.as_ref().expect("grant succeeds");
        assert_eq!(credential.access_token, "fresh-token");
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
    }
    assert_eq!(surface.sessions(), 0);
}

/// Validates `CredentialManager::grant_credential` behavior for the
/// concurrent login failure scenario.
///
/// Assertions:
/// - Ensures a failed login is shared: the script holds a single failure,
///   and all ten concurrent grants observe it from one session.
/// - Confirms nothing is persisted after the failure.
#[tokio::test]
async fn test_concurrent_grants_share_login_failure() {
    init_tracing();
    let server = MockServer::start().await;
    let surface = ScriptedLoginSurface::new().with_latency(Duration::from_millis(100));
    surface.push_failure(AuthError::SessionStartFailure("session dismissed".into()));
    let store = MemoryStore::new();
    let manager = manager_for(&server, store.clone(), surface.clone());

    let grants = (0..10).map(|_| {
        let manager = manager.clone();
        async move { manager.grant_credential(None, true).await }
    });
    let outcomes = join_all(grants).await;

    for outcome in outcomes {
        match outcome {
            Err(AuthError::SessionStartFailure(reason)) => {
                assert_eq!(reason, "session dismissed");
            }
            other => panic!("expected SessionStartFailure, got {other:?}"),
        }
    }
    assert_eq!(surface.sessions(), 1);
    assert!(store.is_empty());
}

/// Validates the full lifecycle for the login, restart, refresh, revoke
/// scenario.
///
/// Assertions:
/// - Confirms a fresh manager over the same store resolves the credential
///   through the persisted pointer.
/// - Confirms a later refresh replaces the stored credential in place.
/// - Ensures revocation leaves the store empty and the cache cold.
#[tokio::test]
async fn test_lifecycle_login_restart_refresh_revoke() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "refreshed-token",
            "instance_url": "https://na1.example.com",
            "id": "https://login.example.com/id/00Dx0000000BV7z/005x00000012Q9P",
            "issued_at": "1700000100000",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/revoke"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let surface = ScriptedLoginSurface::new();
    surface.push_callback(login_callback("login-token"));

    let first = manager_for(&server, store.clone(), surface);
    let logged_in = first
        .grant_credential(None, true)
        .await
        .expect("login succeeds");
    assert_eq!(logged_in.access_token, "login-token");

    // A process restart: a new manager over the same store.
    let second = manager_for(&server, store.clone(), ScriptedLoginSurface::new());
    let recovered = second
        .cached_credential()
        .await
        .expect("lookup succeeds")
        .expect("pointer resolves after restart");
    assert_eq!(recovered, logged_in);

    let refreshed = second
        .grant_credential(Some(recovered), true)
        .await
        .expect("refresh succeeds");
    assert_eq!(refreshed.access_token, "refreshed-token");
    let cached = second
        .cached_credential()
        .await
        .expect("lookup succeeds")
        .expect("refreshed credential stored");
    assert_eq!(cached, refreshed);

    second.log_out().await.expect("log out succeeds");
    assert_eq!(
        second.cached_credential().await.expect("lookup succeeds"),
        None
    );
    assert!(store.is_empty());
}

/// Validates `CredentialManager::revoke` behavior for the concurrent
/// revocation scenario.
///
/// Assertions:
/// - Ensures five concurrent revocations make exactly one endpoint call.
/// - Confirms every caller resolves successfully.
#[tokio::test]
async fn test_concurrent_revocations_share_one_call() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/revoke"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server, MemoryStore::new(), ScriptedLoginSurface::new());
    let credential = test_credential("live-token");

    let revocations = (0..5).map(|_| {
        let manager = manager.clone();
        let credential = credential.clone();
        async move { manager.revoke(&credential).await }
    });
    let outcomes = join_all(revocations).await;

    for outcome in outcomes {
        assert_ok!(outcome);
    }
}
