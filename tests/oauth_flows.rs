#![allow(clippy::unwrap_used, clippy::expect_used)]

use dashboard_session::session::{
    paths, AuthError, CallbackMode, CallbackParams, ErrorDisposition, Navigation, OAuthOutcome,
    OAuthPurpose, OAuthStateStore, ProviderRegistry, SessionConfig, SessionManager, SessionState,
    TokenStore,
};
use serde_json::json;
use std::{collections::BTreeMap, net::TcpListener, time::Duration};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn manager_with(
    server: &MockServer,
    pending: OAuthStateStore,
    providers: ProviderRegistry,
) -> (SessionManager, UnboundedReceiver<Navigation>) {
    let config = SessionConfig::new(&server.uri())
        .unwrap()
        .with_callback_url("http://localhost:3000/oauth-callback")
        .unwrap()
        .with_fatal_redirect_delay(Duration::from_millis(10))
        .with_providers(providers);
    SessionManager::new(config, TokenStore::in_memory(), pending).unwrap()
}

fn manager_for(
    server: &MockServer,
    pending: OAuthStateStore,
) -> (SessionManager, UnboundedReceiver<Navigation>) {
    manager_with(server, pending, ProviderRegistry::default())
}

async fn mount_start(server: &MockServer, provider: &str, nonce: &str, client_id: &str) {
    Mock::given(method("GET"))
        .and(path("/auth/oauth/start"))
        .and(query_param("provider", provider))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": nonce,
            "client_id": client_id
        })))
        .mount(server)
        .await;
}

fn callback(query: &str) -> CallbackParams {
    let url = Url::parse(&format!("http://localhost:3000/oauth-callback?{query}")).unwrap();
    CallbackParams::from_url(&url)
}

fn query_of(url: &Url) -> BTreeMap<String, String> {
    url.query_pairs().into_owned().collect()
}

#[tokio::test]
async fn start_builds_provider_url_and_stores_state() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_start(&server, "google", "nonce-1", "google-client").await;

    let pending = OAuthStateStore::in_memory();
    let (manager, mut navigation) = manager_for(&server, pending.clone());

    let url = manager
        .start_oauth("google", OAuthPurpose::Signup)
        .await
        .unwrap();
    let query = query_of(&url);

    assert_eq!(url.host_str(), Some("accounts.google.com"));
    assert_eq!(query["client_id"], "google-client");
    assert_eq!(query["state"], "google:nonce-1");
    assert_eq!(query["redirect_uri"], "http://localhost:3000/oauth-callback");
    assert_eq!(query["response_type"], "code");

    let stored = pending.peek().unwrap();
    assert_eq!(stored.nonce, "nonce-1");
    assert_eq!(stored.provider, "google");
    assert_eq!(stored.purpose, OAuthPurpose::Signup);

    assert_eq!(navigation.try_recv().unwrap(), Navigation::External(url));
}

#[tokio::test]
async fn state_is_single_use() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_start(&server, "google", "abc", "google-client").await;

    let pending = OAuthStateStore::in_memory();
    let (manager, _navigation) = manager_for(&server, pending.clone());
    manager
        .start_oauth("google", OAuthPurpose::Login)
        .await
        .unwrap();

    let params = callback("code=auth-code&state=google:abc");
    let outcome = manager.finalize_oauth(&params).await.unwrap();

    let OAuthOutcome::Redirected(exchange) = outcome else {
        panic!("expected a backend redirect");
    };
    assert_eq!(exchange.path(), "/auth/oauth/google/callback");
    let query = query_of(&exchange);
    assert_eq!(query["code"], "auth-code");
    assert_eq!(query["state"], "google:abc");
    assert!(pending.peek().is_none());

    assert_eq!(
        manager.finalize_oauth(&params).await,
        Err(AuthError::OAuthStateMismatch)
    );
}

#[tokio::test]
async fn mismatched_state_consumes_pending_flow() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_start(&server, "microsoft", "abc", "ms-client").await;

    let pending = OAuthStateStore::in_memory();
    let (manager, mut navigation) = manager_for(&server, pending.clone());
    manager
        .start_oauth("microsoft", OAuthPurpose::Login)
        .await
        .unwrap();
    navigation.try_recv().unwrap();

    let result = manager
        .finalize_oauth(&callback("code=c&state=microsoft:abd"))
        .await;
    assert_eq!(result, Err(AuthError::OAuthStateMismatch));
    assert!(pending.peek().is_none());
    assert_eq!(manager.state(), SessionState::Anonymous);

    let redirect = tokio::time::timeout(Duration::from_secs(1), navigation.recv())
        .await
        .unwrap();
    assert_eq!(redirect, Some(Navigation::To(paths::LOGIN)));
}

#[tokio::test]
async fn missing_client_id_is_not_configured() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_start(&server, "apple", "abc", "").await;

    let pending = OAuthStateStore::in_memory();
    let (manager, _navigation) = manager_for(&server, pending.clone());

    assert_eq!(
        manager.start_oauth("apple", OAuthPurpose::Login).await,
        Err(AuthError::OAuthNotConfigured("apple".to_string()))
    );
    assert!(pending.peek().is_none());
}

#[tokio::test]
async fn unknown_provider_makes_no_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/oauth/start"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pending = OAuthStateStore::in_memory();
    let (manager, _navigation) = manager_for(&server, pending.clone());

    assert_eq!(
        manager.start_oauth("github", OAuthPurpose::Login).await,
        Err(AuthError::OAuthNotConfigured("github".to_string()))
    );
    assert!(pending.peek().is_none());
}

#[tokio::test]
async fn direct_token_callback_signs_in() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("Authorization", "Bearer tok-direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "username": "root",
            "email": "root@example.com",
            "role": "admin",
            "is_active": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, mut navigation) = manager_for(&server, OAuthStateStore::in_memory());
    let outcome = manager
        .finalize_oauth(&callback("token=tok-direct"))
        .await
        .unwrap();

    let OAuthOutcome::Authenticated(profile) = outcome else {
        panic!("expected a signed-in outcome");
    };
    assert!(profile.is_admin());
    assert!(manager.state().is_authenticated());
    assert_eq!(
        navigation.try_recv().unwrap(),
        Navigation::To(paths::ADMIN_PANEL)
    );
}

#[tokio::test]
async fn profile_relay_callback_signs_in() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/oauth/callback"))
        .and(body_partial_json(json!({
            "provider": "google",
            "provider_account_id": "google-sub-1",
            "email": "alice@example.com",
            "access_token": "ya29.provider"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-relay",
            "token_type": "bearer",
            "user": {
                "id": 1,
                "username": "alice",
                "email": "alice@example.com",
                "role": "user",
                "is_active": true
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, mut navigation) = manager_for(&server, OAuthStateStore::in_memory());
    let params = callback(
        "provider=google&access_token=ya29.provider&sub=google-sub-1&email=alice%40example.com",
    );
    let outcome = manager.finalize_oauth(&params).await.unwrap();

    assert!(matches!(outcome, OAuthOutcome::Authenticated(ref p) if p.username == "alice"));
    assert_eq!(
        navigation.try_recv().unwrap(),
        Navigation::To(paths::DASHBOARD)
    );
}

#[tokio::test]
async fn provider_error_is_fatal() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_start(&server, "google", "abc", "google-client").await;

    let pending = OAuthStateStore::in_memory();
    let (manager, mut navigation) = manager_for(&server, pending.clone());
    manager
        .start_oauth("google", OAuthPurpose::Login)
        .await
        .unwrap();
    navigation.try_recv().unwrap();

    let result = manager
        .finalize_oauth(&callback(
            "error=access_denied&error_description=User+denied+access&state=google:abc",
        ))
        .await;

    assert_eq!(
        result,
        Err(AuthError::OAuthProviderError("User denied access".to_string()))
    );
    assert!(pending.peek().is_none());
    let redirect = tokio::time::timeout(Duration::from_secs(1), navigation.recv())
        .await
        .unwrap();
    assert_eq!(redirect, Some(Navigation::To(paths::LOGIN)));
}

#[tokio::test]
async fn provider_restricted_to_code_exchange_rejects_tokens() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut providers = ProviderRegistry::default();
    let google = providers
        .get("google")
        .cloned()
        .unwrap()
        .with_callback(CallbackMode::CodeExchange);
    providers.insert("google", google);

    let (manager, _navigation) = manager_with(&server, OAuthStateStore::in_memory(), providers);
    assert_eq!(
        manager
            .finalize_oauth(&callback("token=tok&provider=google"))
            .await,
        Err(AuthError::OAuthCallbackMalformed)
    );
}

#[tokio::test]
async fn rejected_direct_token_is_reported_inline() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("Authorization", "Bearer tok-bad"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token"})))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, mut navigation) = manager_for(&server, OAuthStateStore::in_memory());
    let err = manager
        .finalize_oauth(&callback("token=tok-bad"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::Rejected {
            status: 401,
            message: "Invalid token".to_string()
        }
    );
    assert_eq!(err.disposition(), ErrorDisposition::Inline);
    assert_eq!(manager.state(), SessionState::Anonymous);
    assert!(navigation.try_recv().is_err());
}
