//! Integration tests for plaza-transport: bearer attachment, single-flight
//! refresh under concurrent 401s, retry-once, and session teardown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plaza_core::{PlazaError, TokenPair};
use plaza_transport::{ApiClient, MemoryTokenStore, SessionObserver, TokenStore, TransportConfig};
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, store: Arc<MemoryTokenStore>) -> ApiClient {
    ApiClient::new(TransportConfig::new(server.uri()), store).unwrap()
}

async fn seeded_store(access: &str, refresh: &str) -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    store.store(&TokenPair::new(access, refresh)).await.unwrap();
    store
}

struct CountingObserver {
    fired: AtomicUsize,
}

#[async_trait::async_trait]
impl SessionObserver for CountingObserver {
    async fn on_session_expired(&self) {
        self.fired.fetch_add(1, Ordering::SeqCst);
    }
}

// --- Plain requests ---

#[tokio::test]
async fn test_bearer_header_and_query_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(header("Authorization", "Bearer t0"))
        .and(query_param("page", "0"))
        .and(query_param("size", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"notificationId": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, seeded_store("t0", "r0").await);
    let rows: Vec<Value> = api
        .get_json(
            "/notifications",
            &[("page", "0".to_owned()), ("size", "20".to_owned())],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_post_json_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(body_json(json!({"q": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, seeded_store("t0", "r0").await);
    let reply: Value = api.post_json("/echo", &json!({"q": 1})).await.unwrap();
    assert_eq!(reply, json!({"ok": true}));
}

#[tokio::test]
async fn test_status_only_posts_and_deletes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notifications/5/read"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/read"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, seeded_store("t0", "r0").await);
    api.post_ok("/notifications/5/read", None).await.unwrap();
    api.delete_ok("/notifications/read").await.unwrap();
}

// --- Single-flight refresh ---

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": "me"})))
        .expect(5)
        .mount(&server)
        .await;
    // The refresh is slow enough that every caller 401s while it is in
    // flight, exercising the waiter queue rather than the happy path.
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .and(body_json(json!({"refreshToken": "r0"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "fresh"}))
                .set_delay(Duration::from_millis(250)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store("stale", "r0").await;
    let api = Arc::new(client_for(&server, Arc::clone(&store)));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let api = Arc::clone(&api);
        tasks.push(tokio::spawn(async move {
            api.get_json::<Value>("/profile", &[]).await
        }));
    }
    for task in tasks {
        let reply = task.await.unwrap().unwrap();
        assert_eq!(reply, json!({"user": "me"}));
    }

    // The winning refresh kept the old refresh token.
    assert_eq!(store.access_token().await.as_deref(), Some("fresh"));
    assert_eq!(store.refresh_token().await.as_deref(), Some("r0"));
}

#[tokio::test]
async fn test_refresh_failure_rejects_waiters_and_tears_down_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(250)))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store("stale", "r0").await;
    let api = Arc::new(client_for(&server, Arc::clone(&store)));
    let observer = Arc::new(CountingObserver {
        fired: AtomicUsize::new(0),
    });
    api.add_session_observer(observer.clone()).await;

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let api = Arc::clone(&api);
        tasks.push(tokio::spawn(async move {
            api.get_json::<Value>("/profile", &[]).await
        }));
    }
    for task in tasks {
        match task.await.unwrap() {
            Err(PlazaError::AuthExpired(_)) => {}
            other => panic!("expected AuthExpired, got {other:?}"),
        }
    }

    assert_eq!(observer.fired.load(Ordering::SeqCst), 1);
    assert!(store.access_token().await.is_none());
    assert!(store.refresh_token().await.is_none());
}

#[tokio::test]
async fn test_second_401_after_retry_is_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "fresh", "refreshToken": "r1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store("stale", "r0").await;
    let api = client_for(&server, Arc::clone(&store));
    match api.get_json::<Value>("/profile", &[]).await {
        Err(PlazaError::Http(message)) => assert!(message.contains("401")),
        other => panic!("expected Http, got {other:?}"),
    }

    // The refresh itself succeeded and was persisted before the retry.
    assert_eq!(store.access_token().await.as_deref(), Some("fresh"));
    assert_eq!(store.refresh_token().await.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_401_without_refresh_credential_skips_refresh_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    store
        .store(&TokenPair::access_only("stale"))
        .await
        .unwrap();
    let api = client_for(&server, Arc::clone(&store));
    let observer = Arc::new(CountingObserver {
        fired: AtomicUsize::new(0),
    });
    api.add_session_observer(observer.clone()).await;

    match api.get_json::<Value>("/profile", &[]).await {
        Err(PlazaError::AuthExpired(message)) => {
            assert!(message.contains("no refresh credential"));
        }
        other => panic!("expected AuthExpired, got {other:?}"),
    }
    assert_eq!(observer.fired.load(Ordering::SeqCst), 1);
    assert!(store.access_token().await.is_none());
}

// --- Login and streaming surface ---

#[tokio::test]
async fn test_kakao_login_persists_pair() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/login/kakao"))
        .and(query_param("code", "abc123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "a1", "refreshToken": "r1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let api = client_for(&server, Arc::clone(&store));
    let pair = api.login_with_kakao_code("abc123").await.unwrap();
    assert_eq!(pair.access_token, "a1");
    assert_eq!(store.access_token().await.as_deref(), Some("a1"));
    assert_eq!(store.refresh_token().await.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_kakao_login_without_token_requires_registration() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/login/kakao"))
        .and(query_param("code", "newuser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"needsSignup": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let api = client_for(&server, Arc::clone(&store));
    match api.login_with_kakao_code("newuser").await {
        Err(PlazaError::AuthExpired(message)) => {
            assert!(message.contains("registration required"));
        }
        other => panic!("expected AuthExpired, got {other:?}"),
    }
    assert!(store.access_token().await.is_none());
}

#[tokio::test]
async fn test_stream_open_fails_fast_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ai/chat/answer/stream"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, seeded_store("t0", "r0").await);
    match api
        .open_event_stream(Method::POST, "/ai/chat/answer/stream", Some(&json!({})))
        .await
    {
        Err(PlazaError::Transport(message)) => {
            assert!(message.contains("403"));
            assert!(message.contains("denied"));
        }
        other => panic!("expected Transport, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_open_returns_streaming_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications/stream"))
        .and(header("Authorization", "Bearer t0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"data: {\"x\":1}\n\n".to_vec(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, seeded_store("t0", "r0").await);
    let response = api
        .open_event_stream(Method::GET, "/notifications/stream", None)
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("data:"));
}
