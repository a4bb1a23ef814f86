//! End-to-end tests for the session lifecycle and publish orchestration,
//! against a mock platform API and a stub signature backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xhs::{
    ApiClient, PublishRequest, Publisher, PublisherConfig, ResolverConfig, SessionManager,
    SessionState, SessionStore, SignRequest, SignatureBackend, SignatureHeaders, TopicResolver,
    Visibility, XhsError,
};

/// Signature backend that returns fixed headers and counts invocations.
#[derive(Default)]
struct StubSigner {
    calls: AtomicU32,
}

#[async_trait::async_trait]
impl SignatureBackend for StubSigner {
    async fn sign(&self, _request: &SignRequest) -> xhs::Result<SignatureHeaders> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SignatureHeaders {
            x_s: "stub-signature".to_string(),
            x_t: "1700000000000".to_string(),
        })
    }
}

fn client(signer: Arc<StubSigner>, server: &MockServer) -> Arc<ApiClient> {
    Arc::new(ApiClient::with_base_url(signer, server.uri()).expect("client builds"))
}

fn store_in(dir: &tempfile::TempDir) -> SessionStore {
    SessionStore::new(dir.path().join(".xhs_cookie.json"))
}

fn ok_envelope(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "code": 0,
        "msg": "",
        "data": data,
    }))
}

fn rejected_envelope(code: i64, msg: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": false,
        "code": code,
        "msg": msg,
        "data": null,
    }))
}

fn instant_publisher(manager: SessionManager, api: Arc<ApiClient>) -> Publisher {
    let resolver = TopicResolver::with_config(
        api.clone(),
        ResolverConfig {
            max_topics: 3,
            pause_min: Duration::ZERO,
            pause_max: Duration::ZERO,
        },
    );
    Publisher::with_config(
        manager,
        resolver,
        api,
        PublisherConfig {
            edit_pause_min: Duration::ZERO,
            edit_pause_max: Duration::ZERO,
        },
    )
}

#[tokio::test]
async fn saved_cookie_round_trips_into_authenticated_manager() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.save("a1=deadbeef; web_session=cafe").unwrap();

    let api = client(Arc::new(StubSigner::default()), &server);
    let manager = SessionManager::load_or_anonymous(api.clone(), store, None);

    assert_eq!(manager.state(), SessionState::Authenticated);
    assert_eq!(api.cookie().as_deref(), Some("a1=deadbeef; web_session=cafe"));
    assert_eq!(api.a1(), "deadbeef");
}

#[tokio::test]
async fn explicit_cookie_wins_over_stored_cookie() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.save("a1=stored").unwrap();

    let api = client(Arc::new(StubSigner::default()), &server);
    let manager =
        SessionManager::load_or_anonymous(api.clone(), store, Some("a1=explicit".to_string()));

    assert_eq!(manager.state(), SessionState::Authenticated);
    assert_eq!(api.cookie().as_deref(), Some("a1=explicit"));
}

#[tokio::test]
async fn verify_on_anonymous_session_makes_no_network_call() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let signer = Arc::new(StubSigner::default());
    let api = client(signer.clone(), &server);
    let mut manager = SessionManager::load_or_anonymous(api, store_in(&dir), None);

    assert_eq!(manager.state(), SessionState::Anonymous);
    assert!(!manager.verify().await);

    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_probe_expires_session_and_deletes_stored_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v1/user/selfinfo"))
        .respond_with(rejected_envelope(-100, "login expired"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.save("a1=deadbeef; web_session=stale").unwrap();

    let api = client(Arc::new(StubSigner::default()), &server);
    let mut manager = SessionManager::load_or_anonymous(api.clone(), store.clone(), None);
    assert_eq!(manager.state(), SessionState::Authenticated);

    assert!(!manager.verify().await);
    assert_eq!(manager.state(), SessionState::Expired);
    assert!(store.load().is_none());
    assert!(api.cookie().is_none());

    // A fresh manager must find no stored session.
    let next = SessionManager::load_or_anonymous(api, store, None);
    assert_eq!(next.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn successful_probe_keeps_session_authenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v1/user/selfinfo"))
        .respond_with(ok_envelope(json!({"nickname": "tester"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.save("a1=deadbeef").unwrap();

    let api = client(Arc::new(StubSigner::default()), &server);
    let mut manager = SessionManager::load_or_anonymous(api, store.clone(), None);

    assert!(manager.verify().await);
    assert_eq!(manager.state(), SessionState::Authenticated);
    assert!(store.load().is_some());
}

#[tokio::test]
async fn logout_clears_store_from_any_state() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.save("a1=deadbeef").unwrap();

    let api = client(Arc::new(StubSigner::default()), &server);
    let mut manager = SessionManager::load_or_anonymous(api.clone(), store.clone(), None);

    manager.logout();
    assert_eq!(manager.state(), SessionState::Anonymous);
    assert!(store.load().is_none());
    assert!(api.cookie().is_none());
}

#[tokio::test]
async fn publish_fails_fast_without_valid_session() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let signer = Arc::new(StubSigner::default());
    let api = client(signer.clone(), &server);
    let manager = SessionManager::load_or_anonymous(api.clone(), store_in(&dir), None);
    let mut publisher = instant_publisher(manager, api);

    let result = publisher
        .publish(PublishRequest {
            title: "今日咖啡".to_string(),
            body: "手冲记录".to_string(),
            images: Vec::new(),
            tags: "咖啡, 手冲".to_string(),
            visibility: Visibility::Private,
        })
        .await;

    assert!(matches!(result, Err(XhsError::NotAuthenticated)));
    // No topic lookup, no signing, no submission happened.
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn publish_appends_topic_suffix_and_submits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v1/user/selfinfo"))
        .respond_with(ok_envelope(json!({"nickname": "tester"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/sns/web/v1/search/topic"))
        .respond_with(ok_envelope(json!({
            "topic_info_dicts": [
                {"id": "topic-1", "name": "咖啡", "link": "https://example.com/t/1"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/sns/web/v1/note"))
        .respond_with(ok_envelope(json!({"id": "note-42", "score": 100})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.save("a1=deadbeef; web_session=live").unwrap();

    let api = client(Arc::new(StubSigner::default()), &server);
    let manager = SessionManager::load_or_anonymous(api.clone(), store, None);
    let mut publisher = instant_publisher(manager, api);

    let result = publisher
        .publish(PublishRequest {
            title: "今日咖啡".to_string(),
            body: "手冲记录".to_string(),
            images: Vec::new(),
            tags: "咖啡".to_string(),
            visibility: Visibility::Private,
        })
        .await
        .expect("publish succeeds");

    assert_eq!(result.note_id(), Some("note-42"));

    // The submitted body must carry the resolved-topic suffix.
    let requests = server.received_requests().await.unwrap();
    let note = requests
        .iter()
        .find(|r| r.url.path() == "/api/sns/web/v1/note")
        .expect("note request sent");
    let body: serde_json::Value = serde_json::from_slice(&note.body).unwrap();
    assert_eq!(
        body["common"]["desc"].as_str().unwrap(),
        "手冲记录\n#咖啡[话题]#"
    );
    assert_eq!(body["common"]["privacy_info"]["type"], 1);
    assert_eq!(body["common"]["hash_tag"][0]["id"], "topic-1");
    assert_eq!(body["common"]["hash_tag"][0]["type"], "topic");
}

#[tokio::test]
async fn platform_rejection_propagates_to_publish_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v1/user/selfinfo"))
        .respond_with(ok_envelope(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/sns/web/v1/note"))
        .respond_with(rejected_envelope(-510001, "note rejected"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.save("a1=deadbeef").unwrap();

    let api = client(Arc::new(StubSigner::default()), &server);
    let manager = SessionManager::load_or_anonymous(api.clone(), store, None);
    let mut publisher = instant_publisher(manager, api);

    let result = publisher
        .publish(PublishRequest {
            title: "标题".to_string(),
            body: "正文".to_string(),
            images: Vec::new(),
            tags: String::new(),
            visibility: Visibility::Public,
        })
        .await;

    match result {
        Err(XhsError::Platform { code, msg }) => {
            assert_eq!(code, -510001);
            assert_eq!(msg, "note rejected");
        }
        other => panic!("expected platform rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn login_by_phone_persists_refreshed_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v2/login/send_code"))
        .respond_with(ok_envelope(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v1/login/check_code"))
        .respond_with(ok_envelope(json!({"mobile_token": "mtok-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/sns/web/v1/login/code"))
        .respond_with(
            ok_envelope(json!({"user_id": "u-1"}))
                .append_header("set-cookie", "a1=fresh1; Path=/; Domain=.xiaohongshu.com")
                .append_header("set-cookie", "web_session=fresh2; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let api = client(Arc::new(StubSigner::default()), &server);
    let mut manager = SessionManager::load_or_anonymous(api.clone(), store.clone(), None);
    assert_eq!(manager.state(), SessionState::Anonymous);

    let ok = manager
        .login_by_phone("13800000000", || Ok("1234".to_string()))
        .await;

    assert!(ok);
    assert_eq!(manager.state(), SessionState::Authenticated);
    let saved = store.load().expect("cookie persisted");
    assert!(saved.contains("a1=fresh1"));
    assert!(saved.contains("web_session=fresh2"));
    assert_eq!(api.a1(), "fresh1");
}

#[tokio::test]
async fn login_failure_reports_false_without_panicking() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v2/login/send_code"))
        .respond_with(rejected_envelope(-1, "too many requests"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let api = client(Arc::new(StubSigner::default()), &server);
    let mut manager = SessionManager::load_or_anonymous(api, store_in(&dir), None);

    let ok = manager
        .login_by_phone("13800000000", || Ok("1234".to_string()))
        .await;

    assert!(!ok);
    assert_eq!(manager.state(), SessionState::Anonymous);
}
