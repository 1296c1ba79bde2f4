//! End-to-end tests: the axum views against a wiremock upstream

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use venueboard::auth::{LoginCredentials, TokenManager, TokenSettings};
use venueboard::cache::{load_snapshot, save_snapshot, Cache};
use venueboard::data::{ApiClient, ApiConfig, CacheLevel, Payload, ReqwestTransport, Transport};
use venueboard::server::{self, AppState};
use venueboard::views::NO_CURRENT_EVENT;

const EVENTS: &str = r#"[
    {"Id":"e1","Name":"Keynote","IsPosted":true,"FunctionRoomName":"Salon A",
     "BookingPostAs":"Acme","StartDateTime":"2024-01-01T09:00:00","EndDateTime":"2024-01-01T10:00:00"},
    {"Id":"e2","Name":"Secret Board","IsPosted":false,"FunctionRoomName":"Salon B",
     "BookingPostAs":"Acme","StartDateTime":"2024-01-01T11:00:00","EndDateTime":"2024-01-01T12:00:00"}
]"#;

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(upstream: &MockServer, cache: Arc<Cache<Payload>>, level: CacheLevel) -> Self {
        let api_config = ApiConfig::new(upstream.uri(), "sub-key");
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
        let mut settings = TokenSettings::new(LoginCredentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        });
        settings.cache_tokens = level.caches_tokens();
        let tokens = Arc::new(TokenManager::new(
            transport.clone(),
            cache.clone(),
            api_config.clone(),
            settings,
        ));
        let api = ApiClient::new(transport, cache, tokens, api_config, level);

        let shutdown = CancellationToken::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(api, chrono_tz::EST, shutdown.clone());
        let task = tokio::spawn(server::serve(listener, state));

        Self {
            addr,
            shutdown,
            task,
        }
    }

    async fn get(&self, path_and_query: &str) -> (u16, String) {
        let response = reqwest::get(format!("http://{}{}", self.addr, path_and_query))
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
    }
}

async fn mount_login(upstream: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/2.0/OAuth2/AccessToken"))
        .and(header("Ocp-Apim-Subscription-Key", "sub-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"access_token":"tok-1","refresh_token":"ref-1","token_type":"bearer","expires_in":900}"#,
        ))
        .expect(expected)
        .mount(upstream)
        .await;
}

async fn mount_events(upstream: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/bookingEvent/DefiniteEventSearch"))
        .and(header("Authorization", "OAuth tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EVENTS))
        .expect(expected)
        .mount(upstream)
        .await;
}

#[tokio::test]
async fn test_schedule_logs_in_once_and_serves_second_request_from_cache() {
    let upstream = MockServer::start().await;
    mount_login(&upstream, 1).await;
    mount_events(&upstream, 1).await;

    let server = TestServer::start(&upstream, Arc::new(Cache::new()), CacheLevel::All).await;

    let (status, first) = server.get("/view/schedule?location-id=L1").await;
    assert_eq!(status, 200);
    assert!(first.contains("Keynote"));
    assert!(first.contains("09:00 - 10:00"));
    assert!(!first.contains("Secret Board"));

    let (status, second) = server.get("/view/schedule?location-id=L1").await;
    assert_eq!(status, 200);
    assert_eq!(first, second);

    server.stop().await;
    upstream.verify().await;
}

#[tokio::test]
async fn test_concurrent_views_share_warm_cache() {
    let upstream = MockServer::start().await;
    mount_login(&upstream, 1).await;
    mount_events(&upstream, 1).await;

    let server = TestServer::start(&upstream, Arc::new(Cache::new()), CacheLevel::All).await;
    let (status, _) = server.get("/view/schedule?location-id=L1").await;
    assert_eq!(status, 200);

    let pages = futures::future::join_all(
        (0..8).map(|_| server.get("/view/schedule?location-id=L1")),
    )
    .await;
    assert!(pages.iter().all(|(status, body)| *status == 200 && body.contains("Keynote")));

    server.stop().await;
    upstream.verify().await;
}

#[tokio::test]
async fn test_cache_level_none_fetches_every_time() {
    let upstream = MockServer::start().await;
    mount_login(&upstream, 2).await;
    mount_events(&upstream, 2).await;

    let server = TestServer::start(&upstream, Arc::new(Cache::new()), CacheLevel::None).await;
    for _ in 0..2 {
        let (status, _) = server.get("/view/schedule?location-id=L1").await;
        assert_eq!(status, 200);
    }

    server.stop().await;
    upstream.verify().await;
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.json");

    let upstream = MockServer::start().await;
    mount_login(&upstream, 1).await;
    mount_events(&upstream, 1).await;

    let cache = Arc::new(Cache::new());
    let server = TestServer::start(&upstream, cache.clone(), CacheLevel::All).await;
    let (_, before) = server.get("/view/schedule?location-id=L1").await;
    server.stop().await;
    save_snapshot(&cache, &snapshot).unwrap();
    upstream.verify().await;

    // The restarted server talks to an upstream with nothing mounted
    let silent = MockServer::start().await;
    let restored: Cache<Payload> = load_snapshot(&snapshot).unwrap();
    let server = TestServer::start(&silent, Arc::new(restored), CacheLevel::All).await;
    let (status, after) = server.get("/view/schedule?location-id=L1").await;
    server.stop().await;

    assert_eq!(status, 200);
    assert_eq!(before, after);
    assert!(silent.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cover_without_current_event() {
    let upstream = MockServer::start().await;
    mount_login(&upstream, 1).await;
    mount_events(&upstream, 1).await;

    let server = TestServer::start(&upstream, Arc::new(Cache::new()), CacheLevel::All).await;
    let (status, body) = server
        .get("/view/cover?location-id=L1&room-id=Ballroom%20North")
        .await;
    server.stop().await;

    assert_eq!(status, 200);
    assert!(body.contains("Ballroom North"));
    assert!(body.contains(NO_CURRENT_EVENT));
}

#[tokio::test]
async fn test_missing_parameters_are_bad_requests() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, Arc::new(Cache::new()), CacheLevel::All).await;

    let (status, _) = server.get("/view/schedule").await;
    assert_eq!(status, 400);
    let (status, body) = server.get("/view/cover?location-id=L1").await;
    assert_eq!(status, 400);
    assert!(body.contains("room-id"));

    server.stop().await;
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_login_renders_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2.0/OAuth2/AccessToken"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"error":"invalid_grant","error_description":"bad password"}"#,
        ))
        .expect(1)
        .mount(&upstream)
        .await;
    mount_events(&upstream, 0).await;

    let server = TestServer::start(&upstream, Arc::new(Cache::new()), CacheLevel::All).await;
    let (status, body) = server.get("/view/schedule?location-id=L1").await;
    server.stop().await;

    assert_eq!(status, 502);
    assert!(body.contains("Schedule unavailable"));
    upstream.verify().await;
}

#[tokio::test]
async fn test_health_reports_cache_size() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, Arc::new(Cache::new()), CacheLevel::All).await;

    let (status, body) = server.get("/health").await;
    server.stop().await;

    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["cached_entries"], 0);
}
