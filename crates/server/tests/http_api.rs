//! End-to-end checks of the HTTP surface against a server bound to an
//! ephemeral port.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use impview_common::{ErrorBody, LogsResponse, StatusResponse};
use impview_server::{Containment, FileAccess, ServerConfig, router};
use reqwest::StatusCode;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestServer {
    _dir: TempDir,
    base: PathBuf,
    url: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let base = dir.path().canonicalize().unwrap();
        fs::create_dir_all(base.join("log_samples")).unwrap();
        fs::create_dir_all(base.join("log_samples-evil")).unwrap();

        let config = ServerConfig {
            log_root: base.join("log_samples"),
            containment: Containment::Ancestor,
            ..ServerConfig::default()
        };
        let app = router(FileAccess::new(&config).unwrap(), &config.allow_origin).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server failed");
        });

        Self {
            _dir: dir,
            base,
            url: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.base.join(relative);
        fs::write(&path, contents).unwrap();
        path
    }

    async fn get(&self, route: &str, query: &[(&str, &str)]) -> reqwest::Response {
        let url = url::Url::parse_with_params(&format!("{}{route}", self.url), query)
            .expect("invalid url");
        self.client
            .get(url)
            .send()
            .await
            .expect("request failed")
    }
}

fn set_mtime(path: &Path, millis: u64) {
    let mtime = std::time::UNIX_EPOCH + std::time::Duration::from_millis(millis);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

#[tokio::test]
async fn test_logs_and_status_follow_file_updates() {
    let server = TestServer::start().await;
    let path = server.write("log_samples/a.json", r#"[{"timestamp":1,"type":"x"}]"#);
    set_mtime(&path, 1_000_000);

    let response = server.get("/api/logs", &[("file", "a.json")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let body: LogsResponse = response.json().await.unwrap();
    assert_eq!(body.records.len(), 1);
    assert_eq!(body.last_modified, 1_000_000);

    server.write(
        "log_samples/a.json",
        r#"[{"timestamp":1,"type":"x"},{"timestamp":2,"type":"y"}]"#,
    );
    set_mtime(&path, 2_000_000);

    let status: StatusResponse = server
        .get("/api/logs/status", &[("file", "a.json")])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status.last_modified, 2_000_000);

    let body: serde_json::Value = server
        .get("/api/logs", &[("file", "a.json")])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "records": [{"timestamp":2,"type":"y"},{"timestamp":1,"type":"x"}],
            "lastModified": 2_000_000
        })
    );
}

#[tokio::test]
async fn test_error_statuses() {
    let server = TestServer::start().await;
    server.write("log_samples/bad.json", "[{\"timestamp\":1,");
    server.write("log_samples-evil/run.json", "[]");

    let cases: [(&str, &[(&str, &str)], StatusCode); 7] = [
        ("/api/logs", &[], StatusCode::BAD_REQUEST),
        ("/api/logs", &[("file", "")], StatusCode::BAD_REQUEST),
        ("/api/logs", &[("file", "../log_samples-evil/run.json")], StatusCode::FORBIDDEN),
        ("/api/logs", &[("file", "missing.json")], StatusCode::NOT_FOUND),
        ("/api/logs", &[("file", "bad.json")], StatusCode::INTERNAL_SERVER_ERROR),
        ("/api/logs/status", &[("file", "/etc/passwd")], StatusCode::FORBIDDEN),
        ("/api/image", &[("path", "missing.png")], StatusCode::NOT_FOUND),
    ];

    for (route, query, expected) in cases {
        let response = server.get(route, query).await;
        assert_eq!(response.status(), expected, "{route} {query:?}");
        let body: ErrorBody = response.json().await.unwrap();
        assert!(!body.error.is_empty());
    }
}

#[tokio::test]
async fn test_unparseable_query_gets_json_error() {
    let server = TestServer::start().await;
    server.write("log_samples/a.json", "[]");

    for route in ["/api/logs", "/api/logs/status"] {
        let response = server
            .get(route, &[("file", "a.json"), ("file", "a.json")])
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{route}");
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );
        let body: ErrorBody = response.json().await.unwrap();
        assert!(body.error.starts_with("Invalid query"), "{}", body.error);
        assert!(body.error.contains("file"), "{}", body.error);
    }

    let response = server
        .get("/api/image", &[("path", "a.png"), ("path", "b.png")])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json().await.unwrap();
    assert!(body.error.starts_with("Invalid query"), "{}", body.error);
}

#[tokio::test]
async fn test_records_without_envelope_are_served() {
    let server = TestServer::start().await;
    server.write(
        "log_samples/loose.json",
        r#"[{"timestamp":1,"type":"x"},{"type":"status","note":"no ts"}]"#,
    );

    let response = server.get("/api/logs", &[("file", "loose.json")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LogsResponse = response.json().await.unwrap();
    assert_eq!(body.records.len(), 2);
    assert_eq!(body.records[0].kind(), "status");
    assert_eq!(body.records[0].timestamp, None);
    assert_eq!(body.records[1].kind(), "x");
}

#[tokio::test]
async fn test_status_of_malformed_file_succeeds() {
    let server = TestServer::start().await;
    server.write("log_samples/bad.json", "not json at all");

    let response = server.get("/api/logs/status", &[("file", "bad.json")]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server.get("/api/logs", &[("file", "bad.json")]).await;
    let body: ErrorBody = response.json().await.unwrap();
    assert!(body.error.contains("not json"), "{}", body.error);
}

#[tokio::test]
async fn test_image_bytes_and_content_type() {
    let server = TestServer::start().await;
    server.write("log_samples/frame.png", "fake-png");

    let response = server.get("/api/image", &[("path", "frame.png")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("image/png")
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"fake-png");

    let response = server.get("/api/image", &[("path", "/etc/hosts")]).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let response = server.get("/health", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
}
