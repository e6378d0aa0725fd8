//! End-to-end tests of the HTTP surface, driving the router in-process.

use arsip::{app::build, config::Config, state::AppState, token::TokenManager};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use clap::Parser;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "arsip-test-boundary";

struct TestApp {
    dir: TempDir,
    state: AppState,
    router: Router,
}

async fn test_app_with(extra: &[&str]) -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let database_url = format!("sqlite://{}", dir.path().join("users.sqlite").display());
    let storage_path = dir.path().join("uploads");
    let storage_path = storage_path.to_str().unwrap();

    let mut args = vec![
        "arsip",
        "--database-url",
        &database_url,
        "--storage-path",
        storage_path,
        "--jwt-secret",
        "integration-secret",
        "--scrypt-log-n",
        "4",
    ];
    args.extend_from_slice(extra);
    let config = Config::try_parse_from(args).unwrap();

    let state = AppState::new(&config).await.expect("Failed to build state");
    let router = build(state.clone());
    TestApp { dir, state, router }
}

async fn test_app() -> TestApp {
    test_app_with(&[]).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn upload(
        &self,
        token: &str,
        path: Option<&str>,
        file_name: &str,
        content: &str,
    ) -> (StatusCode, Value) {
        let mut body = String::new();
        if let Some(path) = path {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n{path}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
        ));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn signup(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            "/signup",
            None,
            json!({
                "fullname": "Rina Kusuma",
                "nidn": "0123456789",
                "username": username,
                "password": password,
            }),
        )
        .await
    }

    async fn token(&self) -> String {
        let (status, _) = self.signup("rina", "rahasia").await;
        assert_eq!(status, StatusCode::CREATED);
        let credentials = json!({ "username": "rina", "password": "rahasia" });
        let (status, body) = self.json(Method::POST, "/signin", None, credentials).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn listed(&self, token: &str, path: &str) -> Vec<(String, String)> {
        let (status, body) = self.get(&format!("/api/list?path={path}"), Some(token)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let mut entries: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e["name"].as_str().unwrap().to_string(),
                    e["type"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        entries.sort();
        entries
    }
}

fn entry(name: &str, kind: &str) -> (String, String) {
    (name.to_string(), kind.to_string())
}

#[tokio::test]
async fn health_check() {
    let app = test_app().await;
    let (status, body) = app.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("API is running".to_string()));
}

#[tokio::test]
async fn unknown_route_is_a_json_404() {
    let app = test_app().await;
    let (status, body) = app.get("/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Endpoint not found");
}

#[tokio::test]
async fn unknown_api_route_is_a_404_without_token() {
    let app = test_app().await;
    let (status, body) = app.get("/api/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Endpoint not found");
}

#[tokio::test]
async fn malformed_bodies_are_a_json_400() {
    let app = test_app().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string(), "{body}");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/signin")
        .body(Body::from(r#"{"username":"rina","password":"pw"}"#))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string(), "{body}");
    assert_eq!(app.state.db.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn signup_with_missing_field_writes_nothing() {
    let app = test_app().await;
    let (status, body) = app
        .json(
            Method::POST,
            "/signup",
            None,
            json!({ "fullname": "Rina", "nidn": "", "username": "rina", "password": "pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, _) = app
        .json(Method::POST, "/signup", None, json!({ "username": "rina" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.state.db.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = test_app().await;
    let (first, body) = app.signup("rina", "one").await;
    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(body["user"]["username"], "rina");
    assert!(body["user"].get("password").is_none());

    let (second, _) = app.signup("rina", "two").await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(app.state.db.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn signup_accepts_urlencoded_forms() {
    let app = test_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/signup")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("fullname=Rina&nidn=01&username=rina&password=pw"))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn signin_outcomes() {
    let app = test_app().await;
    app.signup("rina", "rahasia").await;

    let (status, body) = app
        .json(Method::POST, "/signin", None, json!({ "username": "rina", "password": "rahasia" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let claims = app
        .state
        .tokens
        .validate(body["token"].as_str().unwrap())
        .unwrap();
    let stored = app.state.db.find_user_by_username("rina").await.unwrap().unwrap();
    assert_eq!(claims.id, stored.id);
    assert_eq!(claims.username, stored.username);
    assert_ne!(stored.password, "rahasia");

    let (status, _) = app
        .json(Method::POST, "/signin", None, json!({ "username": "rina", "password": "salah" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::POST, "/signin", None, json!({ "username": "ghost", "password": "x" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(Method::POST, "/signin", None, json!({ "username": "rina" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = test_app().await;

    let (status, body) = app.get("/api/list", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let request = Request::builder()
        .uri("/api/list")
        .header(header::AUTHORIZATION, "Basic cmluYTpyYWhhc2lh")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/list", Some("definitely.not.valid")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.token().await;
    let stored = app.state.db.find_user_by_username("rina").await.unwrap().unwrap();
    let expired = TokenManager::new("integration-secret", time::Duration::minutes(-5))
        .issue(&stored)
        .unwrap();
    let (status, _) = app.get("/api/list", Some(&expired)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let forged = TokenManager::new("another-secret", time::Duration::hours(1))
        .issue(&stored)
        .unwrap();
    let (status, _) = app.get("/api/list", Some(&forged)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_root_and_missing_folder() {
    let app = test_app().await;
    let token = app.token().await;

    assert!(app.listed(&token, "").await.is_empty());
    let (status, body) = app.get("/api/list?path=never-created", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Folder not found");
}

#[tokio::test]
async fn create_folder_then_conflict() {
    let app = test_app().await;
    let token = app.token().await;
    let folder = json!({ "path": "", "folderName": "docs" });

    let (status, _) = app.json(Method::POST, "/api/folder", Some(&token), folder.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(app.state.storage.root().join("docs").is_dir());

    let (status, _) = app.json(Method::POST, "/api/folder", Some(&token), folder).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(Method::POST, "/api/folder", Some(&token), json!({ "path": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_shows_up_in_listing() {
    let app = test_app().await;
    let token = app.token().await;

    let (status, body) = app.upload(&token, Some("docs"), "report.pdf", "%PDF-1.4").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["filename"], "report.pdf");

    assert_eq!(app.listed(&token, "docs").await, vec![entry("report.pdf", "file")]);
    let on_disk =
        std::fs::read_to_string(app.state.storage.root().join("docs/report.pdf")).unwrap();
    assert_eq!(on_disk, "%PDF-1.4");
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let app = test_app().await;
    let token = app.token().await;

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n\
         docs\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_conflicts_when_overwrite_is_disabled() {
    let app = test_app_with(&["--overwrite-uploads", "false"]).await;
    let token = app.token().await;

    let (status, _) = app.upload(&token, None, "a.txt", "first").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.upload(&token, None, "a.txt", "second").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn upload_limit_only_applies_to_uploads() {
    let app = test_app_with(&["--max-upload-bytes", "1024"]).await;
    let token = app.token().await;

    let (status, body) = app.upload(&token, None, "big.bin", &"x".repeat(4096)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{body}");
    assert_eq!(body["message"], "Upload too large");
    assert!(app.listed(&token, "").await.is_empty());

    let (status, _) = app.upload(&token, None, "small.txt", "fits").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .json(
            Method::POST,
            "/signup",
            None,
            json!({
                "fullname": "y".repeat(4096),
                "nidn": "0123456789",
                "username": "long-name",
                "password": "pw",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn delete_folder_removes_nested_content() {
    let app = test_app().await;
    let token = app.token().await;

    app.json(Method::POST, "/api/folder", Some(&token), json!({ "folderName": "docs" }))
        .await;
    app.upload(&token, Some("docs/deep"), "notes.txt", "hello").await;
    assert_eq!(app.listed(&token, "").await, vec![entry("docs", "folder")]);

    let (status, _) = app
        .json(
            Method::DELETE,
            "/api/delete",
            Some(&token),
            json!({ "path": "", "name": "docs", "type": "folder" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.listed(&token, "").await.is_empty());
    assert!(!app.state.storage.root().join("docs").exists());

    let (status, _) = app
        .json(
            Method::DELETE,
            "/api/delete",
            Some(&token),
            json!({ "path": "", "name": "docs", "type": "folder" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn folder_upload_list_delete_round_trip() {
    let app = test_app().await;
    let token = app.token().await;

    let folder = json!({ "path": "", "folderName": "kuliah" });
    let (status, _) = app.json(Method::POST, "/api/folder", Some(&token), folder).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.upload(&token, Some("kuliah"), "silabus.txt", "minggu 1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.listed(&token, "kuliah").await, vec![entry("silabus.txt", "file")]);

    let (status, body) = app
        .json(
            Method::DELETE,
            "/api/delete",
            Some(&token),
            json!({ "path": "kuliah", "name": "silabus.txt", "type": "file" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "\"silabus.txt\" deleted successfully");
    assert!(app.listed(&token, "kuliah").await.is_empty());
}

#[tokio::test]
async fn paths_cannot_escape_the_storage_root() {
    let app = test_app().await;
    let token = app.token().await;
    std::fs::write(app.dir.path().join("outside.txt"), "keep me").unwrap();

    let (status, _) = app.get("/api/list?path=..", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let folder = json!({ "path": "../..", "folderName": "pwned" });
    let (status, _) = app.json(Method::POST, "/api/folder", Some(&token), folder).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(
            Method::DELETE,
            "/api/delete",
            Some(&token),
            json!({ "path": "..", "name": "outside.txt", "type": "file" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.dir.path().join("outside.txt").exists());

    let (status, _) = app.upload(&token, Some("../"), "escape.txt", "x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!app.dir.path().join("escape.txt").exists());
}

// No locking is done on the storage root: two uploads of the same name race
// and the last writer wins. This only pins down that both requests complete
// and a single entry remains.
#[tokio::test]
async fn concurrent_uploads_of_the_same_name() {
    let app = test_app().await;
    let token = app.token().await;

    let (first, second) = tokio::join!(
        app.upload(&token, None, "same.txt", "aaaa"),
        app.upload(&token, None, "same.txt", "bbbb"),
    );
    assert_eq!(first.0, StatusCode::CREATED);
    assert_eq!(second.0, StatusCode::CREATED);
    assert_eq!(app.listed(&token, "").await, vec![entry("same.txt", "file")]);
}
