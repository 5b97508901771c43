#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use perch::auth::TokenKeys;
use perch::config::Config;
use perch::db;
use perch::media::{LocalMediaStore, MediaClient, MediaStore, StoredMedia, Upload};
use perch::routes;
use perch::state::AppState;

pub const PASSWORD: &str = "password123";

/// A fully wired router over a throwaway database and upload directory.
pub struct TestApp {
    pub tmp: TempDir,
    pub state: AppState,
    pub router: Router,
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub handler: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        Self::build(adjust, |config| -> Arc<dyn MediaStore> {
            Arc::new(LocalMediaStore::new(
                config.uploads_path(),
                &config.storage.public_url,
            ))
        })
    }

    /// Default config with a custom media store behind the client.
    pub fn with_store(make_store: impl FnOnce(&Config) -> Arc<dyn MediaStore>) -> Self {
        Self::build(|_| {}, make_store)
    }

    fn build(
        adjust: impl FnOnce(&mut Config),
        make_store: impl FnOnce(&Config) -> Arc<dyn MediaStore>,
    ) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(tmp.path().join("perch.db"));
        config.storage.path = Some(tmp.path().join("uploads"));
        config.auth.bcrypt_cost = 4;
        adjust(&mut config);

        std::fs::create_dir_all(config.uploads_path()).unwrap();
        let pool = db::create_pool(&config.db_path(), &config.database).unwrap();
        db::run_migrations(&pool).unwrap();

        let media = MediaClient::new(make_store(&config), config.storage.timeout());
        let state = AppState {
            db: pool,
            tokens: Arc::new(TokenKeys::new(b"test-secret", config.auth.token_hours)),
            config: Arc::new(config),
            media,
        };
        let router = routes::app(state.clone());
        Self { tmp, state, router }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.state.config.uploads_path()
    }

    /// Files stored under one upload folder; empty when the folder was never made.
    pub fn stored_files(&self, folder: &str) -> Vec<PathBuf> {
        match std::fs::read_dir(self.uploads_dir().join(folder)) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Runs raw SQL against the app database, e.g. to install a failing trigger.
    pub fn exec(&self, sql: &str) {
        let conn = self.state.db.get().unwrap();
        conn.execute_batch(sql).unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn builder(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let request = Self::builder(Method::GET, uri, token)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let request = Self::builder(Method::POST, uri, token)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let request = Self::builder(Method::DELETE, uri, token)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let request = Self::builder(Method::POST, uri, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_form(&self, uri: &str, token: Option<&str>, form: &MultipartForm) -> (StatusCode, Value) {
        let (content_type, body) = form.encode();
        let request = Self::builder(Method::POST, uri, token)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Registers, logs in and resolves the id of a new user.
    pub async fn signup(&self, handler: &str) -> TestUser {
        let (status, _) = self
            .post_json(
                "/api/auth/register",
                None,
                json!({
                    "email": format!("{handler}@example.com"),
                    "password": PASSWORD,
                    "username": handler,
                    "handler": handler,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {handler}");

        let (status, body) = self
            .post_json(
                "/api/auth/login",
                None,
                json!({ "email": format!("{handler}@example.com"), "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login {handler}");
        let token = body["token"].as_str().unwrap().to_string();

        let (_, profile) = self.get("/api/auth/verify-token", Some(&token)).await;
        TestUser {
            id: profile["id"].as_str().unwrap().to_string(),
            handler: handler.to_string(),
            token,
        }
    }

    /// Inserts a post with a fixed timestamp, bypassing the API.
    pub fn insert_post(&self, id: &str, author_id: &str, parent_id: Option<&str>, created_at: &str) {
        let conn = self.state.db.get().unwrap();
        conn.execute(
            "INSERT INTO posts (id, content, author_id, parent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, format!("post {id}"), author_id, parent_id, created_at],
        )
        .unwrap();
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = self.state.db.get().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }
}

/// Disk-backed store that lets the first `successes` uploads through and
/// fails every upload after that. Destroys always go to disk.
pub struct FlakyStore {
    inner: LocalMediaStore,
    remaining: AtomicUsize,
}

impl FlakyStore {
    pub fn new(config: &Config, successes: usize) -> Arc<dyn MediaStore> {
        Arc::new(Self {
            inner: LocalMediaStore::new(config.uploads_path(), &config.storage.public_url),
            remaining: AtomicUsize::new(successes),
        })
    }
}

#[async_trait]
impl MediaStore for FlakyStore {
    async fn upload(&self, folder: &str, upload: &Upload) -> anyhow::Result<StoredMedia> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            anyhow::bail!("provider unavailable");
        }
        self.inner.upload(folder, upload).await
    }

    async fn destroy(&self, public_id: &str) -> anyhow::Result<()> {
        self.inner.destroy(public_id).await
    }
}

/// Hand-encoded multipart/form-data body for `oneshot` requests.
///
/// Only covers what these tests send: text fields and whole files in one
/// body. `tests/e2e_test.rs` drives the same routes with reqwest's
/// `multipart::Form` over a real socket, which checks this encoding against
/// a standard client.
#[derive(Debug, Default)]
pub struct MultipartForm {
    texts: Vec<(String, String)>,
    files: Vec<(String, String, String, Vec<u8>)>,
}

const BOUNDARY: &str = "perch-test-boundary";

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.texts.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        self.files
            .push((name.into(), file_name.into(), content_type.into(), bytes));
        self
    }

    pub fn encode(&self) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for (name, value) in &self.texts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, file_name, content_type, bytes) in &self.files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }
}

pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.resize(len.max(8), 7);
    bytes
}
