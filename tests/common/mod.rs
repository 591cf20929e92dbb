//! Shared harness: a bootstrapped SQLite-backed app in a temp directory,
//! driven through the router without binding a socket.
#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use sitecms_api::config::Config;
use sitecms_api::db::Database;
use sitecms_api::{bootstrap, routes, AppState};

pub const ADMIN_EMAIL: &str = "admin@shirkasoft.com";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const ADMIN_CLIENT: &str = "shirkasoft";
pub const BOUNDARY: &str = "sitecms-test-boundary";

pub fn test_config(database_url: &str, uploads_dir: PathBuf, front_tokens: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        secret_key: "integration-secret".into(),
        host: "127.0.0.1".into(),
        port: 0,
        uploads_dir: uploads_dir.to_string_lossy().into_owned(),
        max_upload_mb: 5,
        max_image_dimension: 64,
        cors_allowed_origins: vec![],
        access_token_minutes: 60,
        front_tokens: front_tokens.into(),
        front_token: None,
        admin_email: ADMIN_EMAIL.into(),
        admin_password: ADMIN_PASSWORD.into(),
        admin_client: ADMIN_CLIENT.into(),
        smtp_host: None,
        smtp_port: None,
        smtp_username: None,
        smtp_password: None,
        smtp_from: None,
        receiver_email: None,
        from_name: "Sitio Web".into(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub uploads: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_front_tokens("").await
    }

    pub async fn spawn_with_front_tokens(front_tokens: &str) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite://{}", dir.path().join("site.db").display());
        let uploads = dir.path().join("uploads");

        let db = Database::connect(&url).await?;
        let state = AppState::new(db, test_config(&url, uploads.clone(), front_tokens));
        bootstrap(&state).await?;
        let router = routes::router(state.clone());

        Ok(Self {
            state,
            router,
            uploads,
            _dir: dir,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::post("/api/auth/sign-in")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("email={email}&password={password}")))
            .unwrap();
        self.send(request).await
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "admin sign-in failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let request = Request::delete(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn json(&self, method: &str, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn form(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> (StatusCode, Value) {
        self.form_files(method, uri, token, fields, file.as_slice()).await
    }

    /// Like [`form`](Self::form) with any number of file parts.
    pub async fn form_files(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &[u8])],
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, files)))
            .unwrap();
        self.send(request).await
    }

    pub fn stored_file(&self, tenant: &str, name: &str) -> PathBuf {
        self.uploads.join(tenant).join(name)
    }
}

/// Each file is (field name, content type, bytes).
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"upload.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("png encodes");
    out.into_inner()
}
