#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use gazette_db::Database;
use gazette_types::input::{NewUser, ProfileInput};
use gazette_web::mail::{MemoryMailer, OutgoingEmail};
use gazette_web::media::MediaStore;
use gazette_web::password::hash_password;
use gazette_web::{AppState, AppStateInner, router};

pub const SITE_URL: &str = "http://testserver";
pub const PASSWORD: &str = "plum-orchard-42";
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRtest-image";

const BOUNDARY: &str = "gazette-test-boundary";

pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

impl TestResponse {
    pub fn assert_redirect(&self, to: &str) {
        assert_eq!(self.status, StatusCode::SEE_OTHER, "body: {}", self.body);
        assert_eq!(self.location.as_deref(), Some(to));
    }
}

/// One browser: an app handle plus its own cookie store.
pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    router: Router,
    cookies: BTreeMap<String, String>,
    _media: Arc<TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(media_dir.path().to_path_buf()).await.unwrap();
        let mailer = Arc::new(MemoryMailer::default());
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            secret_key: "test-secret-key-for-integration-tests".into(),
            site_url: SITE_URL.into(),
            media,
            mailer: mailer.clone(),
            token_timeout: Duration::from_secs(3 * 24 * 60 * 60),
        });
        Self {
            router: router::build(state.clone()),
            state,
            mailer,
            cookies: BTreeMap::new(),
            _media: Arc::new(media_dir),
        }
    }

    /// Another browser against the same server, with no cookies.
    pub fn new_client(&self) -> Self {
        Self {
            state: self.state.clone(),
            mailer: self.mailer.clone(),
            router: self.router.clone(),
            cookies: BTreeMap::new(),
            _media: self._media.clone(),
        }
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub async fn send(&mut self, builder: axum::http::request::Builder, body: Body) -> TestResponse {
        let mut builder = builder;
        if !self.cookies.is_empty() {
            let header_value = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, header_value);
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        for value in response.headers().get_all(header::SET_COOKIE) {
            let value = value.to_str().unwrap();
            let pair = value.split(';').next().unwrap();
            let (name, val) = pair.split_once('=').unwrap();
            if val.is_empty() || value.contains("Max-Age=0") {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), val.to_string());
            }
        }

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            location,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Request::builder().method(Method::GET).uri(uri), Body::empty())
            .await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(builder, Body::from(body)).await
    }

    /// POST a multipart body. Files are `(field, file name, bytes)`.
    pub async fn post_multipart(
        &mut self,
        uri: &str,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &[u8])],
    ) -> TestResponse {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, file_name, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        self.send(builder, Body::from(body)).await
    }

    /// Insert an active account directly. Returns its id.
    pub fn create_user(&self, email: &str, first_name: &str, last_name: &str, staff: bool) -> i64 {
        self.state
            .db
            .create_user(
                &NewUser {
                    email: email.into(),
                    first_name: first_name.into(),
                    last_name: last_name.into(),
                    password_hash: hash_password(PASSWORD).unwrap(),
                    is_active: true,
                    is_staff: staff,
                },
                &ProfileInput::default(),
            )
            .unwrap()
    }

    pub async fn login(&mut self, email: &str) {
        self.login_with(email, PASSWORD).await;
    }

    pub async fn login_with(&mut self, email: &str, password: &str) {
        let response = self
            .post_form("/users/login/", &[("email", email), ("password", password)])
            .await;
        response.assert_redirect("/");
    }

    pub fn outbox(&self) -> Vec<OutgoingEmail> {
        self.mailer.outbox()
    }
}

/// The site-relative path of the first link in an email body.
pub fn link_path(email: &OutgoingEmail) -> String {
    let line = email
        .body
        .lines()
        .find(|line| line.starts_with(SITE_URL))
        .expect("email has no link");
    line.trim()[SITE_URL.len()..].to_string()
}
