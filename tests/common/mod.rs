//! Helpers for driving the router without binding a socket.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use rango::config::{MediaSettings, SessionSettings};
use rango::db::{
    self,
    queries::users::{create_user, NewUser, UserProfile},
};
use rango::server::{app::{app, AppState}, auth::hash_password};
use secrecy::SecretString;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = db::establish_in_memory().await.unwrap();
        let media = tempfile::tempdir().unwrap();
        let settings = MediaSettings {
            static_dir: media.path().join("static"),
            media_dir: media.path().join("media"),
        };
        let state = AppState::new(pool.clone(), settings, SessionSettings::default());
        Self {
            router: app(state),
            pool,
            media,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_owned())).unwrap()).await
    }

    pub async fn create_user(&self, username: &str, is_staff: bool) -> i64 {
        let hash = hash_password(&SecretString::from(PASSWORD)).unwrap();
        let user = NewUser {
            username,
            email: "user@example.com",
            password_hash: &hash,
            is_staff,
        };
        create_user(&self.pool, user, &UserProfile::default()).await.unwrap()
    }

    /// Logs in and returns the `name=value` pair to send back as a cookie.
    pub async fn login(&self, username: &str) -> String {
        let body = format!("username={username}&password=correct+horse+battery");
        let response = self.post_form("/rango/login", &body, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response).expect("login sets a session cookie")
    }
}

pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sessionid="))
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
