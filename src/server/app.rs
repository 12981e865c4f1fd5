use askama::Template;
use askama_web::WebTemplate;
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{extract::FromRef, extract::State, http::StatusCode, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use routes::{admin_router, category_router, polls_router, users_router};
use sqlx::SqlitePool;
use std::fs::create_dir_all;
use std::path::Path;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use anyhow::Context;

use super::auth::CurrentUser;
use super::routes;
use super::ApiResponse;
use crate::config::{MediaSettings, SessionSettings, Settings};
use crate::db::queries::{categories, pages};
use crate::db::{Category, Page, User};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub(crate) pool: SqlitePool,
    pub(crate) media: MediaSettings,
    pub(crate) session: SessionSettings,
}

impl AppState {
    pub fn new(pool: SqlitePool, media: MediaSettings, session: SessionSettings) -> Self {
        Self {
            pool,
            media,
            session,
        }
    }
}

fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.exists() {
        create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    if !dir.is_dir() {
        anyhow::bail!("{} should be a directory or not exist", dir.display());
    }
    Ok(())
}

pub fn app(state: AppState) -> Router {
    let static_dir = state.media.static_dir.clone();
    let media_dir = state.media.media_dir.clone();

    Router::new()
        .route("/", get(index))
        .route("/rango", get(index))
        .route("/rango/", get(index))
        .route("/rango/about", get(about))
        .route("/metrics", get(metrics))
        .with_state(state.clone())
        .nest_service("/static", ServeDir::new(static_dir))
        .nest_service("/media", ServeDir::new(media_dir))
        .merge(category_router(state.clone()))
        .merge(users_router(state.clone()))
        .merge(polls_router(state.clone()))
        .merge(admin_router(state))
        .fallback(|| async {
            tracing::info!("Fallback");
            StatusCode::NOT_FOUND
        })
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(pool: SqlitePool, settings: Settings) -> anyhow::Result<()> {
    ensure_dir(&settings.media.static_dir)?;
    ensure_dir(&settings.media.media_dir)?;

    let addr = settings.application.address();
    let state = AppState::new(pool, settings.media, settings.session);
    let app = app(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Cannot bind to {addr}"))?;

    tracing::info!("Serving on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/index.html")]
struct IndexPage {
    current_user: Option<User>,
    boldmessage: &'static str,
    categories: Vec<Category>,
    pages: Vec<Page>,
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/about.html")]
struct AboutPage {
    current_user: Option<User>,
    boldmessage: &'static str,
}

async fn index(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
) -> ApiResponse<IndexPage> {
    Ok(IndexPage {
        current_user,
        boldmessage: "Crunchy, creamy, cookie, candy, cupcake!",
        categories: categories::get_most_liked_categories(&pool, 5).await?,
        pages: pages::get_most_viewed_pages(&pool, 5).await?,
    })
}

async fn about(CurrentUser(current_user): CurrentUser) -> AboutPage {
    AboutPage {
        current_user,
        boldmessage: "This tutorial has been put together by Marc Auf der Heyde.",
    }
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metrics = prometheus::gather();
    let mut buf = vec![];
    if let Err(e) = encoder.encode(&metrics, &mut buf) {
        tracing::error!("Cannot encode metrics: {e}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(Body::from(buf))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
