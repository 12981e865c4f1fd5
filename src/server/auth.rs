//! Password hashing, login sessions and the extractors that gate views on
//! them.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    config::SessionSettings,
    db::{queries::sessions, User},
    server::{app::AppState, ApiError},
};

pub const LOGIN_URL: &str = "/rango/login";

/// Hash a password with Argon2id into a PHC string.
pub fn hash_password(password: &SecretString) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Password hashing failed: {e}")))
}

pub fn verify_password(password: &SecretString, hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed_hash)
        .is_ok())
}

/// Creates a session row for the user and returns the jar with the session
/// cookie set.
pub async fn login(
    pool: &SqlitePool,
    settings: &SessionSettings,
    jar: CookieJar,
    user: &User,
) -> Result<CookieJar, ApiError> {
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = Utc::now() + Duration::seconds(settings.max_age_seconds);
    sessions::create_session(pool, &token, user.id, expires_at).await?;
    tracing::info!(user = %user.username, "User logged in");

    let cookie = Cookie::build((settings.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure);
    Ok(jar.add(cookie))
}

pub async fn logout(
    pool: &SqlitePool,
    settings: &SessionSettings,
    jar: CookieJar,
) -> Result<CookieJar, ApiError> {
    if let Some(cookie) = jar.get(&settings.cookie_name) {
        sessions::delete_session(pool, cookie.value()).await?;
    }
    Ok(jar.remove(Cookie::build((settings.cookie_name.clone(), "")).path("/")))
}

/// Only same-site absolute paths are followed after login. Browsers drop
/// tabs and newlines from urls, so any control character or whitespace
/// disqualifies the path.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(|c| c.is_control() || c.is_whitespace()) =>
        {
            path
        }
        _ => "/rango/",
    }
}

fn login_redirect(uri: &Uri) -> Redirect {
    let target = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    match serde_urlencoded::to_string([("next", target)]) {
        Ok(query) => Redirect::to(&format!("{LOGIN_URL}?{query}")),
        Err(_) => Redirect::to(LOGIN_URL),
    }
}

/// The logged-in user, if any.
pub struct CurrentUser(pub Option<User>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = jar.get(&state.session.cookie_name) else {
            return Ok(CurrentUser(None));
        };
        let user = sessions::get_session_user(&state.pool, cookie.value(), Utc::now()).await?;
        Ok(CurrentUser(user))
    }
}

/// Rejects anonymous visitors with a redirect to the login page.
pub struct RequireUser(pub User);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(CurrentUser(Some(user))) => Ok(RequireUser(user)),
            Ok(CurrentUser(None)) => Err(login_redirect(&parts.uri).into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}

/// Like [`RequireUser`] and additionally demands the staff flag.
pub struct RequireStaff(pub User);

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireUser(user) = RequireUser::from_request_parts(parts, state).await?;
        if user.is_staff {
            Ok(RequireStaff(user))
        } else {
            tracing::warn!(user = %user.username, path = %parts.uri.path(), "Non-staff user denied");
            Err((StatusCode::FORBIDDEN, "Forbidden").into_response())
        }
    }
}
