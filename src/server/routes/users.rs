use std::path::{Path, PathBuf};

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use axum_extra::extract::cookie::CookieJar;
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use secrecy::SecretString;
use serde::Deserialize;
use sqlx::SqlitePool;
use tempfile::NamedTempFile;
use validator::{Validate, ValidationError};

use crate::{
    config::{MediaSettings, SessionSettings},
    db::{
        queries::{
            self,
            users::{self, NewUser, UserProfile},
        },
        User,
    },
    server::{
        app::AppState,
        auth::{self, CurrentUser, RequireUser},
        deserializers::{empty_string_as_none, non_empty},
    },
    telemetry::LOGINS_CNTR,
};

use super::{form_errors, ApiError, ApiResponse};

const USERNAME_TAKEN: &str = "A user with that username already exists.";
// the picture may use up to 10 MiB, the text fields get the rest
const REGISTER_BODY_LIMIT: usize = 10 * 1024 * 1024 + 64 * 1024;

// missing fields are reported by validation, not rejected by the extractor
#[derive(TryFromMultipart)]
struct RegistrationForm {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    website: Option<String>,
    #[form_data(limit = "10MiB")]
    picture: Option<FieldData<NamedTempFile>>,
}

#[derive(Validate)]
struct UserForm {
    #[validate(length(
        min = 1,
        max = 150,
        message = "Please enter a username, at most 150 characters."
    ))]
    username: String,
    #[validate(email(message = "Please enter a valid email address."))]
    email: String,
    #[validate(custom(function = "password_length"))]
    password: String,
}

#[derive(Validate, Default)]
struct ProfileForm {
    #[validate(url(message = "Please enter a valid website URL."))]
    website: Option<String>,
}

fn password_length(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 8 {
        return Err(ValidationError::new("password_length")
            .with_message("The password must be at least 8 characters long.".into()));
    }
    Ok(())
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: SecretString,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    next: Option<String>,
}

#[derive(Deserialize)]
struct NextQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    next: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/register.html")]
struct RegisterPage {
    current_user: Option<User>,
    registered: bool,
    username: String,
    email: String,
    website: String,
    errors: Vec<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/login.html")]
struct LoginPage {
    current_user: Option<User>,
    next: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/restricted.html")]
struct RestrictedPage {
    current_user: Option<User>,
}

async fn register_form(CurrentUser(current_user): CurrentUser) -> RegisterPage {
    RegisterPage {
        current_user,
        registered: false,
        username: String::new(),
        email: String::new(),
        website: String::new(),
        errors: vec![],
    }
}

// keeps only the final path component and characters safe in a url
fn picture_file_name(username: &str, original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("picture");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", users_slug(username), cleaned)
}

fn users_slug(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

fn store_picture(media: &MediaSettings, file_name: &str, contents: NamedTempFile) -> anyhow::Result<()> {
    let dir: PathBuf = media.media_dir.join("profile_images");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(file_name);
    if let Err(e) = contents.persist(&path) {
        // the temp dir may live on another filesystem
        std::fs::copy(e.file.path(), &path)?;
    }
    Ok(())
}

async fn register(
    State(pool): State<SqlitePool>,
    State(media): State<MediaSettings>,
    CurrentUser(current_user): CurrentUser,
    TypedMultipart(form): TypedMultipart<RegistrationForm>,
) -> ApiResponse<RegisterPage> {
    let user_form = UserForm {
        username: form.username.unwrap_or_default().trim().to_owned(),
        email: form.email.unwrap_or_default().trim().to_owned(),
        password: form.password.unwrap_or_default(),
    };
    let profile_form = ProfileForm {
        website: non_empty(form.website),
    };
    let picture = form
        .picture
        .filter(|p| p.metadata.file_name.as_deref().is_some_and(|n| !n.is_empty()));

    let mut errors = vec![];
    if let Err(e) = user_form.validate() {
        errors.extend(form_errors(&e));
    }
    if let Err(e) = profile_form.validate() {
        errors.extend(form_errors(&e));
    }
    if errors.is_empty() && users::username_taken(&pool, &user_form.username).await? {
        errors.push(USERNAME_TAKEN.to_owned());
    }

    let mut page = RegisterPage {
        current_user,
        registered: false,
        username: user_form.username.clone(),
        email: user_form.email.clone(),
        website: profile_form.website.clone().unwrap_or_default(),
        errors,
    };
    if !page.errors.is_empty() {
        return Ok(page);
    }

    let password = SecretString::from(user_form.password);
    let password_hash = auth::hash_password(&password)?;
    let mut profile = UserProfile {
        website: profile_form.website,
        ..Default::default()
    };
    let mut upload = None;
    if let Some(picture) = picture {
        let original = picture.metadata.file_name.unwrap_or_default();
        let file_name = picture_file_name(&user_form.username, &original);
        profile.picture = Some(format!("profile_images/{file_name}"));
        upload = Some((file_name, picture.contents));
    }

    let new_user = NewUser {
        username: &user_form.username,
        email: &user_form.email,
        password_hash: &password_hash,
        is_staff: false,
    };
    // the rows only become visible once the picture is on disk
    let mut tx = pool.begin().await?;
    match users::insert_user(&mut *tx, new_user, &profile).await {
        Ok(id) => {
            if let Some((file_name, contents)) = upload {
                if let Err(e) = store_picture(&media, &file_name, contents) {
                    tx.rollback().await?;
                    return Err(e.into());
                }
            }
            tx.commit().await?;
            tracing::info!(id, username = %user_form.username, "User registered");
            page.registered = true;
        }
        Err(e) if queries::is_unique_violation(&e) => {
            tx.rollback().await?;
            page.errors.push(USERNAME_TAKEN.to_owned());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(page)
}

async fn login_form(
    CurrentUser(current_user): CurrentUser,
    Query(query): Query<NextQuery>,
) -> LoginPage {
    LoginPage {
        current_user,
        next: query.next.unwrap_or_default(),
    }
}

async fn login(
    State(pool): State<SqlitePool>,
    State(session): State<SessionSettings>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> ApiResponse<Response> {
    let username = form.username.trim();
    let user = users::get_user_by_username(&pool, username).await?;
    let user = match user {
        Some(user) if auth::verify_password(&form.password, &user.password_hash)? => user,
        _ => {
            LOGINS_CNTR.with_label_values(&["invalid"]).inc();
            tracing::warn!(username, "Invalid login details supplied");
            return Ok((StatusCode::UNAUTHORIZED, "Invalid login details supplied.").into_response());
        }
    };
    if !user.is_active {
        LOGINS_CNTR.with_label_values(&["disabled"]).inc();
        return Ok((StatusCode::FORBIDDEN, "Your Rango account is disabled.").into_response());
    }

    let jar = auth::login(&pool, &session, jar, &user).await?;
    LOGINS_CNTR.with_label_values(&["success"]).inc();
    let next = auth::safe_next(form.next.as_deref());
    Ok((jar, Redirect::to(next)).into_response())
}

async fn restricted(RequireUser(user): RequireUser) -> RestrictedPage {
    RestrictedPage {
        current_user: Some(user),
    }
}

async fn logout(
    State(pool): State<SqlitePool>,
    State(session): State<SessionSettings>,
    RequireUser(user): RequireUser,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let jar = auth::logout(&pool, &session, jar).await?;
    tracing::info!(user = %user.username, "User logged out");
    Ok((jar, Redirect::to("/rango/")))
}

pub fn users_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/rango/register",
            get(register_form)
                .post(register)
                .layer(DefaultBodyLimit::max(REGISTER_BODY_LIMIT)),
        )
        .route("/rango/login", get(login_form).post(login))
        .route("/rango/restricted", get(restricted))
        .route("/rango/logout", get(logout))
        .with_state(state)
}
