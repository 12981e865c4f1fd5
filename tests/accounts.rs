mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{body_text, location, session_cookie, TestApp};
use rango::db::queries::users;

fn multipart(fields: &[(&str, &str)], picture: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    let boundary = "rangoboundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    if let Some((file_name, contents)) = picture {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"picture\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

async fn register(app: &TestApp, fields: &[(&str, &str)], picture: Option<(&str, &[u8])>) -> String {
    let (content_type, body) = multipart(fields, picture);
    let request = Request::post("/rango/register")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_text(response).await
}

#[tokio::test]
async fn registration_creates_user_and_profile() {
    let app = TestApp::new().await;
    let body = register(
        &app,
        &[
            ("username", "leifos"),
            ("email", "leif@example.com"),
            ("password", "correct horse battery"),
            ("website", "http://www.tangowithdjango.com"),
        ],
        Some(("me.png", &b"\x89PNG fake"[..])),
    )
    .await;
    assert!(body.contains("Thank you for registering!"));

    let user = users::get_user_by_username(&app.pool, "leifos").await.unwrap().unwrap();
    assert!(user.is_active);
    assert!(user.password_hash.starts_with("$argon2"));
    let profile = users::get_profile(&app.pool, user.id).await.unwrap().unwrap();
    assert_eq!(profile.website.as_deref(), Some("http://www.tangowithdjango.com"));
    assert_eq!(profile.picture.as_deref(), Some("profile_images/leifos_me.png"));
    assert!(app.media.path().join("media/profile_images/leifos_me.png").is_file());
}

#[tokio::test]
async fn registration_errors_are_shown() {
    let app = TestApp::new().await;
    app.create_user("leifos", false).await;

    let body = register(
        &app,
        &[
            ("username", "leifos"),
            ("email", "leif@example.com"),
            ("password", "correct horse battery"),
            ("website", ""),
        ],
        None,
    )
    .await;
    assert!(body.contains("A user with that username already exists."));

    let body = register(
        &app,
        &[
            ("username", "newbie"),
            ("email", "not-an-email"),
            ("password", "short"),
            ("website", "nope"),
        ],
        None,
    )
    .await;
    assert!(body.contains("Please enter a valid email address."));
    assert!(body.contains("at least 8 characters"));
    assert!(body.contains("Please enter a valid website URL."));
    assert!(users::get_user_by_username(&app.pool, "newbie").await.unwrap().is_none());
}

#[tokio::test]
async fn restricted_redirects_anonymous_users() {
    let app = TestApp::new().await;
    let response = app.get("/rango/restricted", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/rango/login?next=%2Frango%2Frestricted");
}

#[tokio::test]
async fn wrong_password_gets_plain_message() {
    let app = TestApp::new().await;
    app.create_user("leifos", false).await;

    let response = app
        .post_form("/rango/login", "username=leifos&password=nope", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&response).is_none());
    assert_eq!(body_text(response).await, "Invalid login details supplied.");

    let response = app
        .post_form("/rango/login", "username=nobody&password=nope", None)
        .await;
    assert_eq!(body_text(response).await, "Invalid login details supplied.");
}

#[tokio::test]
async fn disabled_account_cannot_log_in() {
    let app = TestApp::new().await;
    let id = app.create_user("leifos", false).await;
    users::set_active(&app.pool, id, false).await.unwrap();

    let response = app
        .post_form("/rango/login", "username=leifos&password=correct+horse+battery", None)
        .await;
    assert_eq!(body_text(response).await, "Your Rango account is disabled.");
}

#[tokio::test]
async fn login_follows_next_and_logout_ends_session() {
    let app = TestApp::new().await;
    app.create_user("leifos", false).await;

    let response = app
        .post_form(
            "/rango/login",
            "username=leifos&password=correct+horse+battery&next=%2Frango%2Frestricted",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/rango/restricted");
    let cookie = session_cookie(&response).unwrap();

    let response = app.get("/rango/restricted", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("you can see this text!"));
    assert!(body.contains("Logout leifos"));

    let response = app.get("/rango/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/rango/");

    let response = app.get("/rango/restricted", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn offsite_next_is_ignored() {
    let app = TestApp::new().await;
    app.create_user("leifos", false).await;
    for next in ["https%3A%2F%2Fevil.example", "%2F%09%2Fevil.example", "/%0A/evil.example"] {
        let body = format!("username=leifos&password=correct+horse+battery&next={next}");
        let response = app.post_form("/rango/login", &body, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/rango/", "next={next}");
    }
}

#[tokio::test]
async fn large_picture_within_limit_is_accepted() {
    let app = TestApp::new().await;
    let picture = vec![0u8; 3 * 1024 * 1024];
    let body = register(
        &app,
        &[
            ("username", "pic"),
            ("email", "pic@example.com"),
            ("password", "correct horse battery"),
        ],
        Some(("big.png", picture.as_slice())),
    )
    .await;
    assert!(body.contains("Thank you for registering!"));
    let stored = app.media.path().join("media/profile_images/pic_big.png");
    assert_eq!(std::fs::metadata(stored).unwrap().len(), picture.len() as u64);
}

#[tokio::test]
async fn failed_picture_store_keeps_username_free() {
    let app = TestApp::new().await;
    let media_dir = app.media.path().join("media");
    std::fs::create_dir_all(&media_dir).unwrap();
    std::fs::write(media_dir.join("profile_images"), b"not a directory").unwrap();
    let fields = [
        ("username", "pic"),
        ("email", "pic@example.com"),
        ("password", "correct horse battery"),
    ];

    let (content_type, body) = multipart(&fields, Some(("a.png", &b"png"[..])));
    let request = Request::post("/rango/register")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(users::get_user_by_username(&app.pool, "pic").await.unwrap().is_none());
    assert_eq!(users::count_users(&app.pool).await.unwrap(), 0);

    std::fs::remove_file(media_dir.join("profile_images")).unwrap();
    let body = register(&app, &fields, Some(("a.png", &b"png"[..]))).await;
    assert!(body.contains("Thank you for registering!"));
}

#[tokio::test]
async fn missing_registration_fields_redisplay_form() {
    let app = TestApp::new().await;
    let body = register(&app, &[("email", "leif@example.com")], None).await;
    assert!(body.contains("Please enter a username"));
    assert!(body.contains("at least 8 characters"));
    assert!(!body.contains("Thank you for registering!"));
    assert_eq!(users::count_users(&app.pool).await.unwrap(), 0);
}
