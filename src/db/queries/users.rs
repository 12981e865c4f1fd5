use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Serialize, sqlx::FromRow, Clone, Debug)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Serialize, sqlx::FromRow, Clone, Debug, Default)]
pub struct UserProfile {
    pub user_id: i64,
    pub website: Option<String>,
    pub picture: Option<String>,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub is_staff: bool,
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users WHERE users.id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users WHERE users.username = ?1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn username_taken(pool: &SqlitePool, username: &str) -> sqlx::Result<bool> {
    Ok(get_user_by_username(pool, username).await?.is_some())
}

/// Inserts the user together with its profile row.
pub async fn create_user(
    pool: &SqlitePool,
    user: NewUser<'_>,
    profile: &UserProfile,
) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;
    let user_id = insert_user(&mut *tx, user, profile).await?;
    tx.commit().await?;
    Ok(user_id)
}

/// Same as [`create_user`] on a connection the caller owns, so the caller
/// decides when the rows become visible.
pub async fn insert_user(
    conn: &mut SqliteConnection,
    user: NewUser<'_>,
    profile: &UserProfile,
) -> sqlx::Result<i64> {
    let user_id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, is_staff, date_joined) VALUES(?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(user.username)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.is_staff)
    .bind(Utc::now().trunc_subsecs(0))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, website, picture) VALUES(?1, ?2, ?3)
        "#,
    )
    .bind(user_id)
    .bind(profile.website.as_deref())
    .bind(profile.picture.as_deref())
    .execute(&mut *conn)
    .await?;

    Ok(user_id)
}

pub async fn get_profile(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Option<UserProfile>> {
    sqlx::query_as::<_, UserProfile>(
        r#"
        SELECT user_id, website, picture FROM user_profiles WHERE user_id = ?1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn set_active(pool: &SqlitePool, user_id: i64, active: bool) -> sqlx::Result<()> {
    get_user(pool, user_id).await?;
    sqlx::query(
        r#"
        UPDATE users SET is_active = ?1 WHERE users.id = ?2
        "#,
    )
    .bind(active)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_users(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
}
