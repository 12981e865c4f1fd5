use chrono::{DateTime, SubsecRound, Utc};
use sqlx::SqlitePool;

use super::users::User;

pub async fn create_session(
    pool: &SqlitePool,
    token: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)
        "#,
    )
    .bind(token)
    .bind(user_id)
    .bind(expires_at.trunc_subsecs(0))
    .execute(pool)
    .await?;
    Ok(())
}

/// The active user owning an unexpired session.
pub async fn get_session_user(
    pool: &SqlitePool,
    token: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
SELECT users.*
FROM sessions JOIN users ON sessions.user_id = users.id
WHERE sessions.token = ?1 AND sessions.expires_at > ?2 AND users.is_active
        "#,
    )
    .bind(token)
    .bind(now.trunc_subsecs(0))
    .fetch_optional(pool)
    .await
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_expired_sessions(pool: &SqlitePool, now: DateTime<Utc>) -> sqlx::Result<u64> {
    Ok(sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
        .bind(now.trunc_subsecs(0))
        .execute(pool)
        .await?
        .rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_in_memory;
    use crate::db::queries::users::{create_user, set_active, NewUser, UserProfile};
    use chrono::Duration;

    async fn user(pool: &SqlitePool) -> i64 {
        let new_user = NewUser {
            username: "leifos",
            email: "",
            password_hash: "hash",
            is_staff: false,
        };
        create_user(pool, new_user, &UserProfile::default()).await.unwrap()
    }

    #[tokio::test]
    async fn session_resolves_until_expiry() {
        let pool = establish_in_memory().await.unwrap();
        let user_id = user(&pool).await;
        let now = Utc::now();
        create_session(&pool, "abc", user_id, now + Duration::hours(1)).await.unwrap();

        let found = get_session_user(&pool, "abc", now).await.unwrap().unwrap();
        assert_eq!(found.id, user_id);
        assert!(get_session_user(&pool, "abc", now + Duration::hours(2))
            .await
            .unwrap()
            .is_none());
        assert_eq!(delete_expired_sessions(&pool, now + Duration::hours(2)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn inactive_user_has_no_session() {
        let pool = establish_in_memory().await.unwrap();
        let user_id = user(&pool).await;
        let now = Utc::now();
        create_session(&pool, "abc", user_id, now + Duration::hours(1)).await.unwrap();
        set_active(&pool, user_id, false).await.unwrap();
        assert!(get_session_user(&pool, "abc", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_session_is_gone() {
        let pool = establish_in_memory().await.unwrap();
        let user_id = user(&pool).await;
        let now = Utc::now();
        create_session(&pool, "abc", user_id, now + Duration::hours(1)).await.unwrap();
        delete_session(&pool, "abc").await.unwrap();
        assert!(get_session_user(&pool, "abc", now).await.unwrap().is_none());
    }
}
