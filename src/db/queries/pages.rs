use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Serialize, Deserialize, sqlx::FromRow, Clone, Debug, PartialEq)]
pub struct Page {
    pub id: i64,
    pub category_id: i64,
    pub title: String,
    pub url: String,
    pub views: i64,
}

/// A page joined with its category, as listed in the admin and in exports.
#[derive(Serialize, Deserialize, sqlx::FromRow, Clone, Debug)]
pub struct PageListing {
    pub category: String,
    pub title: String,
    pub url: String,
    pub views: i64,
}

pub struct Visit {
    pub url: String,
    pub category_id: i64,
}

pub async fn create_page(
    pool: &SqlitePool,
    category_id: i64,
    title: &str,
    url: &str,
) -> sqlx::Result<i64> {
    let mut conn = pool.acquire().await?;

    let id = sqlx::query(
        r#"
INSERT INTO pages (category_id, title, url) VALUES (?1, ?2, ?3)
        "#,
    )
    .bind(category_id)
    .bind(title)
    .bind(url)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

pub async fn get_pages_for_category(pool: &SqlitePool, category_id: i64) -> sqlx::Result<Vec<Page>> {
    sqlx::query_as::<_, Page>(
        r#"
SELECT id, category_id, title, url, views
FROM pages
WHERE category_id = ?1
ORDER BY views DESC, id
        "#,
    )
    .bind(category_id)
    .fetch_all(pool)
    .await
}

pub async fn get_most_viewed_pages(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<Page>> {
    sqlx::query_as::<_, Page>(
        r#"
SELECT id, category_id, title, url, views
FROM pages
ORDER BY views DESC, id
LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn get_page_listings(pool: &SqlitePool) -> sqlx::Result<Vec<PageListing>> {
    sqlx::query_as::<_, PageListing>(
        r#"
SELECT categories.name AS category, pages.title, pages.url, pages.views
FROM pages JOIN categories ON pages.category_id = categories.id
ORDER BY categories.name, pages.title
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Bumps the view counter and hands back where the visitor should go.
pub async fn record_visit(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Visit>> {
    let row: Option<(String, i64)> = sqlx::query_as(
        r#"
        UPDATE pages SET views = views + 1 WHERE id = ?1 RETURNING url, category_id
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(url, category_id)| Visit { url, category_id }))
}

pub async fn count_pages(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM pages")
        .fetch_one(pool)
        .await
}

/// Pages reference their category by name. Rows whose category is unknown
/// are skipped, pages already present with the same url are updated.
pub async fn import_pages(pool: &SqlitePool, pages: Vec<PageListing>) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut imported = 0;
    for page in pages {
        let category_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM categories WHERE name = ?1")
                .bind(&page.category)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(category_id) = category_id else {
            tracing::warn!(category = %page.category, title = %page.title, "Skipping page of unknown category");
            continue;
        };
        let updated = sqlx::query(
            r#"
UPDATE pages SET title = ?1, views = ?2 WHERE category_id = ?3 AND url = ?4
            "#,
        )
        .bind(&page.title)
        .bind(page.views)
        .bind(category_id)
        .bind(&page.url)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            sqlx::query(
                r#"
INSERT INTO pages (category_id, title, url, views) VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(category_id)
            .bind(&page.title)
            .bind(&page.url)
            .bind(page.views)
            .execute(&mut *tx)
            .await?;
        }
        imported += 1;
    }
    tx.commit().await?;
    Ok(imported)
}
