use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Serialize, Deserialize, sqlx::FromRow, Clone, Debug, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub likes: i64,
    pub views: i64,
}

/// Lowercases `value`, keeps ASCII alphanumerics and turns every run of
/// whitespace, `-` or `_` into a single `-`. Anything else is dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    slug
}

pub async fn create_category(pool: &SqlitePool, name: &str) -> sqlx::Result<i64> {
    let mut conn = pool.acquire().await?;
    let slug = slugify(name);

    let id = sqlx::query(
        r#"
INSERT INTO categories (name, slug) VALUES (?1, ?2)
        "#,
    )
    .bind(name)
    .bind(slug)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

pub async fn get_category(pool: &SqlitePool, id: i64) -> sqlx::Result<Category> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, slug, likes, views FROM categories WHERE categories.id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn get_category_by_slug(pool: &SqlitePool, slug: &str) -> sqlx::Result<Option<Category>> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, slug, likes, views FROM categories WHERE categories.slug = ?1
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
}

/// True when another category already uses this name or the slug derived
/// from it.
pub async fn category_name_taken(pool: &SqlitePool, name: &str) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM categories WHERE name = ?1 OR slug = ?2
        "#,
    )
    .bind(name)
    .bind(slugify(name))
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn get_all_categories(pool: &SqlitePool) -> sqlx::Result<Vec<Category>> {
    sqlx::query_as::<_, Category>(
        r#"
SELECT id, name, slug, likes, views
FROM categories
ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_most_liked_categories(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<Category>> {
    sqlx::query_as::<_, Category>(
        r#"
SELECT id, name, slug, likes, views
FROM categories
ORDER BY likes DESC, id
LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Returns the new view count, `None` if the category is gone.
pub async fn add_category_view(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar(
        r#"
        UPDATE categories SET views = views + 1 WHERE id = ?1 RETURNING views
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Returns the new like count, `None` if the category is gone.
pub async fn add_category_like(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar(
        r#"
        UPDATE categories SET likes = likes + 1 WHERE id = ?1 RETURNING likes
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn count_categories(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await
}

/// Categories are matched by name; counters of existing rows are replaced
/// with the imported values.
pub async fn import_categories(pool: &SqlitePool, categories: Vec<Category>) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    for category in categories {
        sqlx::query(
            r#"
INSERT INTO categories (name, slug, likes, views) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (name) DO UPDATE SET likes = excluded.likes, views = excluded.views
            "#,
        )
        .bind(&category.name)
        .bind(slugify(&category.name))
        .bind(category.likes)
        .bind(category.views)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}
