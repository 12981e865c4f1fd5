pub mod categories;
pub mod pages;
pub mod questions;
pub mod sessions;
pub mod users;

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(e) if e.is_unique_violation())
}
