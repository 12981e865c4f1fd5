mod admin;
mod categories;
mod polls;
mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use validator::ValidationErrors;

pub use admin::admin_router;
pub use categories::category_router;
pub use polls::polls_router;
pub use users::users_router;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error(transparent)]
    DataBase(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResponse<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            ApiError::DataBase(sqlx::Error::RowNotFound) => {
                (StatusCode::NOT_FOUND, "Object not found").into_response()
            }
            error => {
                tracing::error!("Request failed: {:#}", error);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Flattens validation failures into the messages shown above a form,
/// ordered by field name so re-rendered forms are stable.
pub(crate) fn form_errors(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));
    fields
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("Invalid value for {field}."),
            })
        })
        .collect()
}
