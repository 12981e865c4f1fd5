pub mod app;
pub mod auth;
mod deserializers;
mod routes;

pub use routes::{ApiError, ApiResponse};
