// Postgres state store with sqlx

pub mod models;
pub mod repositories;

pub use models::*;
pub use repositories::Database;
