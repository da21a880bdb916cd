pub mod calibration;
pub mod idempotency;
pub mod inquiries;
pub mod jobs;
pub mod metrics;
pub mod outbox;
pub mod prompts;
pub mod reconciliation;
pub mod reviews;

pub use models::{Id, TextJson};

/// Embedded schema migrations, applied at process start.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Open a connection pool against the given database URL.
pub async fn connect(database_url: &str, max_connections: u32) -> sqlx::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
}
