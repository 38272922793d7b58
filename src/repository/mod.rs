mod conversion;
mod partner_repository;
mod partner_submission_repository;
mod submission_repository;

pub use partner_repository::{PartnerRepository, PartnerStorageEvent};
pub use partner_submission_repository::{PartnerSubmissionRepository, PendingPartnerSubmission};
pub use submission_repository::{SubmissionFilter, SubmissionRepository, SubmissionStorageEvent};

/// A fresh in-memory database with all migrations applied.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    // Every connection to `sqlite::memory:` opens its own database, so keep exactly one alive.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    pool
}
