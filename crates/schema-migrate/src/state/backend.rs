//! Ledger trait for applied-migration storage.
//!
//! The [`MigrationRepository`] trait defines the interface the migrator uses
//! to record which migrations ran and in which batch:
//!
//! - **Database**: [`DatabaseMigrationRepository`](super::DatabaseMigrationRepository)
//!   in `db.rs`, a table on the migrated database itself
//!
//! Only the applied state is persisted. Pending migrations are derived by
//! diffing the discovered files against [`get_ran`](MigrationRepository::get_ran).

use async_trait::async_trait;

use super::MigrationRecord;
use crate::error::Result;

/// Persistence for the applied-migration ledger.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the migrator holds them behind a
/// shared reference for the whole run.
///
/// # Example
///
/// ```rust,ignore
/// let repo = DatabaseMigrationRepository::new(&conn, "migrations");
/// if !repo.repository_exists().await? {
///     repo.create_repository().await?;
/// }
/// let batch = repo.get_next_batch_number().await?;
/// repo.log("2024_01_01_000000_create_users", batch).await?;
/// ```
#[async_trait]
pub trait MigrationRepository: Send + Sync {
    /// Names of every applied migration, in application order.
    async fn get_ran(&self) -> Result<Vec<String>>;

    /// All ledger rows ordered by batch, then name.
    async fn get_records(&self) -> Result<Vec<MigrationRecord>>;

    /// Rows of the most recent batch, most recently applied first.
    async fn get_last(&self) -> Result<Vec<MigrationRecord>>;

    /// Highest batch number, or 0 for an empty ledger.
    async fn get_last_batch_number(&self) -> Result<i64>;

    /// Batch number the next run will use.
    async fn get_next_batch_number(&self) -> Result<i64> {
        Ok(self.get_last_batch_number().await? + 1)
    }

    /// Record one applied migration.
    async fn log(&self, migration: &str, batch: i64) -> Result<()>;

    /// Remove one migration from the ledger after its `down` step.
    async fn delete(&self, migration: &str) -> Result<()>;

    /// Create the ledger storage.
    async fn create_repository(&self) -> Result<()>;

    async fn repository_exists(&self) -> Result<bool>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}
