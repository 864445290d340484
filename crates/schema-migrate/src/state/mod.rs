//! The applied-migration ledger.

mod backend;
mod db;

pub use backend::MigrationRepository;
pub use db::DatabaseMigrationRepository;

use serde::{Deserialize, Serialize};

/// Default ledger table name.
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration identifier, the file stem (`2024_01_01_000000_create_users`).
    pub migration: String,

    /// Batch the migration was applied in.
    pub batch: i64,
}
