//! Database-backed ledger.
//!
//! Stores the ledger in a table on the migrated database itself, so the
//! record of what ran travels with the schema it describes. The table is
//! created through a [`Blueprint`] and therefore compiles for every dialect.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{MigrationRecord, MigrationRepository};
use crate::core::blueprint::Blueprint;
use crate::core::identifier::validate_identifier;
use crate::core::traits::Connection;
use crate::error::Result;

/// Ledger table with a unique `migration` column and an integer `batch`.
pub struct DatabaseMigrationRepository<'a> {
    conn: &'a dyn Connection,
    table: String,
}

impl<'a> DatabaseMigrationRepository<'a> {
    pub fn new(conn: &'a dyn Connection, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn wrap(&self, identifier: &str) -> String {
        self.conn.grammar().wrap(identifier)
    }

    fn select_records(&self, filter: &str, order: &str) -> String {
        format!(
            "SELECT {m}, {b} FROM {t}{f} ORDER BY {o}",
            m = self.wrap("migration"),
            b = self.wrap("batch"),
            t = self.wrap(&self.table),
            f = filter,
            o = order
        )
    }

    async fn records(&self, sql: &str) -> Result<Vec<MigrationRecord>> {
        Ok(self
            .conn
            .select(sql)
            .await?
            .iter()
            .map(|row| MigrationRecord {
                migration: row.text_at(0).unwrap_or_default(),
                batch: row.int_at(1).unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl MigrationRepository for DatabaseMigrationRepository<'_> {
    async fn get_ran(&self) -> Result<Vec<String>> {
        let order = format!("{}, {}", self.wrap("batch"), self.wrap("migration"));
        let sql = self.select_records("", &order);
        Ok(self.records(&sql).await?.into_iter().map(|r| r.migration).collect())
    }

    async fn get_records(&self) -> Result<Vec<MigrationRecord>> {
        let order = format!("{}, {}", self.wrap("batch"), self.wrap("migration"));
        self.records(&self.select_records("", &order)).await
    }

    async fn get_last(&self) -> Result<Vec<MigrationRecord>> {
        let last = self.get_last_batch_number().await?;
        let filter = format!(" WHERE {} = {}", self.wrap("batch"), last);
        let order = format!("{} DESC", self.wrap("migration"));
        self.records(&self.select_records(&filter, &order)).await
    }

    async fn get_last_batch_number(&self) -> Result<i64> {
        let sql = format!(
            "SELECT MAX({}) AS max_batch FROM {}",
            self.wrap("batch"),
            self.wrap(&self.table)
        );
        let rows = self.conn.select(&sql).await?;
        Ok(rows.first().and_then(|row| row.int_at(0)).unwrap_or(0))
    }

    async fn log(&self, migration: &str, batch: i64) -> Result<()> {
        debug!("Logging {} in batch {}", migration, batch);
        let grammar = self.conn.grammar();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})",
            self.wrap(&self.table),
            self.wrap("migration"),
            self.wrap("batch"),
            grammar.quote_string(migration),
            batch
        );
        self.conn.statement(&sql).await
    }

    async fn delete(&self, migration: &str) -> Result<()> {
        debug!("Removing {} from the ledger", migration);
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.wrap(&self.table),
            self.wrap("migration"),
            self.conn.grammar().quote_string(migration)
        );
        self.conn.statement(&sql).await
    }

    async fn create_repository(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        let mut bp = Blueprint::new(&self.table);
        bp.create();
        bp.string("migration", 255);
        bp.integer("batch");
        bp.unique(&["migration"]);
        bp.build(self.conn).await?;
        info!("Created ledger table {}", self.table);
        Ok(())
    }

    async fn repository_exists(&self) -> Result<bool> {
        let sql = self
            .conn
            .grammar()
            .compile_table_exists(self.conn.database_name(), &self.table);
        Ok(!self.conn.select(&sql).await?.is_empty())
    }

    fn backend_type(&self) -> &'static str {
        "database"
    }
}
