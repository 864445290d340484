//! Test doubles shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::traits::Connection;
use crate::core::value::Row;
use crate::drivers::Dialect;
use crate::error::{MigrateError, Result};
use crate::migrator::schema::Schema;
use crate::migrator::Migration;
use crate::state::{MigrationRecord, MigrationRepository};

/// A connection that answers selects from a script and records statements.
///
/// Scripted results are matched by substring against the query text; the
/// first match wins and unmatched selects return no rows.
pub struct FakeConnection {
    dialect: Dialect,
    scripts: Mutex<Vec<(String, Vec<Row>)>>,
    log: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl FakeConnection {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            scripts: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
        }
    }

    pub fn on_select(self, needle: &str, rows: Vec<Row>) -> Self {
        self.scripts.lock().unwrap().push((needle.to_string(), rows));
        self
    }

    /// Make every statement containing `needle` fail.
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    /// Executed statements, without transaction markers.
    pub fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !s.starts_with("--"))
            .cloned()
            .collect()
    }

    /// Statements and `-- begin` / `-- commit` / `-- rollback` markers.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn database_name(&self) -> &str {
        "app"
    }

    async fn select(&self, sql: &str) -> Result<Vec<Row>> {
        let scripts = self.scripts.lock().unwrap();
        Ok(scripts
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn statement(&self, sql: &str) -> Result<()> {
        if let Some(needle) = self.fail_on.lock().unwrap().as_deref() {
            if sql.contains(needle) {
                return Err(MigrateError::query(sql, "scripted failure"));
            }
        }
        self.log.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    async fn begin(&self) -> Result<()> {
        self.log.lock().unwrap().push("-- begin".into());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.log.lock().unwrap().push("-- commit".into());
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.log.lock().unwrap().push("-- rollback".into());
        Ok(())
    }
}

/// An in-memory ledger.
#[derive(Default)]
pub struct MemoryRepository {
    records: Mutex<BTreeMap<String, i64>>,
    installed: Mutex<bool>,
}

impl MemoryRepository {
    pub fn installed() -> Self {
        let repo = Self::default();
        *repo.installed.lock().unwrap() = true;
        repo
    }

    pub fn with_records(records: &[(&str, i64)]) -> Self {
        let repo = Self::installed();
        for (name, batch) in records {
            repo.records.lock().unwrap().insert(name.to_string(), *batch);
        }
        repo
    }

    pub fn names(&self) -> Vec<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl MigrationRepository for MemoryRepository {
    async fn get_ran(&self) -> Result<Vec<String>> {
        Ok(self.names())
    }

    async fn get_records(&self) -> Result<Vec<MigrationRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(migration, batch)| MigrationRecord {
                migration: migration.clone(),
                batch: *batch,
            })
            .collect())
    }

    async fn get_last(&self) -> Result<Vec<MigrationRecord>> {
        let last = self.get_last_batch_number().await?;
        let mut records: Vec<_> = self
            .get_records()
            .await?
            .into_iter()
            .filter(|r| r.batch == last)
            .collect();
        records.reverse();
        Ok(records)
    }

    async fn get_last_batch_number(&self) -> Result<i64> {
        Ok(self.records.lock().unwrap().values().copied().max().unwrap_or(0))
    }

    async fn log(&self, migration: &str, batch: i64) -> Result<()> {
        self.records.lock().unwrap().insert(migration.to_string(), batch);
        Ok(())
    }

    async fn delete(&self, migration: &str) -> Result<()> {
        self.records.lock().unwrap().remove(migration);
        Ok(())
    }

    async fn create_repository(&self) -> Result<()> {
        *self.installed.lock().unwrap() = true;
        Ok(())
    }

    async fn repository_exists(&self) -> Result<bool> {
        Ok(*self.installed.lock().unwrap())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

/// A code-defined migration that records its calls and emits one statement
/// per direction.
pub struct RecordingMigration {
    pub name: String,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub transactional: bool,
}

impl RecordingMigration {
    pub fn new(name: &str, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            calls,
            transactional: true,
        }
    }
}

#[async_trait]
impl Migration for RecordingMigration {
    fn transactional(&self) -> bool {
        self.transactional
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<()> {
        self.calls.lock().unwrap().push(format!("up {}", self.name));
        schema.statement(&format!("/* up {} */", self.name)).await
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<()> {
        self.calls.lock().unwrap().push(format!("down {}", self.name));
        schema.statement(&format!("/* down {} */", self.name)).await
    }
}
