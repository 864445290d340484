//! Migration runner.
//!
//! The [`Migrator`] diffs discovered migrations against the ledger, applies
//! pending ones as one batch and rolls batches back:
//!
//! - Units run strictly in name order, one at a time
//! - Each unit is logged (or deleted) as soon as its step succeeds
//! - Transactional units run inside `BEGIN`/`COMMIT` and roll back on error
//! - A failed unit aborts the batch; earlier units stay applied
//!
//! Pretend mode runs every step against a [`PretendConnection`] and returns
//! the captured statements without touching the ledger.

pub mod document;
pub mod resolver;
pub mod schema;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::connection::PretendConnection;
use crate::core::traits::Connection;
use crate::error::{MigrateError, Result};
use crate::state::MigrationRepository;
pub use document::{ColumnRename, MigrationDocument, SchemaStep, TableSpec};
pub use resolver::{FileResolver, MigrationResolver, Registry};
pub use schema::Schema;

/// A reversible schema change.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Wrap each direction in a transaction.
    fn transactional(&self) -> bool {
        true
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<()>;

    async fn down(&self, schema: &Schema<'_>) -> Result<()>;
}

/// Lifecycle of one migration unit within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Pending,
    Applying,
    Applied,
    Reverting,
    Reverted,
    Failed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Pending => "pending",
            UnitState::Applying => "applying",
            UnitState::Applied => "applied",
            UnitState::Reverting => "reverting",
            UnitState::Reverted => "reverted",
            UnitState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Starting, in-flight and final state.
    fn states(self) -> (UnitState, UnitState, UnitState) {
        match self {
            Direction::Up => (UnitState::Pending, UnitState::Applying, UnitState::Applied),
            Direction::Down => (UnitState::Applied, UnitState::Reverting, UnitState::Reverted),
        }
    }
}

/// Result of one unit in a run.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub name: String,
    pub state: UnitState,
    /// Captured statements in pretend mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
}

/// Result of a migrate, rollback or reset.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    /// Batch applied or rolled back; `None` when there was nothing to do.
    pub batch: Option<i64>,
    pub pretend: bool,
    pub units: Vec<UnitOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl MigrationOutcome {
    fn start(pretend: bool) -> (Self, Instant) {
        let now = Utc::now();
        let outcome = Self {
            batch: None,
            pretend,
            units: Vec::new(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
        };
        (outcome, Instant::now())
    }

    fn finish(mut self, timer: Instant) -> Self {
        self.completed_at = Utc::now();
        self.duration_seconds = timer.elapsed().as_secs_f64();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Every captured statement, in execution order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.units
            .iter()
            .flat_map(|u| u.statements.iter().map(String::as_str))
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One row of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub state: UnitState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<i64>,
    /// Recorded in the ledger but no longer resolvable from disk.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
}

/// Applies and reverts migrations against one connection and ledger.
pub struct Migrator<'a> {
    conn: &'a dyn Connection,
    repository: &'a dyn MigrationRepository,
    resolver: &'a dyn MigrationResolver,
}

impl<'a> Migrator<'a> {
    pub fn new(
        conn: &'a dyn Connection,
        repository: &'a dyn MigrationRepository,
        resolver: &'a dyn MigrationResolver,
    ) -> Self {
        Self {
            conn,
            repository,
            resolver,
        }
    }

    /// Create the ledger when absent. Returns true when it was created.
    pub async fn install(&self) -> Result<bool> {
        if self.repository.repository_exists().await? {
            return Ok(false);
        }
        self.repository.create_repository().await?;
        info!("Installed {} ledger", self.repository.backend_type());
        Ok(true)
    }

    async fn ran(&self) -> Result<Vec<String>> {
        if self.repository.repository_exists().await? {
            self.repository.get_ran().await
        } else {
            Ok(Vec::new())
        }
    }

    /// Names discovered under `path` that the ledger has not recorded.
    pub async fn pending(&self, path: &Path) -> Result<Vec<String>> {
        let ran: HashSet<String> = self.ran().await?.into_iter().collect();
        Ok(self
            .resolver
            .discover(path)?
            .into_iter()
            .filter(|name| !ran.contains(name))
            .collect())
    }

    /// Apply every pending migration as one new batch.
    pub async fn run(&self, path: &Path, pretend: bool) -> Result<MigrationOutcome> {
        let (mut outcome, timer) = MigrationOutcome::start(pretend);
        if !pretend {
            self.install().await?;
        }

        let pending = self.pending(path).await?;
        if pending.is_empty() {
            info!("Nothing to migrate");
            return Ok(outcome.finish(timer));
        }

        let batch = if self.repository.repository_exists().await? {
            self.repository.get_next_batch_number().await?
        } else {
            1
        };
        outcome.batch = Some(batch);
        info!("Running {} migration(s) in batch {}", pending.len(), batch);

        for name in pending {
            let migration = self.resolver.resolve(path, &name)?;
            let statements = self
                .execute(&name, migration.as_ref(), Direction::Up, Some(batch), pretend)
                .await?;
            outcome.units.push(UnitOutcome {
                name,
                state: UnitState::Applied,
                statements,
            });
        }
        Ok(outcome.finish(timer))
    }

    /// Revert the most recent batch.
    pub async fn rollback(&self, path: &Path, pretend: bool) -> Result<MigrationOutcome> {
        let (mut outcome, timer) = MigrationOutcome::start(pretend);
        if !self.repository.repository_exists().await? {
            info!("Nothing to rollback");
            return Ok(outcome.finish(timer));
        }

        let last = self.repository.get_last().await?;
        let Some(first) = last.first() else {
            info!("Nothing to rollback");
            return Ok(outcome.finish(timer));
        };
        outcome.batch = Some(first.batch);
        info!("Rolling back batch {} ({} migration(s))", first.batch, last.len());

        for record in last {
            let unit = self.revert(path, &record.migration, pretend).await?;
            outcome.units.push(unit);
        }
        Ok(outcome.finish(timer))
    }

    /// Revert every batch, newest first.
    ///
    /// In pretend mode the ledger is never modified, so the recorded
    /// migrations are walked once in reverse instead of batch by batch.
    pub async fn reset(&self, path: &Path, pretend: bool) -> Result<MigrationOutcome> {
        let (mut outcome, timer) = MigrationOutcome::start(pretend);
        if !self.repository.repository_exists().await? {
            info!("Nothing to reset");
            return Ok(outcome.finish(timer));
        }

        if pretend {
            let mut records = self.repository.get_records().await?;
            records.reverse();
            outcome.batch = records.first().map(|r| r.batch);
            for record in records {
                let unit = self.revert(path, &record.migration, true).await?;
                outcome.units.push(unit);
            }
            return Ok(outcome.finish(timer));
        }

        loop {
            let step = self.rollback(path, false).await?;
            if step.is_empty() {
                break;
            }
            if outcome.batch.is_none() {
                outcome.batch = step.batch;
            }
            outcome.units.extend(step.units);
        }
        Ok(outcome.finish(timer))
    }

    /// Applied and pending migrations, sorted by name.
    pub async fn status(&self, path: &Path) -> Result<Vec<MigrationStatus>> {
        let mut rows: BTreeMap<String, MigrationStatus> = BTreeMap::new();
        for name in self.resolver.discover(path)? {
            rows.insert(
                name.clone(),
                MigrationStatus {
                    name,
                    state: UnitState::Pending,
                    batch: None,
                    missing: false,
                },
            );
        }

        if self.repository.repository_exists().await? {
            for record in self.repository.get_records().await? {
                let row = rows
                    .entry(record.migration.clone())
                    .or_insert_with(|| MigrationStatus {
                        name: record.migration.clone(),
                        state: UnitState::Applied,
                        batch: None,
                        missing: true,
                    });
                row.state = UnitState::Applied;
                row.batch = Some(record.batch);
            }
        }
        Ok(rows.into_values().collect())
    }

    async fn revert(&self, path: &Path, name: &str, pretend: bool) -> Result<UnitOutcome> {
        let migration = self.resolver.resolve(path, name)?;
        let statements = self
            .execute(name, migration.as_ref(), Direction::Down, None, pretend)
            .await?;
        Ok(UnitOutcome {
            name: name.to_string(),
            state: UnitState::Reverted,
            statements,
        })
    }

    /// Run one direction of one unit and update the ledger.
    ///
    /// `batch` is the batch to log on the way up; on the way down the record
    /// is deleted.
    async fn execute(
        &self,
        name: &str,
        migration: &dyn Migration,
        direction: Direction,
        batch: Option<i64>,
        pretend: bool,
    ) -> Result<Vec<String>> {
        let (from, during, done) = direction.states();
        debug!("{}: {} -> {}", name, from, during);

        if pretend {
            let recorder = PretendConnection::new(self.conn);
            let schema = Schema::new(&recorder);
            run_direction(migration, &schema, direction)
                .await
                .map_err(|e| MigrateError::step(name, e))?;
            let statements = recorder.take_statements();
            info!("Pretended {} ({} statement(s))", name, statements.len());
            return Ok(statements);
        }

        let timer = Instant::now();
        let transactional = migration.transactional();
        if transactional {
            self.conn.begin().await?;
        }

        let schema = Schema::new(self.conn);
        let result = match run_direction(migration, &schema, direction).await {
            Ok(()) => self.record(name, direction, batch).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if transactional {
                    self.conn.commit().await?;
                }
                debug!("{}: {} -> {}", name, during, done);
                info!(
                    "{} {} ({:.2}s)",
                    if direction == Direction::Up { "Migrated" } else { "Rolled back" },
                    name,
                    timer.elapsed().as_secs_f64()
                );
                Ok(Vec::new())
            }
            Err(e) => {
                if transactional {
                    if let Err(rollback_err) = self.conn.rollback().await {
                        warn!("Rollback of {} failed: {}", name, rollback_err);
                    }
                }
                debug!("{}: {} -> {}", name, during, UnitState::Failed);
                Err(MigrateError::step(name, e))
            }
        }
    }

    async fn record(&self, name: &str, direction: Direction, batch: Option<i64>) -> Result<()> {
        match (direction, batch) {
            (Direction::Up, Some(batch)) => self.repository.log(name, batch).await,
            (Direction::Down, _) => self.repository.delete(name).await,
            (Direction::Up, None) => Ok(()),
        }
    }
}

async fn run_direction(migration: &dyn Migration, schema: &Schema<'_>, direction: Direction) -> Result<()> {
    match direction {
        Direction::Up => migration.up(schema).await,
        Direction::Down => migration.down(schema).await,
    }
}
