//! Table diffs for engines that cannot ALTER columns in place.
//!
//! A grammar that lacks column-level ALTER describes the change as a
//! [`TableDiff`] and hands it to a [`TableRebuilder`], which reads the live
//! table and emits the statements that recreate it in the new shape.

use async_trait::async_trait;

use crate::core::blueprint::{Blueprint, Command};
use crate::core::column::Column;
use crate::core::traits::Connection;
use crate::error::{MigrateError, Result};

/// Column-level changes to one existing table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDiff {
    pub table: String,
    pub removed_columns: Vec<String>,
    /// Replacement definitions, matched to existing columns by name.
    pub changed_columns: Vec<Column>,
}

impl TableDiff {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn removing(mut self, columns: &[String]) -> Self {
        self.removed_columns.extend(columns.iter().cloned());
        self
    }

    pub fn changing<'a>(mut self, columns: impl IntoIterator<Item = &'a Column>) -> Self {
        self.changed_columns.extend(columns.into_iter().map(|c| {
            let mut c = c.clone();
            c.change = false;
            c
        }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.removed_columns.is_empty() && self.changed_columns.is_empty()
    }

    /// Apply the diff to the current table shape, producing a `create`
    /// blueprint for the new table.
    ///
    /// Indexes and foreign keys that mention a removed column are dropped.
    pub fn apply(&self, current: &Blueprint) -> Result<Blueprint> {
        for name in self.removed_columns.iter().chain(self.changed_columns.iter().map(|c| &c.name)) {
            if current.column(name).is_none() {
                return Err(MigrateError::invalid_column(
                    name.as_str(),
                    format!("no such column on {}", self.table),
                ));
            }
        }

        let mut target = Blueprint::new(current.table());
        target.engine = current.engine.clone();
        target.create();

        for column in current.columns() {
            if self.removed_columns.contains(&column.name) {
                continue;
            }
            let replacement = self.changed_columns.iter().find(|c| c.name == column.name);
            target.add_column(replacement.unwrap_or(column).clone());
        }

        let removed = |cols: &[String]| cols.iter().any(|c| self.removed_columns.contains(c));
        for command in current.commands() {
            match command {
                Command::Primary(i) | Command::Unique(i) | Command::Index(i) if !removed(&i.columns) => {
                    target.push(command.clone());
                }
                Command::Foreign(fk) if !removed(&fk.columns) => {
                    target.push(command.clone());
                }
                _ => {}
            }
        }
        Ok(target)
    }

    /// Surviving column names, used to copy rows into the rebuilt table.
    pub fn surviving_columns(&self, current: &Blueprint) -> Vec<String> {
        current
            .columns()
            .iter()
            .filter(|c| !self.removed_columns.contains(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Rebuilds a table to apply a [`TableDiff`].
#[async_trait]
pub trait TableRebuilder: Send + Sync {
    async fn rebuild(&self, diff: &TableDiff, conn: &dyn Connection) -> Result<Vec<String>>;
}
