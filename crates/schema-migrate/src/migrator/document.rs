//! YAML migration documents.
//!
//! A migration file holds one [`MigrationDocument`]:
//!
//! ```yaml
//! up:
//!   - create:
//!       name: users
//!       columns:
//!         - { name: id, type: increments }
//!         - { name: email, type: string, length: 190 }
//!       indexes:
//!         - { type: unique, columns: [email] }
//! down:
//!   - drop: users
//! ```
//!
//! The schema dumper and the DDL parser emit the same format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::schema::Schema;
use super::Migration;
use crate::core::blueprint::Blueprint;
use crate::core::column::Column;
use crate::core::constraint::{ForeignKey, Index};
use crate::error::Result;

/// One migration unit loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDocument {
    /// Run each direction inside a transaction.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub transactional: bool,

    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub up: Vec<SchemaStep>,

    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub down: Vec<SchemaStep>,
}

impl Default for MigrationDocument {
    fn default() -> Self {
        Self {
            transactional: true,
            up: Vec::new(),
            down: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl MigrationDocument {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// A single schema operation inside a document direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStep {
    /// Create a new table.
    Create(TableSpec),
    /// Modify an existing table.
    Table(TableSpec),
    Drop(String),
    DropIfExists(String),
    Rename { from: String, to: String },
    /// Raw SQL executed verbatim.
    Sql(String),
}

impl SchemaStep {
    pub async fn execute(&self, schema: &Schema<'_>) -> Result<()> {
        match self {
            SchemaStep::Create(spec) => schema.create(&spec.name, |bp| spec.apply(bp)).await,
            SchemaStep::Table(spec) => schema.table(&spec.name, |bp| spec.apply(bp)).await,
            SchemaStep::Drop(table) => schema.drop(table).await,
            SchemaStep::DropIfExists(table) => schema.drop_if_exists(table).await,
            SchemaStep::Rename { from, to } => schema.rename(from, to).await,
            SchemaStep::Sql(sql) => schema.statement(sql).await,
        }
    }
}

/// A column rename inside a `table` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub from: String,
    pub to: String,
}

/// Document form of a [`Blueprint`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,

    /// MySQL storage engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Column>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_foreign: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_unique: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_indexes: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub drop_primary: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rename_columns: Vec<ColumnRename>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_columns: Vec<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Columns, indexes and foreign keys of a blueprint, in blueprint order.
    pub fn from_blueprint(blueprint: &Blueprint) -> Self {
        Self {
            name: blueprint.table().to_string(),
            engine: blueprint.engine.clone(),
            columns: blueprint.columns().to_vec(),
            indexes: blueprint.indexes().cloned().collect(),
            foreign_keys: blueprint.foreign_keys().cloned().collect(),
            ..Default::default()
        }
    }

    /// Populate a blueprint.
    ///
    /// Drops run before renames and renames before new keys, so a `table`
    /// step can drop a foreign key and the column it sits on together.
    pub fn apply(&self, blueprint: &mut Blueprint) {
        if self.engine.is_some() {
            blueprint.engine = self.engine.clone();
        }
        for column in &self.columns {
            blueprint.add_column(column.clone());
        }
        for name in &self.drop_foreign {
            blueprint.drop_foreign(name.as_str());
        }
        for name in &self.drop_unique {
            blueprint.drop_unique(name.as_str());
        }
        for name in &self.drop_indexes {
            blueprint.drop_index(name.as_str());
        }
        if self.drop_primary {
            blueprint.drop_primary();
        }
        for rename in &self.rename_columns {
            blueprint.rename_column(rename.from.as_str(), rename.to.as_str());
        }
        if !self.drop_columns.is_empty() {
            blueprint.drop_columns(self.drop_columns.clone());
        }
        for index in &self.indexes {
            blueprint.add_index(index.clone());
        }
        for fk in &self.foreign_keys {
            blueprint.foreign(fk.clone());
        }
    }
}

#[async_trait]
impl Migration for MigrationDocument {
    fn transactional(&self) -> bool {
        self.transactional
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<()> {
        for step in &self.up {
            step.execute(schema).await?;
        }
        Ok(())
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<()> {
        for step in &self.down {
            step.execute(schema).await?;
        }
        Ok(())
    }
}
