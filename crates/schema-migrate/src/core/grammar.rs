//! The schema grammar contract implemented once per engine.
//!
//! A grammar is stateless: it maps logical types and modifiers to literal
//! SQL and turns blueprint commands into ordered statement lists. Verbs a
//! dialect cannot express keep the default implementation, which fails with
//! [`MigrateError::Compilation`] naming the verb.

use async_trait::async_trait;

use crate::core::blueprint::{Blueprint, Command};
use crate::core::column::{Column, ColumnType, DefaultValue};
use crate::core::constraint::{ForeignKey, Index};
use crate::core::identifier::quote_literal;
use crate::core::traits::Connection;
use crate::drivers::Dialect;
use crate::error::{MigrateError, Result};

/// Column modifiers, applied in the order a grammar declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Unsigned,
    Nullable,
    Default,
    Increment,
}

#[async_trait]
pub trait SchemaGrammar: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Quote an identifier.
    fn wrap(&self, identifier: &str) -> String;

    fn columnize(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Quote a string literal.
    fn quote_string(&self, value: &str) -> String {
        quote_literal(value)
    }

    /// Modifier order for column definitions.
    fn modifiers(&self) -> &'static [Modifier];

    /// Integer types that may auto-increment on this engine.
    fn serials(&self) -> &'static [ColumnType];

    /// Literal type clause for a column.
    fn type_sql(&self, column: &Column) -> String;

    fn modify_unsigned(&self, _column: &Column) -> Option<String> {
        None
    }

    fn modify_nullable(&self, column: &Column) -> Option<String> {
        Some(if column.nullable { " NULL" } else { " NOT NULL" }.to_string())
    }

    /// Auto-increment columns never carry a default, and `use_current`
    /// timestamps get theirs from the type clause.
    fn modify_default(&self, column: &Column) -> Option<String> {
        if column.auto_increment || column.use_current {
            return None;
        }
        column
            .default
            .as_ref()
            .map(|value| format!(" DEFAULT {}", self.default_literal(value)))
    }

    fn modify_increment(&self, column: &Column) -> Option<String>;

    fn default_literal(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Integer(i) => format!("'{}'", i),
            DefaultValue::Float(f) => format!("'{}'", f),
            DefaultValue::Text(s) => self.quote_string(s),
            DefaultValue::Bool(b) => if *b { "'1'" } else { "'0'" }.to_string(),
            DefaultValue::Raw(raw) => raw.clone(),
        }
    }

    /// `name TYPE` followed by the modifiers in declared order.
    fn column_definition(&self, column: &Column) -> Result<String> {
        if column.auto_increment && !self.serials().contains(&column.kind) {
            return Err(MigrateError::invalid_column(
                &column.name,
                format!("{} cannot auto-increment on {}", column.kind, self.dialect()),
            ));
        }

        let mut sql = format!("{} {}", self.wrap(&column.name), self.type_sql(column));
        for modifier in self.modifiers() {
            let clause = match modifier {
                Modifier::Unsigned => self.modify_unsigned(column),
                Modifier::Nullable => self.modify_nullable(column),
                Modifier::Default => self.modify_default(column),
                Modifier::Increment => self.modify_increment(column),
            };
            if let Some(clause) = clause {
                sql.push_str(&clause);
            }
        }
        Ok(sql)
    }

    fn column_definitions(&self, columns: &[&Column]) -> Result<Vec<String>> {
        columns.iter().map(|c| self.column_definition(c)).collect()
    }

    /// `FOREIGN KEY (..) REFERENCES t (..) [ON DELETE ..] [ON UPDATE ..]`
    fn foreign_clause(&self, foreign: &ForeignKey) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            self.columnize(&foreign.columns),
            self.wrap(&foreign.on),
            self.columnize(&foreign.references)
        );
        if let Some(action) = foreign.on_delete {
            sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
        }
        if let Some(action) = foreign.on_update {
            sql.push_str(&format!(" ON UPDATE {}", action.as_sql()));
        }
        sql
    }

    // =========================================================================
    // Command verbs
    // =========================================================================

    fn compile_create(&self, _blueprint: &Blueprint) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "create"))
    }

    fn compile_add(&self, _blueprint: &Blueprint) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "add"))
    }

    fn compile_drop(&self, _blueprint: &Blueprint) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "drop"))
    }

    fn compile_drop_if_exists(&self, _blueprint: &Blueprint) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "drop_if_exists"))
    }

    fn compile_rename(&self, _blueprint: &Blueprint, _to: &str) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "rename"))
    }

    fn compile_primary(&self, _blueprint: &Blueprint, _index: &Index) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "primary"))
    }

    fn compile_unique(&self, _blueprint: &Blueprint, _index: &Index) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "unique"))
    }

    fn compile_index(&self, _blueprint: &Blueprint, _index: &Index) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "index"))
    }

    fn compile_foreign(&self, _blueprint: &Blueprint, _foreign: &ForeignKey) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "foreign"))
    }

    fn compile_drop_primary(&self, _blueprint: &Blueprint, _name: Option<&str>) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "drop_primary"))
    }

    fn compile_drop_unique(&self, _blueprint: &Blueprint, _name: &str) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "drop_unique"))
    }

    fn compile_drop_index(&self, _blueprint: &Blueprint, _name: &str) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "drop_index"))
    }

    fn compile_drop_foreign(&self, _blueprint: &Blueprint, _name: &str) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "drop_foreign"))
    }

    /// Column removal. Engines without column-level ALTER need the live
    /// table, hence the connection.
    async fn compile_drop_column(
        &self,
        _blueprint: &Blueprint,
        _columns: &[String],
        _conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "drop_column"))
    }

    async fn compile_rename_column(
        &self,
        _blueprint: &Blueprint,
        _from: &str,
        _to: &str,
        _conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "rename_column"))
    }

    /// Retype the blueprint's columns flagged `change`.
    async fn compile_change(&self, _blueprint: &Blueprint, _conn: &dyn Connection) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.dialect(), "change"))
    }

    /// Dispatch one command to its verb.
    async fn compile(
        &self,
        blueprint: &Blueprint,
        command: &Command,
        conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        match command {
            Command::Create => self.compile_create(blueprint),
            Command::Add => self.compile_add(blueprint),
            Command::Change => self.compile_change(blueprint, conn).await,
            Command::Drop => self.compile_drop(blueprint),
            Command::DropIfExists => self.compile_drop_if_exists(blueprint),
            Command::Rename { to } => self.compile_rename(blueprint, to),
            Command::DropColumn { columns } => {
                self.compile_drop_column(blueprint, columns, conn).await
            }
            Command::RenameColumn { from, to } => {
                self.compile_rename_column(blueprint, from, to, conn).await
            }
            Command::Primary(index) => self.compile_primary(blueprint, index),
            Command::Unique(index) => self.compile_unique(blueprint, index),
            Command::Index(index) => self.compile_index(blueprint, index),
            Command::Foreign(foreign) => self.compile_foreign(blueprint, foreign),
            Command::DropPrimary { name } => self.compile_drop_primary(blueprint, name.as_deref()),
            Command::DropUnique { name } => self.compile_drop_unique(blueprint, name),
            Command::DropIndex { name } => self.compile_drop_index(blueprint, name),
            Command::DropForeign { name } => self.compile_drop_foreign(blueprint, name),
        }
    }

    // =========================================================================
    // Introspection queries
    // =========================================================================

    fn compile_list_tables(&self, database: &str) -> String;

    fn compile_list_columns(&self, database: &str, table: &str) -> String;

    fn compile_list_indexes(&self, database: &str, table: &str) -> String;

    fn compile_list_foreign_keys(&self, database: &str, table: &str) -> String;

    /// Returns one row when the table exists, none otherwise.
    fn compile_table_exists(&self, database: &str, table: &str) -> String;
}

/// Definitions of the columns a blueprint adds.
pub(crate) fn added_definitions(
    grammar: &dyn SchemaGrammar,
    blueprint: &Blueprint,
) -> Result<Vec<String>> {
    let columns: Vec<&Column> = blueprint.added_columns().collect();
    grammar.column_definitions(&columns)
}

/// `CHECK ("col" IN ('a', 'b'))` for engines without a native enum.
pub(crate) fn enum_check(grammar: &dyn SchemaGrammar, column: &Column) -> String {
    let allowed = column
        .allowed
        .iter()
        .map(|v| grammar.quote_string(v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CHECK ({} IN ({}))", grammar.wrap(&column.name), allowed)
}
