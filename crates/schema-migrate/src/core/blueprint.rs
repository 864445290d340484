//! The blueprint: a table's desired columns, indexes, foreign keys and the
//! ordered list of structural commands to compile.
//!
//! Nothing is validated while a blueprint is populated. [`Blueprint::to_sql`]
//! adds the implied commands, checks every column and hands each command to
//! the connection's grammar in order.

use tracing::debug;

use crate::core::column::{Column, ColumnType, ForeignKeyRole};
use crate::core::constraint::{ForeignKey, Index, IndexKind};
use crate::core::identifier::validate_identifier;
use crate::core::traits::Connection;
use crate::error::Result;

/// A pending structural command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create,
    Add,
    Change,
    Drop,
    DropIfExists,
    Rename { to: String },
    DropColumn { columns: Vec<String> },
    RenameColumn { from: String, to: String },
    Primary(Index),
    Unique(Index),
    Index(Index),
    Foreign(ForeignKey),
    DropPrimary { name: Option<String> },
    DropUnique { name: String },
    DropIndex { name: String },
    DropForeign { name: String },
}

impl Command {
    /// Verb used in capability errors.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Create => "create",
            Command::Add => "add",
            Command::Change => "change",
            Command::Drop => "drop",
            Command::DropIfExists => "drop_if_exists",
            Command::Rename { .. } => "rename",
            Command::DropColumn { .. } => "drop_column",
            Command::RenameColumn { .. } => "rename_column",
            Command::Primary(_) => "primary",
            Command::Unique(_) => "unique",
            Command::Index(_) => "index",
            Command::Foreign(_) => "foreign",
            Command::DropPrimary { .. } => "drop_primary",
            Command::DropUnique { .. } => "drop_unique",
            Command::DropIndex { .. } => "drop_index",
            Command::DropForeign { .. } => "drop_foreign",
        }
    }
}

/// In-memory description of one table change.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    table: String,
    columns: Vec<Column>,
    commands: Vec<Command>,
    /// MySQL storage engine for `create`.
    pub engine: Option<String>,
}

impl Blueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            commands: Vec::new(),
            engine: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut Vec<Column> {
        &mut self.columns
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index descriptors held by primary/unique/index commands.
    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.commands.iter().filter_map(|c| match c {
            Command::Primary(i) | Command::Unique(i) | Command::Index(i) => Some(i),
            _ => None,
        })
    }

    /// Foreign-key descriptors held by foreign commands.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.commands.iter().filter_map(|c| match c {
            Command::Foreign(fk) => Some(fk),
            _ => None,
        })
    }

    pub fn creating(&self) -> bool {
        self.commands.iter().any(|c| matches!(c, Command::Create))
    }

    /// The single auto-incrementing column, if any.
    pub fn auto_increment_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// Columns that will be added (not flagged `change`).
    pub fn added_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.change)
    }

    pub fn changed_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.change)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn create(&mut self) -> &mut Self {
        self.push(Command::Create)
    }

    pub fn drop(&mut self) -> &mut Self {
        self.push(Command::Drop)
    }

    pub fn drop_if_exists(&mut self) -> &mut Self {
        self.push(Command::DropIfExists)
    }

    pub fn rename(&mut self, to: impl Into<String>) -> &mut Self {
        self.push(Command::Rename { to: to.into() })
    }

    pub fn drop_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.drop_columns(vec![column.into()])
    }

    pub fn drop_columns(&mut self, columns: Vec<String>) -> &mut Self {
        self.push(Command::DropColumn { columns })
    }

    pub fn rename_column(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.push(Command::RenameColumn {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn drop_primary(&mut self) -> &mut Self {
        self.push(Command::DropPrimary { name: None })
    }

    pub fn drop_unique(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Command::DropUnique { name: name.into() })
    }

    pub fn drop_index(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Command::DropIndex { name: name.into() })
    }

    pub fn drop_foreign(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Command::DropForeign { name: name.into() })
    }

    pub fn primary(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(Index::new(IndexKind::Primary, owned(columns)))
    }

    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(Index::new(IndexKind::Unique, owned(columns)))
    }

    pub fn index(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(Index::new(IndexKind::Index, owned(columns)))
    }

    /// Push the command matching the index kind.
    pub fn add_index(&mut self, index: Index) -> &mut Self {
        let command = match index.kind {
            IndexKind::Primary => Command::Primary(index),
            IndexKind::Unique => Command::Unique(index),
            IndexKind::Index => Command::Index(index),
        };
        self.push(command)
    }

    pub fn foreign(&mut self, foreign: ForeignKey) -> &mut Self {
        self.push(Command::Foreign(foreign))
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// Append a column and return it for chaining modifiers.
    pub fn add_column(&mut self, column: Column) -> &mut Column {
        self.columns.push(column);
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    fn typed(&mut self, name: &str, kind: ColumnType) -> &mut Column {
        self.add_column(Column::new(name, kind))
    }

    pub fn increments(&mut self, name: &str) -> &mut Column {
        let col = self.typed(name, ColumnType::Integer);
        col.auto_increment = true;
        col
    }

    pub fn big_increments(&mut self, name: &str) -> &mut Column {
        let col = self.typed(name, ColumnType::BigInteger);
        col.auto_increment = true;
        col
    }

    pub fn big_integer(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::BigInteger)
    }

    pub fn integer(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Integer)
    }

    pub fn medium_integer(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::MediumInteger)
    }

    pub fn small_integer(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::SmallInteger)
    }

    pub fn tiny_integer(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::TinyInteger)
    }

    pub fn string(&mut self, name: &str, length: u32) -> &mut Column {
        let col = self.typed(name, ColumnType::String);
        col.length = Some(length);
        col
    }

    pub fn char(&mut self, name: &str, length: u32) -> &mut Column {
        let col = self.typed(name, ColumnType::Char);
        col.length = Some(length);
        col
    }

    pub fn text(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Text)
    }

    pub fn medium_text(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::MediumText)
    }

    pub fn long_text(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::LongText)
    }

    pub fn decimal(&mut self, name: &str, precision: u32, scale: u32) -> &mut Column {
        let col = self.typed(name, ColumnType::Decimal);
        col.precision = Some(precision);
        col.scale = Some(scale);
        col
    }

    pub fn float(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Float)
    }

    pub fn double(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Double)
    }

    pub fn boolean(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Boolean)
    }

    pub fn enum_column(&mut self, name: &str, allowed: &[&str]) -> &mut Column {
        let col = self.typed(name, ColumnType::Enum);
        col.allowed = owned(allowed);
        col
    }

    pub fn json(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Json)
    }

    pub fn date(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Date)
    }

    pub fn datetime(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Timestamp)
    }

    pub fn time(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Time)
    }

    pub fn binary(&mut self, name: &str) -> &mut Column {
        self.typed(name, ColumnType::Binary)
    }

    /// Nullable `created_at` and `updated_at` timestamps.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    /// Bring catalog-derived descriptors into canonical form.
    ///
    /// A primary key on the auto-increment column is implied by the column,
    /// plain indexes named after a foreign key back that key and are dropped,
    /// names equal to the derived ones are forgotten and single-column
    /// foreign keys become [`ForeignKeyRole`]s on their local column.
    pub fn normalize_catalog(&mut self) {
        let auto = self.auto_increment_column().map(|c| c.name.clone());
        let implied_pk = |cols: &[String]| matches!((cols, &auto), ([c], Some(a)) if c == a);
        let table = self.table.clone();
        let foreign_names: Vec<String> = self
            .foreign_keys()
            .map(|fk| fk.resolved_name(&table))
            .collect();
        let backs_foreign =
            |index: &Index| matches!(&index.name, Some(name) if foreign_names.contains(name));

        let mut commands = Vec::with_capacity(self.commands.len());
        for command in std::mem::take(&mut self.commands) {
            match command {
                Command::Primary(index) if implied_pk(&index.columns) => {}
                Command::Primary(mut index) => {
                    index.normalize_name(&table);
                    commands.push(Command::Primary(index));
                }
                Command::Unique(mut index) => {
                    index.normalize_name(&table);
                    commands.push(Command::Unique(index));
                }
                Command::Index(index) if backs_foreign(&index) => {}
                Command::Index(mut index) => {
                    index.normalize_name(&table);
                    commands.push(Command::Index(index));
                }
                Command::Foreign(mut fk) => {
                    fk.normalize_name(&table);
                    if let ([local], [reference]) = (&fk.columns[..], &fk.references[..]) {
                        let column = self
                            .columns
                            .iter_mut()
                            .find(|c| &c.name == local && c.foreign.is_none());
                        if let Some(column) = column {
                            column.foreign = Some(ForeignKeyRole {
                                on: fk.on.clone(),
                                references: reference.clone(),
                                on_delete: fk.on_delete,
                                on_update: fk.on_update,
                                name: fk.name.clone(),
                            });
                            continue;
                        }
                    }
                    commands.push(Command::Foreign(fk));
                }
                other => commands.push(other),
            }
        }
        self.commands = commands;
    }

    // =========================================================================
    // Compilation
    // =========================================================================

    /// Explicit commands plus the ones implied by the column list.
    ///
    /// On an existing table, changed columns imply a leading `change` and new
    /// columns a leading `add`. Columns carrying a foreign-key role imply a
    /// trailing `foreign` command.
    pub fn compiled_commands(&self) -> Vec<Command> {
        let mut commands = Vec::with_capacity(self.commands.len() + 2);
        if !self.creating() {
            if self.changed_columns().next().is_some() {
                commands.push(Command::Change);
            }
            if self.added_columns().next().is_some() {
                commands.push(Command::Add);
            }
        }
        commands.extend(self.commands.iter().cloned());

        for column in self.added_columns() {
            if let Some(role) = &column.foreign {
                let fk = ForeignKey {
                    columns: vec![column.name.clone()],
                    on: role.on.clone(),
                    references: vec![role.references.clone()],
                    on_delete: role.on_delete,
                    on_update: role.on_update,
                    name: role.name.clone(),
                };
                commands.push(Command::Foreign(fk));
            }
        }
        commands
    }

    /// Validate columns and compile every command against the connection's
    /// grammar.
    pub async fn to_sql(&self, conn: &dyn Connection) -> Result<Vec<String>> {
        validate_identifier(&self.table)?;
        for column in &self.columns {
            validate_identifier(&column.name)?;
            column.validate()?;
        }

        let grammar = conn.grammar();
        let mut statements = Vec::new();
        for command in self.compiled_commands() {
            let sql = grammar.compile(self, &command, conn).await?;
            debug!(
                "Compiled {} on {} into {} statement(s)",
                command.verb(),
                self.table,
                sql.len()
            );
            statements.extend(sql);
        }
        Ok(statements)
    }

    /// Compile and execute against the connection, in order.
    pub async fn build(&self, conn: &dyn Connection) -> Result<()> {
        for sql in self.to_sql(conn).await? {
            conn.statement(&sql).await?;
        }
        Ok(())
    }
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}
