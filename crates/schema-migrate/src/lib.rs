//! # schema-migrate
//!
//! Cross-dialect schema migrations for MySQL, PostgreSQL and SQLite.
//!
//! This library provides:
//!
//! - **Blueprints** describing table changes independently of the engine
//! - **Grammars** compiling blueprints into each engine's DDL
//! - **Schema dumping** from the live catalog into a migration document
//! - **DDL parsing** of MySQL-style `CREATE TABLE` scripts
//! - **Migration runs** with batches, rollback, reset and pretend mode
//!
//! ## Example
//!
//! ```rust,no_run
//! use schema_migrate::{DatabaseConnection, DatabaseMigrationRepository, FileResolver, Migrator};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> schema_migrate::Result<()> {
//!     let conn = DatabaseConnection::connect("sqlite://app.db").await?;
//!     let repository = DatabaseMigrationRepository::new(&conn, "migrations");
//!     let migrator = Migrator::new(&conn, &repository, &FileResolver);
//!     let outcome = migrator.run(Path::new("migrations"), false).await?;
//!     println!("Applied {} migration(s)", outcome.units.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod dumper;
pub mod error;
pub mod migrator;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use crate::core::{
    Blueprint, Column, ColumnType, Connection, DefaultValue, ForeignAction, ForeignKey, Index,
    IndexKind, Introspector, Row, SchemaGrammar, Value,
};
pub use config::{Config, DatabaseConfig, MigrationsConfig};
pub use connection::{DatabaseConnection, PretendConnection};
pub use ddl::{ddl_to_migration, parse_create_tables};
pub use drivers::Dialect;
pub use dumper::{dump, dump_with, introspect, introspect_table, DumpOptions, DumpOrder};
pub use error::{MigrateError, Result};
pub use migrator::{
    FileResolver, Migration, MigrationDocument, MigrationOutcome, MigrationResolver,
    MigrationStatus, Migrator, Registry, Schema, SchemaStep, TableSpec, UnitState,
};
pub use state::{DatabaseMigrationRepository, MigrationRecord, MigrationRepository};
