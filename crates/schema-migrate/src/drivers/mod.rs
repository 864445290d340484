//! Database driver implementations.
//!
//! Each driver module provides the two per-engine strategies:
//!
//! - [`mysql`]: MySQL / MariaDB
//! - [`postgres`]: PostgreSQL
//! - [`sqlite`]: SQLite
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `SchemaGrammar`: DDL compilation and catalog query text for the engine
//! - `Introspector`: catalog reading into column/index/foreign-key descriptors
//!
//! Grammars and introspectors are stateless, so the [`Dialect`] tag hands out
//! `'static` instances instead of constructing them per call.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `SchemaGrammar` and `Introspector`
//! 3. Add a variant to [`Dialect`] and wire `grammar()` / `introspector()`
//! 4. Teach `connection::DatabaseConnection` to open it

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::grammar::SchemaGrammar;
use crate::core::traits::Introspector;
use crate::error::{MigrateError, Result};

pub use mysql::{MySqlGrammar, MySqlIntrospector};
pub use postgres::{PostgresGrammar, PostgresIntrospector};
pub use sqlite::{SqliteGrammar, SqliteIntrospector, SqliteRebuilder};

static MYSQL_GRAMMAR: MySqlGrammar = MySqlGrammar;
static POSTGRES_GRAMMAR: PostgresGrammar = PostgresGrammar;
static SQLITE_GRAMMAR: SqliteGrammar = SqliteGrammar;

static MYSQL_INTROSPECTOR: MySqlIntrospector = MySqlIntrospector;
static POSTGRES_INTROSPECTOR: PostgresIntrospector = PostgresIntrospector;
static SQLITE_INTROSPECTOR: SqliteIntrospector = SqliteIntrospector;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(rename = "mysql")]
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Grammar compiler for this engine.
    pub fn grammar(self) -> &'static dyn SchemaGrammar {
        match self {
            Dialect::MySql => &MYSQL_GRAMMAR,
            Dialect::Postgres => &POSTGRES_GRAMMAR,
            Dialect::Sqlite => &SQLITE_GRAMMAR,
        }
    }

    /// Catalog introspector for this engine.
    pub fn introspector(self) -> &'static dyn Introspector {
        match self {
            Dialect::MySql => &MYSQL_INTROSPECTOR,
            Dialect::Postgres => &POSTGRES_INTROSPECTOR,
            Dialect::Sqlite => &SQLITE_INTROSPECTOR,
        }
    }

    /// Create a dialect from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(MigrateError::Config(format!(
                "Unknown database type: '{}'. Supported types: mysql, postgres, sqlite",
                other
            ))),
        }
    }

    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| MigrateError::Config(format!("Connection URL has no scheme: '{}'", url)))?;
        Self::from_db_type(scheme)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_db_type(s)
    }
}
