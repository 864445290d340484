//! Core traits at the seams between the schema layer and the database.
//!
//! - [`Connection`]: statement execution, row selection and transaction control
//! - [`Introspector`]: per-dialect catalog reading into descriptors
//!
//! Grammar compilation lives in [`crate::core::grammar::SchemaGrammar`].

use async_trait::async_trait;

use crate::core::column::Column;
use crate::core::constraint::{ForeignKey, Index};
use crate::core::grammar::SchemaGrammar;
use crate::core::value::Row;
use crate::drivers::Dialect;
use crate::error::Result;

/// A single exclusively-owned database connection.
///
/// Implementations must execute statements strictly in call order. There is
/// at most one open transaction per connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The engine on the other end.
    fn dialect(&self) -> Dialect;

    /// Database (MySQL schema, Postgres database, SQLite `main`) used to
    /// scope catalog queries.
    fn database_name(&self) -> &str;

    /// Run a query and return all rows.
    async fn select(&self, sql: &str) -> Result<Vec<Row>>;

    /// Run a statement that returns no rows.
    async fn statement(&self, sql: &str) -> Result<()>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    /// Schema grammar for this connection's dialect.
    fn grammar(&self) -> &'static dyn SchemaGrammar {
        self.dialect().grammar()
    }

    /// True when statements are captured instead of executed.
    fn pretending(&self) -> bool {
        false
    }
}

/// Reads live catalog metadata for one dialect.
///
/// Each method returns descriptors already normalized to the logical model:
/// auto-increment lifted, integer display widths dropped, `tinyint(1)` read
/// as boolean, current-time timestamp defaults turned into `use_current`.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// User tables in catalog order.
    async fn list_tables(&self, conn: &dyn Connection) -> Result<Vec<String>>;

    /// Columns in ordinal order.
    async fn list_columns(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Column>>;

    /// Indexes grouped by name, ordered by name, columns in catalog order.
    async fn list_indexes(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Index>>;

    async fn list_foreign_keys(&self, conn: &dyn Connection, table: &str)
        -> Result<Vec<ForeignKey>>;
}
