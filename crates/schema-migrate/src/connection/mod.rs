//! Live database connections.
//!
//! [`DatabaseConnection`] holds exactly one sqlx connection for the engine
//! named by the URL scheme. Statements are sent unprepared through
//! [`sqlx::raw_sql`], which accepts DDL and multi-statement text on every
//! engine, and result rows are decoded into [`Row`]s by column type name.
//!
//! [`PretendConnection`] wraps any connection for dry runs.

mod pretend;

pub use pretend::PretendConnection;

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ColumnIndex, ConnectOptions, Decode, Type};
use sqlx::{Column as _, Connection as _, Executor as _, TypeInfo as _};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::traits::Connection;
use crate::core::value::{Row, Value};
use crate::drivers::Dialect;
use crate::error::{MigrateError, Result};

enum Handle {
    MySql(Mutex<MySqlConnection>),
    Postgres(Mutex<PgConnection>),
    Sqlite(Mutex<SqliteConnection>),
}

/// Runs `$body` with `$conn` bound to the locked driver connection.
macro_rules! with_conn {
    ($self:expr, $conn:ident => $body:expr) => {
        match &$self.handle {
            Handle::MySql(m) => {
                let mut guard = m.lock().await;
                let $conn = &mut *guard;
                $body
            }
            Handle::Postgres(m) => {
                let mut guard = m.lock().await;
                let $conn = &mut *guard;
                $body
            }
            Handle::Sqlite(m) => {
                let mut guard = m.lock().await;
                let $conn = &mut *guard;
                $body
            }
        }
    };
}

/// A single exclusive connection to MySQL, PostgreSQL or SQLite.
pub struct DatabaseConnection {
    handle: Handle,
    dialect: Dialect,
    database: String,
}

impl DatabaseConnection {
    /// Connect using a URL such as `postgres://user:pw@host/db`,
    /// `mysql://root@localhost/app` or `sqlite://app.db`.
    ///
    /// SQLite database files are created when missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let dialect = Dialect::from_url(url)?;
        let handle = match dialect {
            Dialect::MySql => Handle::MySql(Mutex::new(MySqlConnection::connect(url).await?)),
            Dialect::Postgres => Handle::Postgres(Mutex::new(PgConnection::connect(url).await?)),
            Dialect::Sqlite => {
                let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
                Handle::Sqlite(Mutex::new(options.connect().await?))
            }
        };

        let mut conn = Self {
            handle,
            dialect,
            database: "main".to_string(),
        };
        conn.database = match dialect {
            Dialect::MySql => conn.scalar("SELECT DATABASE()").await?,
            Dialect::Postgres => conn.scalar("SELECT current_database()::text").await?,
            Dialect::Sqlite => None,
        }
        .unwrap_or_else(|| "main".to_string());

        info!("Connected to {} database '{}'", dialect, conn.database);
        Ok(conn)
    }

    async fn scalar(&self, sql: &str) -> Result<Option<String>> {
        let rows = self.select(sql).await?;
        Ok(rows.first().and_then(|row| row.text_at(0)))
    }

    /// Close the underlying connection.
    pub async fn close(self) -> Result<()> {
        match self.handle {
            Handle::MySql(m) => m.into_inner().close().await?,
            Handle::Postgres(m) => m.into_inner().close().await?,
            Handle::Sqlite(m) => m.into_inner().close().await?,
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for DatabaseConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    async fn select(&self, sql: &str) -> Result<Vec<Row>> {
        debug!("select: {}", sql);
        with_conn!(self, conn => {
            let rows = conn
                .fetch_all(sqlx::raw_sql(sql))
                .await
                .map_err(|e| MigrateError::query(sql, e))?;
            Ok(rows.iter().map(decode_row).collect())
        })
    }

    async fn statement(&self, sql: &str) -> Result<()> {
        debug!("statement: {}", sql);
        with_conn!(self, conn => {
            conn.execute(sqlx::raw_sql(sql))
                .await
                .map_err(|e| MigrateError::query(sql, e))?;
            Ok(())
        })
    }

    async fn begin(&self) -> Result<()> {
        self.statement("BEGIN").await
    }

    async fn commit(&self) -> Result<()> {
        self.statement("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.statement("ROLLBACK").await
    }
}

// =============================================================================
// Row decoding
// =============================================================================

/// How a column's values are decoded, from the driver's type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoding {
    /// No declared type (SQLite expressions and pragma columns): probe the
    /// value itself.
    Dynamic,
    Bool,
    Integer,
    Unsigned,
    Float,
    Bytes,
    Text,
}

fn decoding_for(type_name: &str) -> Decoding {
    let name = type_name.to_ascii_uppercase();
    match name.as_str() {
        "NULL" | "" => Decoding::Dynamic,
        "BOOL" | "BOOLEAN" => Decoding::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4"
        | "INT8" => Decoding::Integer,
        "FLOAT" | "DOUBLE" | "REAL" | "FLOAT4" | "FLOAT8" | "DOUBLE PRECISION" => Decoding::Float,
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BYTEA" | "BINARY" | "VARBINARY" => {
            Decoding::Bytes
        }
        n if n.ends_with(" UNSIGNED") => Decoding::Unsigned,
        _ => Decoding::Text,
    }
}

fn decode_row<R>(row: &R) -> Row
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i16: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    let mut names = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for column in row.columns() {
        let i = column.ordinal();
        names.push(column.name().to_string());
        values.push(decode_value(row, i, decoding_for(column.type_info().name())));
    }
    Row::new(names, values)
}

fn decode_value<R>(row: &R, i: usize, decoding: Decoding) -> Value
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i16: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    let decoded = match decoding {
        Decoding::Dynamic => row
            .try_get::<Option<i64>, _>(i)
            .map(|v| v.map(Value::Integer))
            .or_else(|_| row.try_get::<Option<f64>, _>(i).map(|v| v.map(Value::Float)))
            .ok(),
        Decoding::Bool => row
            .try_get::<Option<bool>, _>(i)
            .map(|v| v.map(Value::Bool))
            .ok(),
        Decoding::Integer => row
            .try_get::<Option<i64>, _>(i)
            .or_else(|_| row.try_get::<Option<i32>, _>(i).map(|v| v.map(i64::from)))
            .or_else(|_| row.try_get::<Option<i16>, _>(i).map(|v| v.map(i64::from)))
            .map(|v| v.map(Value::Integer))
            .ok(),
        Decoding::Float => row
            .try_get::<Option<f64>, _>(i)
            .or_else(|_| row.try_get::<Option<f32>, _>(i).map(|v| v.map(f64::from)))
            .map(|v| v.map(Value::Float))
            .ok(),
        Decoding::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(i)
            .map(|v| v.map(Value::Bytes))
            .ok(),
        // Unsigned MySQL integers and anything unrecognised fall through to
        // text, which the accessors on `Value` parse on demand.
        Decoding::Unsigned | Decoding::Text => None,
    };

    decoded
        .or_else(|| {
            row.try_get::<Option<String>, _>(i)
                .map(|v| v.map(Value::Text))
                .ok()
        })
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(i)
                .map(|v| v.map(|b| Value::Text(String::from_utf8_lossy(&b).into_owned())))
                .ok()
        })
        .flatten()
        .unwrap_or(Value::Null)
}
