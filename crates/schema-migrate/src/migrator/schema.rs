//! Schema facade handed to migrations.

use tracing::debug;

use crate::core::blueprint::Blueprint;
use crate::core::traits::Connection;
use crate::error::Result;

/// Builds a blueprint per call and executes its compiled statements in
/// order on the wrapped connection.
pub struct Schema<'a> {
    conn: &'a dyn Connection,
}

impl<'a> Schema<'a> {
    pub fn new(conn: &'a dyn Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &'a dyn Connection {
        self.conn
    }

    /// Create a table defined by `define`.
    pub async fn create<F>(&self, table: &str, define: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint) + Send,
    {
        let mut blueprint = Blueprint::new(table);
        blueprint.create();
        define(&mut blueprint);
        self.build(&blueprint).await
    }

    /// Modify an existing table.
    pub async fn table<F>(&self, table: &str, define: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint) + Send,
    {
        let mut blueprint = Blueprint::new(table);
        define(&mut blueprint);
        self.build(&blueprint).await
    }

    pub async fn drop(&self, table: &str) -> Result<()> {
        let mut blueprint = Blueprint::new(table);
        blueprint.drop();
        self.build(&blueprint).await
    }

    pub async fn drop_if_exists(&self, table: &str) -> Result<()> {
        let mut blueprint = Blueprint::new(table);
        blueprint.drop_if_exists();
        self.build(&blueprint).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut blueprint = Blueprint::new(from);
        blueprint.rename(to);
        self.build(&blueprint).await
    }

    pub async fn has_table(&self, table: &str) -> Result<bool> {
        let sql = self
            .conn
            .grammar()
            .compile_table_exists(self.conn.database_name(), table);
        Ok(!self.conn.select(&sql).await?.is_empty())
    }

    /// Execute raw SQL.
    pub async fn statement(&self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        self.conn.statement(sql).await
    }

    /// Compile a prepared blueprint and execute it.
    pub async fn build(&self, blueprint: &Blueprint) -> Result<()> {
        for sql in blueprint.to_sql(self.conn).await? {
            self.statement(&sql).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{Row, Value};
    use crate::drivers::Dialect;
    use crate::testing::FakeConnection;

    #[tokio::test]
    async fn test_create_and_table_build_blueprints() {
        let conn = FakeConnection::new(Dialect::Postgres);
        let schema = Schema::new(&conn);

        schema
            .create("teams", |table| {
                table.increments("id");
                table.string("name", 80);
            })
            .await
            .unwrap();
        schema
            .table("teams", |table| {
                table.boolean("archived").default(false);
            })
            .await
            .unwrap();
        schema.drop("teams").await.unwrap();

        assert_eq!(
            conn.statements(),
            [
                "CREATE TABLE \"teams\" (\"id\" SERIAL PRIMARY KEY NOT NULL, \"name\" VARCHAR(80) NOT NULL)",
                "ALTER TABLE \"teams\" ADD COLUMN \"archived\" BOOLEAN NOT NULL DEFAULT false",
                "DROP TABLE \"teams\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_has_table() {
        let conn = FakeConnection::new(Dialect::Sqlite)
            .on_select("'teams'", vec![Row::from_pairs([("name", Value::from("teams"))])]);
        let schema = Schema::new(&conn);

        assert!(schema.has_table("teams").await.unwrap());
        assert!(!schema.has_table("users").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_column_stops_before_execution() {
        let conn = FakeConnection::new(Dialect::MySql);
        let schema = Schema::new(&conn);

        let err = schema
            .create("tags", |table| {
                table.enum_column("kind", &[]);
            })
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(conn.statements().is_empty());
    }
}
