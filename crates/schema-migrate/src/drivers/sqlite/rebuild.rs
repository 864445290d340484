//! Table rebuild for SQLite, which cannot drop or retype columns in place.

use async_trait::async_trait;
use tracing::debug;

use crate::core::blueprint::Command;
use crate::core::diff::{TableDiff, TableRebuilder};
use crate::core::grammar::SchemaGrammar;
use crate::core::traits::Connection;
use crate::drivers::sqlite::SqliteGrammar;
use crate::dumper::introspect_table;
use crate::error::Result;

/// Copies the table aside, recreates it from the diffed blueprint and copies
/// the surviving columns back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteRebuilder;

#[async_trait]
impl TableRebuilder for SqliteRebuilder {
    async fn rebuild(&self, diff: &TableDiff, conn: &dyn Connection) -> Result<Vec<String>> {
        let grammar = SqliteGrammar;
        let current = introspect_table(conn, &diff.table).await?;
        let target = diff.apply(&current)?;

        let table = grammar.wrap(&diff.table);
        let temp = grammar.wrap(&format!("__temp__{}", diff.table));
        let columns = grammar.columnize(&diff.surviving_columns(&current));
        debug!(
            "Rebuilding {} without {:?}, retyping {} column(s)",
            diff.table,
            diff.removed_columns,
            diff.changed_columns.len()
        );

        let mut statements = vec![
            format!("CREATE TEMPORARY TABLE {} AS SELECT {} FROM {}", temp, columns, table),
            format!("DROP TABLE {}", table),
        ];
        statements.extend(grammar.compile_create(&target)?);
        statements.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            table, columns, columns, temp
        ));
        statements.push(format!("DROP TABLE {}", temp));

        for command in target.commands() {
            match command {
                Command::Unique(index) => statements.extend(grammar.compile_unique(&target, index)?),
                Command::Index(index) => statements.extend(grammar.compile_index(&target, index)?),
                _ => {}
            }
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blueprint::Blueprint;
    use crate::core::value::{Row, Value};
    use crate::drivers::Dialect;
    use crate::testing::FakeConnection;

    fn column_row(name: &str, ty: &str, notnull: i64, pk: i64) -> Row {
        Row::from_pairs([
            ("name", Value::from(name)),
            ("type", Value::from(ty)),
            ("notnull", Value::Integer(notnull)),
            ("dflt_value", Value::Null),
            ("pk", Value::Integer(pk)),
        ])
    }

    fn make_test_connection() -> FakeConnection {
        let ddl = "CREATE TABLE \"users\" (\
                   \"id\" INTEGER /*integer*/ NOT NULL PRIMARY KEY AUTOINCREMENT, \
                   \"email\" VARCHAR /*string(255)*/ NOT NULL, \
                   \"votes\" INTEGER /*small_integer*/ NOT NULL, \
                   \"bio\" TEXT /*text*/ NULL)";
        FakeConnection::new(Dialect::Sqlite)
            .on_select("SELECT sql FROM sqlite_master", vec![Row::from_pairs([("sql", ddl)])])
            .on_select(
                "pragma_table_info",
                vec![
                    column_row("id", "INTEGER", 1, 1),
                    column_row("email", "VARCHAR", 1, 0),
                    column_row("votes", "INTEGER", 1, 0),
                    column_row("bio", "TEXT", 0, 0),
                ],
            )
            .on_select(
                "pragma_index_list",
                vec![
                    Row::from_pairs([
                        ("name", Value::from("users_email_unique")),
                        ("unique", Value::Integer(1)),
                        ("origin", Value::from("c")),
                    ]),
                    Row::from_pairs([
                        ("name", Value::from("users_votes_index")),
                        ("unique", Value::Integer(0)),
                        ("origin", Value::from("c")),
                    ]),
                ],
            )
            .on_select(
                "pragma_index_info('users_email_unique')",
                vec![Row::from_pairs([("column_name", "email")])],
            )
            .on_select(
                "pragma_index_info('users_votes_index')",
                vec![Row::from_pairs([("column_name", "votes")])],
            )
            .on_select("PRAGMA foreign_keys", vec![Row::from_pairs([("foreign_keys", "0")])])
    }

    #[tokio::test]
    async fn test_drop_column_rebuilds_table() {
        let conn = make_test_connection();
        let mut bp = Blueprint::new("users");
        bp.drop_column("votes");

        let sql = bp.to_sql(&conn).await.unwrap();
        assert_eq!(
            sql,
            [
                "CREATE TEMPORARY TABLE \"__temp__users\" AS SELECT \"id\", \"email\", \"bio\" FROM \"users\"",
                "DROP TABLE \"users\"",
                "CREATE TABLE \"users\" (\
                 \"id\" INTEGER /*integer*/ NOT NULL PRIMARY KEY AUTOINCREMENT, \
                 \"email\" VARCHAR /*string(255)*/ NOT NULL, \
                 \"bio\" TEXT /*text*/ NULL)",
                "INSERT INTO \"users\" (\"id\", \"email\", \"bio\") SELECT \"id\", \"email\", \"bio\" FROM \"__temp__users\"",
                "DROP TABLE \"__temp__users\"",
                "CREATE UNIQUE INDEX \"users_email_unique\" ON \"users\" (\"email\")",
            ]
        );
    }

    #[tokio::test]
    async fn test_change_rebuilds_with_new_definition() {
        let conn = make_test_connection();
        let mut bp = Blueprint::new("users");
        bp.string("email", 320).change();

        let sql = bp.to_sql(&conn).await.unwrap();
        assert_eq!(sql.len(), 7);
        assert!(sql[2].contains("\"email\" VARCHAR /*string(320)*/ NOT NULL"));
        assert!(sql[2].contains("\"votes\" INTEGER /*small_integer*/ NOT NULL"));
        assert_eq!(sql[5], "CREATE UNIQUE INDEX \"users_email_unique\" ON \"users\" (\"email\")");
        assert_eq!(sql[6], "CREATE INDEX \"users_votes_index\" ON \"users\" (\"votes\")");
    }

    #[tokio::test]
    async fn test_change_and_drop_share_one_rebuild() {
        let conn = make_test_connection();
        let mut bp = Blueprint::new("users");
        bp.string("email", 320).change();
        bp.drop_column("votes");

        let sql = bp.to_sql(&conn).await.unwrap();
        assert_eq!(
            sql,
            [
                "CREATE TEMPORARY TABLE \"__temp__users\" AS SELECT \"id\", \"email\", \"bio\" FROM \"users\"",
                "DROP TABLE \"users\"",
                "CREATE TABLE \"users\" (\
                 \"id\" INTEGER /*integer*/ NOT NULL PRIMARY KEY AUTOINCREMENT, \
                 \"email\" VARCHAR /*string(320)*/ NOT NULL, \
                 \"bio\" TEXT /*text*/ NULL)",
                "INSERT INTO \"users\" (\"id\", \"email\", \"bio\") SELECT \"id\", \"email\", \"bio\" FROM \"__temp__users\"",
                "DROP TABLE \"__temp__users\"",
                "CREATE UNIQUE INDEX \"users_email_unique\" ON \"users\" (\"email\")",
            ]
        );
    }

    #[tokio::test]
    async fn test_two_drops_share_one_rebuild() {
        let conn = make_test_connection();
        let mut bp = Blueprint::new("users");
        bp.drop_column("votes");
        bp.drop_column("bio");

        let sql = bp.to_sql(&conn).await.unwrap();
        assert_eq!(sql.len(), 6);
        assert_eq!(
            sql[0],
            "CREATE TEMPORARY TABLE \"__temp__users\" AS SELECT \"id\", \"email\" FROM \"users\""
        );
        assert_eq!(
            sql[2],
            "CREATE TABLE \"users\" (\
             \"id\" INTEGER /*integer*/ NOT NULL PRIMARY KEY AUTOINCREMENT, \
             \"email\" VARCHAR /*string(255)*/ NOT NULL)"
        );
        assert_eq!(sql.iter().filter(|s| s.starts_with("CREATE TABLE")).count(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_of_unknown_column_fails() {
        let conn = make_test_connection();
        let diff = TableDiff::new("users").removing(&["nope".to_string()]);
        assert!(SqliteRebuilder.rebuild(&diff, &conn).await.is_err());
    }
}
