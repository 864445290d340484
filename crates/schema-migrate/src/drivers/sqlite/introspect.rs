//! SQLite catalog reader.
//!
//! `pragma_table_info` only reports the declared physical type, so every
//! table's `CREATE TABLE` text is fetched as well and scanned for the origin
//! comments, `/*unsigned*/` and `AUTOINCREMENT`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::column::{Column, ColumnType, DefaultValue};
use crate::core::constraint::{ForeignAction, ForeignKey, Index, IndexKind};
use crate::core::identifier::unquote;
use crate::core::traits::{Connection, Introspector};
use crate::core::value::Row;
use crate::ddl::types::{apply_mysql_type, apply_origin_type, parse_type};
use crate::ddl::{scan_column_hints, ColumnHints};
use crate::drivers::sqlite::SqliteGrammar;
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntrospector;

impl SqliteIntrospector {
    async fn column_hints(conn: &dyn Connection, table: &str) -> Result<HashMap<String, ColumnHints>> {
        let rows = conn.select(&SqliteGrammar.compile_plain_sql(table)).await?;
        match rows.first().and_then(|row| row.text("sql")) {
            Some(sql) => scan_column_hints(&sql),
            None => Ok(HashMap::new()),
        }
    }

    fn column_from_row(table: &str, row: &Row, hints: &HashMap<String, ColumnHints>) -> Result<Column> {
        let name = row.text("name").unwrap_or_default();
        let physical = row.text("type").unwrap_or_default();
        let hint = hints.get(&name).cloned().unwrap_or_default();

        let mut column = Column::new(&name, ColumnType::Text);
        let typed = match &hint.origin {
            Some(origin) => apply_origin_type(&mut column, origin),
            None => parse_type(&physical)
                .map(|spec| apply_mysql_type(&mut column, &spec))
                .unwrap_or(false),
        };
        if !typed {
            return Err(MigrateError::CatalogMismatch {
                table: table.to_string(),
                column: name,
                physical,
            });
        }

        column.nullable = row.int("notnull") == Some(0);
        if hint.autoincrement {
            column.auto_increment = true;
            column.nullable = false;
            return Ok(column);
        }
        column.unsigned = hint.unsigned && column.kind.is_numeric() && column.kind != ColumnType::Boolean;

        if let Some(default) = row.text("dflt_value") {
            read_default(&mut column, &default);
        }
        Ok(column)
    }
}

fn read_default(column: &mut Column, default: &str) {
    let upper = default.to_ascii_uppercase();
    if column.kind.is_temporal() && upper == "CURRENT_TIMESTAMP" {
        column.use_current = true;
        return;
    }
    if upper == "NULL" {
        return;
    }
    if default.starts_with('\'') {
        column.default = Some(DefaultValue::from_literal(&unquote(default), column.kind));
        return;
    }
    column.default = Some(match DefaultValue::from_literal(default, column.kind) {
        DefaultValue::Text(raw) => DefaultValue::Raw(raw),
        typed => typed,
    });
}

#[async_trait]
impl Introspector for SqliteIntrospector {
    async fn list_tables(&self, conn: &dyn Connection) -> Result<Vec<String>> {
        let sql = conn.grammar().compile_list_tables(conn.database_name());
        let rows = conn.select(&sql).await?;
        Ok(rows.iter().filter_map(|r| r.text("table_name")).collect())
    }

    async fn list_columns(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Column>> {
        let hints = Self::column_hints(conn, table).await?;
        let sql = conn.grammar().compile_list_columns(conn.database_name(), table);
        conn.select(&sql)
            .await?
            .iter()
            .map(|row| Self::column_from_row(table, row, &hints))
            .collect()
    }

    /// The primary key comes from `pk` positions in the table info, since
    /// a rowid alias has no index of its own.
    async fn list_indexes(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Index>> {
        let info = conn
            .select(&conn.grammar().compile_list_columns(conn.database_name(), table))
            .await?;
        let mut primary: Vec<(i64, String)> = info
            .iter()
            .filter_map(|row| {
                let position = row.int("pk").filter(|p| *p > 0)?;
                Some((position, row.text("name")?))
            })
            .collect();
        primary.sort();

        let mut indexes = Vec::new();
        if !primary.is_empty() {
            let columns = primary.into_iter().map(|(_, name)| name).collect();
            indexes.push(Index::new(IndexKind::Primary, columns));
        }

        let sql = conn.grammar().compile_list_indexes(conn.database_name(), table);
        for row in conn.select(&sql).await? {
            let origin = row.text("origin").unwrap_or_default();
            if origin == "pk" {
                continue;
            }
            let name = row.text("name").unwrap_or_default();
            let columns = conn
                .select(&SqliteGrammar.compile_show_index(&name))
                .await?
                .iter()
                .filter_map(|r| r.text("column_name"))
                .collect();

            let kind = if row.flag("unique") {
                IndexKind::Unique
            } else {
                IndexKind::Index
            };
            let index = Index::new(kind, columns);
            // Names of implicit UNIQUE-constraint indexes are engine-generated.
            indexes.push(if origin == "u" { index } else { index.named(name) });
        }
        Ok(indexes)
    }

    async fn list_foreign_keys(&self, conn: &dyn Connection, table: &str) -> Result<Vec<ForeignKey>> {
        let sql = conn.grammar().compile_list_foreign_keys(conn.database_name(), table);
        let rows = conn.select(&sql).await?;

        let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
        for row in &rows {
            let id = row.int("id").unwrap_or_default();
            let column = row.text("from").unwrap_or_default();
            let referenced = row.text("to").unwrap_or_default();
            match keys.last_mut() {
                Some((last, fk)) if *last == id => {
                    fk.columns.push(column);
                    fk.references.push(referenced);
                }
                _ => {
                    let on = row.text("table").unwrap_or_default();
                    let mut fk = ForeignKey::new(vec![column], on, vec![referenced]);
                    fk.on_update = ForeignAction::explicit(
                        row.text("on_update").and_then(|r| ForeignAction::from_rule(&r)),
                    );
                    fk.on_delete = ForeignAction::explicit(
                        row.text("on_delete").and_then(|r| ForeignAction::from_rule(&r)),
                    );
                    keys.push((id, fk));
                }
            }
        }
        Ok(keys.into_iter().map(|(_, fk)| fk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::drivers::Dialect;
    use crate::testing::FakeConnection;

    fn column_row(name: &str, ty: &str, notnull: i64, default: Option<&str>, pk: i64) -> Row {
        Row::from_pairs([
            ("name", Value::from(name)),
            ("type", Value::from(ty)),
            ("notnull", Value::Integer(notnull)),
            ("dflt_value", Value::from(default)),
            ("pk", Value::Integer(pk)),
        ])
    }

    fn make_test_connection() -> FakeConnection {
        let ddl = "CREATE TABLE \"posts\" (\
                   \"id\" INTEGER /*big_integer*/ NOT NULL PRIMARY KEY AUTOINCREMENT, \
                   \"votes\" INTEGER /*small_integer*/ /*unsigned*/ NOT NULL DEFAULT '0', \
                   \"state\" VARCHAR /*enum('draft','live')*/ CHECK (\"state\" IN ('draft', 'live')) NOT NULL, \
                   \"published\" BOOLEAN /*boolean*/ NOT NULL DEFAULT '1', \
                   \"created_at\" DATETIME /*timestamp*/ DEFAULT CURRENT_TIMESTAMP NOT NULL, \
                   \"user_id\" INTEGER /*integer*/ NOT NULL, \
                   \"legacy\" varchar(40) NULL, \
                   FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE)";
        FakeConnection::new(Dialect::Sqlite)
            .on_select("SELECT sql FROM sqlite_master", vec![Row::from_pairs([("sql", ddl)])])
            .on_select(
                "pragma_table_info",
                vec![
                    column_row("id", "INTEGER", 1, None, 1),
                    column_row("votes", "INTEGER", 1, Some("'0'"), 0),
                    column_row("state", "VARCHAR", 1, None, 0),
                    column_row("published", "BOOLEAN", 1, Some("'1'"), 0),
                    column_row("created_at", "DATETIME", 1, Some("CURRENT_TIMESTAMP"), 0),
                    column_row("user_id", "INTEGER", 1, None, 0),
                    column_row("legacy", "varchar(40)", 0, Some("date('now')"), 0),
                ],
            )
            .on_select(
                "pragma_index_list",
                vec![Row::from_pairs([
                    ("name", Value::from("sqlite_autoindex_posts_1")),
                    ("unique", Value::Integer(1)),
                    ("origin", Value::from("u")),
                ])],
            )
            .on_select(
                "pragma_index_info('sqlite_autoindex_posts_1')",
                vec![Row::from_pairs([("column_name", "legacy")])],
            )
            .on_select(
                "pragma_foreign_key_list",
                vec![Row::from_pairs([
                    ("id", Value::Integer(0)),
                    ("seq", Value::Integer(0)),
                    ("table", Value::from("users")),
                    ("from", Value::from("user_id")),
                    ("to", Value::from("id")),
                    ("on_update", Value::from("NO ACTION")),
                    ("on_delete", Value::from("CASCADE")),
                ])],
            )
    }

    #[tokio::test]
    async fn test_list_columns_reads_origin_comments() {
        let conn = make_test_connection();
        let columns = SqliteIntrospector.list_columns(&conn, "posts").await.unwrap();

        assert_eq!(columns[0].kind, ColumnType::BigInteger);
        assert!(columns[0].auto_increment);

        assert_eq!(columns[1].kind, ColumnType::SmallInteger);
        assert!(columns[1].unsigned);
        assert_eq!(columns[1].default, Some(DefaultValue::Integer(0)));

        assert_eq!(columns[2].kind, ColumnType::Enum);
        assert_eq!(columns[2].allowed, ["draft", "live"]);

        assert_eq!(columns[3].default, Some(DefaultValue::Bool(true)));
        assert!(columns[4].use_current);
        assert_eq!(columns[4].default, None);

        assert_eq!(columns[6].kind, ColumnType::String);
        assert_eq!(columns[6].length, Some(40));
        assert!(columns[6].nullable);
        assert_eq!(columns[6].default, Some(DefaultValue::Raw("date('now')".into())));
    }

    #[tokio::test]
    async fn test_typeless_column_is_catalog_mismatch() {
        let conn = FakeConnection::new(Dialect::Sqlite)
            .on_select("pragma_table_info", vec![column_row("blob", "", 0, None, 0)]);
        let err = SqliteIntrospector.list_columns(&conn, "raw").await.unwrap_err();
        assert!(matches!(err, MigrateError::CatalogMismatch { .. }));
    }

    #[tokio::test]
    async fn test_list_indexes_includes_rowid_primary_key() {
        let conn = make_test_connection();
        let indexes = SqliteIntrospector.list_indexes(&conn, "posts").await.unwrap();

        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].kind, IndexKind::Primary);
        assert_eq!(indexes[0].columns, ["id"]);
        assert_eq!(indexes[1].kind, IndexKind::Unique);
        assert_eq!(indexes[1].name, None);
    }

    #[tokio::test]
    async fn test_list_foreign_keys_groups_by_id() {
        let conn = make_test_connection();
        let keys = SqliteIntrospector.list_foreign_keys(&conn, "posts").await.unwrap();

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].columns, ["user_id"]);
        assert_eq!(keys[0].on_update, None);
        assert_eq!(keys[0].on_delete, Some(ForeignAction::Cascade));
        assert_eq!(keys[0].name, None);
    }

    #[tokio::test]
    async fn test_datetime_current_default_survives_recompile() {
        let ddl = "CREATE TABLE \"events\" (\"seen_at\" DATETIME /*datetime*/ DEFAULT CURRENT_TIMESTAMP NOT NULL)";
        let conn = FakeConnection::new(Dialect::Sqlite)
            .on_select("SELECT sql FROM sqlite_master", vec![Row::from_pairs([("sql", ddl)])])
            .on_select(
                "pragma_table_info",
                vec![column_row("seen_at", "DATETIME", 1, Some("CURRENT_TIMESTAMP"), 0)],
            );
        let columns = SqliteIntrospector.list_columns(&conn, "events").await.unwrap();
        assert_eq!(columns[0].kind, ColumnType::DateTime);
        assert!(columns[0].use_current);

        let mut bp = crate::core::blueprint::Blueprint::new("events");
        bp.create();
        bp.add_column(columns[0].clone());
        let sql = bp.to_sql(&conn).await.unwrap();
        assert_eq!(sql, [ddl]);
    }
}
