//! Schema dumper.
//!
//! Reads the live catalog through the dialect's [`Introspector`] and
//! reconstructs one [`Blueprint`] per table. [`dump`] renders the result as
//! a single migration document whose `up` step creates every table and whose
//! `down` step drops them again.
//!
//! [`Introspector`]: crate::core::traits::Introspector

pub mod render;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::blueprint::Blueprint;
use crate::core::constraint::IndexKind;
use crate::core::traits::Connection;
use crate::error::{MigrateError, Result};

/// Tables never dumped: the migration ledger and SQLite's internal sequence.
pub const IGNORED_TABLES: [&str; 2] = ["migrations", "sqlite_sequence"];

/// Column order in the rendered document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpOrder {
    /// Auto-increment, foreign-key, integer, string, timestamp, everything else.
    #[default]
    Priority,
    /// As the catalog returns them.
    Catalog,
}

/// Dump settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpOptions {
    #[serde(default)]
    pub column_order: DumpOrder,

    /// Extra tables to skip, on top of [`IGNORED_TABLES`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

impl DumpOptions {
    fn ignores(&self, table: &str) -> bool {
        IGNORED_TABLES.contains(&table) || self.ignore.iter().any(|t| t == table)
    }
}

/// Rebuild one table as a `create` blueprint.
pub async fn introspect_table(conn: &dyn Connection, table: &str) -> Result<Blueprint> {
    let introspector = conn.dialect().introspector();

    let columns = introspector.list_columns(conn, table).await?;
    if columns.is_empty() {
        return Err(MigrateError::TableNotFound(table.to_string()));
    }

    let mut blueprint = Blueprint::new(table);
    blueprint.create();
    for column in columns {
        blueprint.add_column(column);
    }

    let mut indexes = introspector.list_indexes(conn, table).await?;
    indexes.sort_by_cached_key(|index| (index.kind != IndexKind::Primary, index.resolved_name(table)));
    for index in indexes {
        blueprint.add_index(index);
    }

    for fk in introspector.list_foreign_keys(conn, table).await? {
        blueprint.foreign(fk);
    }

    blueprint.normalize_catalog();
    debug!(
        "Introspected {}: {} column(s), {} index(es)",
        table,
        blueprint.columns().len(),
        blueprint.indexes().count()
    );
    Ok(blueprint)
}

/// Rebuild every user table, in catalog order. The first failing table
/// aborts the whole dump.
pub async fn introspect(conn: &dyn Connection, options: &DumpOptions) -> Result<Vec<Blueprint>> {
    let tables = conn.dialect().introspector().list_tables(conn).await?;
    let mut blueprints = Vec::with_capacity(tables.len());
    for table in tables.iter().filter(|t| !options.ignores(t)) {
        let blueprint = introspect_table(conn, table).await?;
        info!("Dumped table {} ({} columns)", table, blueprint.columns().len());
        blueprints.push(blueprint);
    }
    Ok(blueprints)
}

/// Dump the database with default options.
pub async fn dump(conn: &dyn Connection) -> Result<String> {
    dump_with(conn, &DumpOptions::default()).await
}

pub async fn dump_with(conn: &dyn Connection, options: &DumpOptions) -> Result<String> {
    let blueprints = introspect(conn, options).await?;
    render::render_document(&blueprints, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::column::ColumnType;
    use crate::core::value::{Row, Value};
    use crate::drivers::Dialect;
    use crate::testing::FakeConnection;

    fn make_test_column(name: &str, ty: &str, notnull: i64, pk: i64) -> Row {
        Row::from_pairs([
            ("name", Value::from(name)),
            ("type", Value::from(ty)),
            ("notnull", Value::Integer(notnull)),
            ("dflt_value", Value::Null),
            ("pk", Value::Integer(pk)),
        ])
    }

    fn make_test_sqlite() -> FakeConnection {
        FakeConnection::new(Dialect::Sqlite)
            .on_select(
                "FROM sqlite_master WHERE type = 'table' ORDER BY",
                vec![
                    Row::from_pairs([("table_name", Value::from("users"))]),
                    Row::from_pairs([("table_name", Value::from("migrations"))]),
                    Row::from_pairs([("table_name", Value::from("sqlite_sequence"))]),
                ],
            )
            .on_select(
                "AND name = 'users'",
                vec![Row::from_pairs([(
                    "sql",
                    Value::from(
                        "CREATE TABLE \"users\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
                         \"username\" VARCHAR /*string(128)*/ NOT NULL)",
                    ),
                )])],
            )
            .on_select(
                "pragma_table_info('users')",
                vec![
                    make_test_column("id", "INTEGER", 1, 1),
                    make_test_column("username", "VARCHAR", 1, 0),
                ],
            )
            .on_select(
                "pragma_index_list('users')",
                vec![Row::from_pairs([
                    ("name", Value::from("users_username_unique")),
                    ("unique", Value::Integer(1)),
                    ("origin", Value::from("c")),
                ])],
            )
            .on_select(
                "pragma_index_info('users_username_unique')",
                vec![Row::from_pairs([("column_name", Value::from("username"))])],
            )
    }

    #[tokio::test]
    async fn test_introspect_table_normalizes() {
        let conn = make_test_sqlite();
        let bp = introspect_table(&conn, "users").await.unwrap();

        assert!(bp.creating());
        assert_eq!(bp.columns().len(), 2);
        assert!(bp.columns()[0].auto_increment);
        assert_eq!(bp.columns()[1].kind, ColumnType::String);
        assert_eq!(bp.columns()[1].length, Some(128));

        let indexes: Vec<_> = bp.indexes().collect();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].kind, IndexKind::Unique);
        assert_eq!(indexes[0].columns, ["username"]);
        assert_eq!(indexes[0].name, None);
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let conn = FakeConnection::new(Dialect::Sqlite);
        let err = introspect_table(&conn, "ghost").await.unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound(ref t) if t == "ghost"));
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_introspect_skips_ignored_tables() {
        let conn = make_test_sqlite();
        let blueprints = introspect(&conn, &DumpOptions::default()).await.unwrap();
        let tables: Vec<_> = blueprints.iter().map(Blueprint::table).collect();
        assert_eq!(tables, ["users"]);

        let options = DumpOptions {
            ignore: vec!["users".into()],
            ..Default::default()
        };
        assert!(introspect(&conn, &options).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dump_renders_document() {
        let conn = make_test_sqlite();
        let yaml = dump(&conn).await.unwrap();
        assert!(yaml.contains("name: users"));
        assert!(yaml.contains("type: increments"));
        assert!(yaml.contains("- drop: users"));
    }

    #[test]
    fn test_dump_order_from_yaml() {
        let options: DumpOptions = serde_yaml::from_str("column_order: catalog\n").unwrap();
        assert_eq!(options.column_order, DumpOrder::Catalog);
        let options: DumpOptions = serde_yaml::from_str("{}").unwrap();
        assert_eq!(options.column_order, DumpOrder::Priority);
    }
}
