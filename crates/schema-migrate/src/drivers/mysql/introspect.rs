//! MySQL catalog reader (`INFORMATION_SCHEMA`).

use async_trait::async_trait;

use crate::core::column::{Column, ColumnType, DefaultValue};
use crate::core::constraint::{ForeignAction, ForeignKey, Index, IndexKind};
use crate::core::identifier::unquote;
use crate::core::traits::{Connection, Introspector};
use crate::core::value::Row;
use crate::ddl::types::{apply_mysql_type, parse_type};
use crate::error::{MigrateError, Result};

/// Reads MySQL/MariaDB catalogs. Rows are column-keyed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlIntrospector;

impl MySqlIntrospector {
    fn column_from_row(table: &str, row: &Row) -> Result<Column> {
        let name = row.text("column_name").unwrap_or_default();
        let physical = row.text("column_type").unwrap_or_default();
        let mismatch = || MigrateError::CatalogMismatch {
            table: table.to_string(),
            column: name.clone(),
            physical: physical.clone(),
        };

        let spec = parse_type(&physical).map_err(|_| mismatch())?;
        let mut column = Column::new(&name, ColumnType::Text);
        if !apply_mysql_type(&mut column, &spec) {
            return Err(mismatch());
        }

        let extra = row.text("extra").unwrap_or_default().to_ascii_lowercase();
        column.nullable = row.text("is_nullable").as_deref() == Some("YES");
        if extra.contains("auto_increment") {
            column.auto_increment = true;
            column.unsigned = false;
            return Ok(column);
        }

        if let Some(default) = row.text("column_default") {
            read_default(&mut column, &default, extra.contains("default_generated"));
        }
        Ok(column)
    }
}

/// MySQL reports literal defaults bare, MariaDB quotes them and reports
/// `NULL` for no default.
fn read_default(column: &mut Column, default: &str, generated: bool) {
    let upper = default.to_ascii_uppercase();
    if column.kind.is_temporal() && upper.starts_with("CURRENT_TIMESTAMP") {
        column.use_current = true;
        return;
    }
    if upper == "NULL" {
        return;
    }
    if generated {
        column.default = Some(DefaultValue::Raw(default.to_string()));
        return;
    }
    let literal = if default.starts_with('\'') {
        unquote(default)
    } else {
        default.to_string()
    };
    column.default = Some(DefaultValue::from_literal(&literal, column.kind));
}

#[async_trait]
impl Introspector for MySqlIntrospector {
    async fn list_tables(&self, conn: &dyn Connection) -> Result<Vec<String>> {
        let sql = conn.grammar().compile_list_tables(conn.database_name());
        let rows = conn.select(&sql).await?;
        Ok(rows.iter().filter_map(|r| r.text("table_name")).collect())
    }

    async fn list_columns(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Column>> {
        let sql = conn.grammar().compile_list_columns(conn.database_name(), table);
        conn.select(&sql)
            .await?
            .iter()
            .map(|row| Self::column_from_row(table, row))
            .collect()
    }

    async fn list_indexes(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Index>> {
        let sql = conn.grammar().compile_list_indexes(conn.database_name(), table);
        let rows = conn.select(&sql).await?;

        let mut indexes: Vec<Index> = Vec::new();
        for row in &rows {
            let name = row.text("index_name").unwrap_or_default();
            let column = row.text("column_name").unwrap_or_default();
            match indexes.last_mut() {
                Some(index) if index.name.as_deref() == Some(name.as_str()) => {
                    index.columns.push(column);
                }
                _ => {
                    let kind = if name == "PRIMARY" {
                        IndexKind::Primary
                    } else if row.int("non_unique") == Some(0) {
                        IndexKind::Unique
                    } else {
                        IndexKind::Index
                    };
                    indexes.push(Index::new(kind, vec![column]).named(name));
                }
            }
        }
        Ok(indexes)
    }

    async fn list_foreign_keys(&self, conn: &dyn Connection, table: &str) -> Result<Vec<ForeignKey>> {
        let sql = conn.grammar().compile_list_foreign_keys(conn.database_name(), table);
        let rows = conn.select(&sql).await?;

        let mut keys: Vec<ForeignKey> = Vec::new();
        for row in &rows {
            let name = row.text("constraint_name").unwrap_or_default();
            let column = row.text("column_name").unwrap_or_default();
            let referenced = row.text("referenced_column").unwrap_or_default();
            match keys.last_mut() {
                Some(fk) if fk.name.as_deref() == Some(name.as_str()) => {
                    fk.columns.push(column);
                    fk.references.push(referenced);
                }
                _ => {
                    let on = row.text("referenced_table").unwrap_or_default();
                    let mut fk = ForeignKey::new(vec![column], on, vec![referenced]);
                    fk.on_update = ForeignAction::explicit(
                        row.text("update_rule").and_then(|r| ForeignAction::from_rule(&r)),
                    );
                    fk.on_delete = ForeignAction::explicit(
                        row.text("delete_rule").and_then(|r| ForeignAction::from_rule(&r)),
                    );
                    fk.name = Some(name);
                    keys.push(fk);
                }
            }
        }
        Ok(keys)
    }
}
