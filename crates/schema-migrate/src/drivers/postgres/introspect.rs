//! PostgreSQL catalog reader. Rows are positional tuples.

use async_trait::async_trait;

use crate::core::column::{Column, ColumnType, DefaultValue};
use crate::core::constraint::{ForeignAction, ForeignKey, Index, IndexKind};
use crate::core::identifier::unquote;
use crate::core::traits::{Connection, Introspector};
use crate::core::value::Row;
use crate::ddl::lexer::{tokenize, Token};
use crate::drivers::postgres::PostgresGrammar;
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresIntrospector;

impl PostgresIntrospector {
    fn column_from_row(table: &str, row: &Row) -> Result<Column> {
        let name = row.text_at(0).unwrap_or_default();
        let data_type = row.text_at(1).unwrap_or_default().to_ascii_lowercase();

        let kind = match data_type.as_str() {
            "bigint" => ColumnType::BigInteger,
            "integer" => ColumnType::Integer,
            "smallint" => ColumnType::SmallInteger,
            "character varying" => ColumnType::String,
            "character" => ColumnType::Char,
            "text" => ColumnType::Text,
            "numeric" => ColumnType::Decimal,
            "real" => ColumnType::Float,
            "double precision" => ColumnType::Double,
            "boolean" => ColumnType::Boolean,
            "json" | "jsonb" => ColumnType::Json,
            "date" => ColumnType::Date,
            "timestamp without time zone" | "timestamp with time zone" => ColumnType::Timestamp,
            "time without time zone" | "time with time zone" => ColumnType::Time,
            "bytea" => ColumnType::Binary,
            _ => {
                let physical = match row.text_at(7) {
                    Some(udt) if data_type == "user-defined" => udt,
                    _ => data_type,
                };
                return Err(MigrateError::CatalogMismatch {
                    table: table.to_string(),
                    column: name,
                    physical,
                });
            }
        };

        let mut column = Column::new(name, kind);
        match kind {
            ColumnType::String | ColumnType::Char => {
                column.length = row.int_at(2).and_then(|l| u32::try_from(l).ok());
            }
            ColumnType::Decimal => {
                column.precision = row.int_at(3).and_then(|p| u32::try_from(p).ok());
                column.scale = row.int_at(4).and_then(|s| u32::try_from(s).ok());
            }
            _ => {}
        }
        column.nullable = row.text_at(5).as_deref() == Some("YES");

        if let Some(default) = row.text_at(6) {
            if default.contains("nextval(") {
                column.auto_increment = true;
            } else {
                read_default(&mut column, &default);
            }
        }
        Ok(column)
    }

    /// Turn `VARCHAR` columns guarded by `CHECK (col IN (...))` back into
    /// enums.
    fn apply_checks(columns: &mut [Column], rows: &[Row]) {
        for row in rows {
            let Some(definition) = row.text_at(1) else {
                continue;
            };
            let upper = definition.to_ascii_uppercase();
            if !(upper.contains("= ANY") || upper.contains(" IN ")) {
                continue;
            }
            let Ok(tokens) = tokenize(&definition) else {
                continue;
            };

            let target = tokens.iter().find_map(|t| {
                let name = t.name()?;
                columns
                    .iter()
                    .position(|c| c.name == name && c.kind == ColumnType::String)
            });
            let Some(target) = target else {
                continue;
            };
            let allowed: Vec<String> = tokens
                .iter()
                .filter_map(|t| match t {
                    Token::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            if allowed.is_empty() {
                continue;
            }

            let column = &mut columns[target];
            column.kind = ColumnType::Enum;
            column.length = None;
            column.allowed = allowed;
        }
    }
}

/// Strip the type cast from a catalog default: `'draft'::character varying`,
/// `'0'::integer`, `(-1)`, `NULL::text`.
fn read_default(column: &mut Column, default: &str) {
    let upper = default.to_ascii_uppercase();
    if column.kind.is_temporal() && (upper.starts_with("CURRENT_TIMESTAMP") || upper.starts_with("NOW()")) {
        column.use_current = true;
        return;
    }
    if upper.starts_with("NULL") {
        return;
    }

    if default.starts_with('\'') {
        let end = closing_quote(default).unwrap_or(default.len());
        let literal = unquote(&default[..end]);
        column.default = Some(DefaultValue::from_literal(&literal, column.kind));
        return;
    }

    let bare = default
        .split("::")
        .next()
        .unwrap_or(default)
        .trim_start_matches('(')
        .trim_end_matches(')');
    let literal = DefaultValue::from_literal(bare, column.kind);
    column.default = Some(match literal {
        DefaultValue::Text(_) => DefaultValue::Raw(default.to_string()),
        typed => typed,
    });
}

/// Byte offset just past the quote closing a leading `'...'` literal.
fn closing_quote(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

#[async_trait]
impl Introspector for PostgresIntrospector {
    async fn list_tables(&self, conn: &dyn Connection) -> Result<Vec<String>> {
        let sql = conn.grammar().compile_list_tables(conn.database_name());
        let rows = conn.select(&sql).await?;
        Ok(rows.iter().filter_map(|r| r.text_at(0)).collect())
    }

    async fn list_columns(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Column>> {
        let sql = conn.grammar().compile_list_columns(conn.database_name(), table);
        let mut columns = conn
            .select(&sql)
            .await?
            .iter()
            .map(|row| Self::column_from_row(table, row))
            .collect::<Result<Vec<_>>>()?;

        if columns.iter().any(|c| c.kind == ColumnType::String) {
            let checks = conn
                .select(&PostgresGrammar.compile_list_check_constraints(table))
                .await?;
            Self::apply_checks(&mut columns, &checks);
        }
        Ok(columns)
    }

    async fn list_indexes(&self, conn: &dyn Connection, table: &str) -> Result<Vec<Index>> {
        let sql = conn.grammar().compile_list_indexes(conn.database_name(), table);
        let rows = conn.select(&sql).await?;

        let mut indexes: Vec<Index> = Vec::new();
        for row in &rows {
            let name = row.text_at(0).unwrap_or_default();
            let column = row.text_at(1).unwrap_or_default();
            match indexes.last_mut() {
                Some(index) if index.name.as_deref() == Some(name.as_str()) => {
                    index.columns.push(column);
                }
                _ => {
                    let kind = if row.flag_at(3) {
                        IndexKind::Primary
                    } else if row.flag_at(2) {
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
            let name = row.text_at(0).unwrap_or_default();
            let column = row.text_at(1).unwrap_or_default();
            let referenced = row.text_at(3).unwrap_or_default();
            match keys.last_mut() {
                Some(fk) if fk.name.as_deref() == Some(name.as_str()) => {
                    fk.columns.push(column);
                    fk.references.push(referenced);
                }
                _ => {
                    let on = row.text_at(2).unwrap_or_default();
                    let mut fk = ForeignKey::new(vec![column], on, vec![referenced]);
                    fk.on_update = ForeignAction::explicit(
                        row.text_at(4).and_then(|c| ForeignAction::from_pg_code(&c)),
                    );
                    fk.on_delete = ForeignAction::explicit(
                        row.text_at(5).and_then(|c| ForeignAction::from_pg_code(&c)),
                    );
                    fk.name = Some(name);
                    keys.push(fk);
                }
            }
        }
        Ok(keys)
    }
}
