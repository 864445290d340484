//! PostgreSQL schema grammar.

use async_trait::async_trait;

use crate::core::blueprint::Blueprint;
use crate::core::column::{Column, ColumnType, DefaultValue};
use crate::core::constraint::{ForeignKey, Index};
use crate::core::grammar::{added_definitions, enum_check, Modifier, SchemaGrammar};
use crate::core::identifier::quote_double;
use crate::core::traits::Connection;
use crate::drivers::Dialect;
use crate::error::Result;

const MODIFIERS: &[Modifier] = &[Modifier::Increment, Modifier::Nullable, Modifier::Default];

const SERIALS: &[ColumnType] = &[
    ColumnType::BigInteger,
    ColumnType::Integer,
    ColumnType::MediumInteger,
    ColumnType::SmallInteger,
    ColumnType::TinyInteger,
];

/// PostgreSQL grammar. Unsigned is not expressible and is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl PostgresGrammar {
    /// Type clause without serial substitution, enum check or default.
    fn base_type(&self, column: &Column) -> String {
        match column.kind {
            ColumnType::BigInteger => "BIGINT".into(),
            ColumnType::Integer | ColumnType::MediumInteger => "INTEGER".into(),
            ColumnType::SmallInteger | ColumnType::TinyInteger => "SMALLINT".into(),
            ColumnType::String => format!("VARCHAR({})", column.string_length()),
            ColumnType::Char => format!("CHAR({})", column.string_length()),
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText => "TEXT".into(),
            ColumnType::Decimal => format!(
                "DECIMAL({}, {})",
                column.precision.unwrap_or(8),
                column.scale.unwrap_or(2)
            ),
            ColumnType::Float => "REAL".into(),
            ColumnType::Double => "DOUBLE PRECISION".into(),
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Enum => "VARCHAR(255)".into(),
            ColumnType::Json => "JSON".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime | ColumnType::Timestamp => "TIMESTAMP(6) WITHOUT TIME ZONE".into(),
            ColumnType::Time => "TIME(6) WITHOUT TIME ZONE".into(),
            ColumnType::Binary => "BYTEA".into(),
        }
    }

    fn serial_type(kind: ColumnType) -> &'static str {
        match kind {
            ColumnType::BigInteger => "BIGSERIAL",
            ColumnType::SmallInteger | ColumnType::TinyInteger => "SMALLSERIAL",
            _ => "SERIAL",
        }
    }

    /// Constraint name Postgres gives an inline column `CHECK`.
    fn check_name(table: &str, column: &str) -> String {
        format!("{}_{}_check", table, column)
    }

    fn alter(&self, blueprint: &Blueprint, clauses: Vec<String>) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} {}",
            self.wrap(blueprint.table()),
            clauses.join(", ")
        )]
    }

    /// Retype one column in place: type, nullability and default.
    fn change_clauses(&self, column: &Column) -> Vec<String> {
        let name = self.wrap(&column.name);
        let mut clauses = vec![format!("ALTER COLUMN {} TYPE {}", name, self.base_type(column))];
        clauses.push(if column.nullable {
            format!("ALTER COLUMN {} DROP NOT NULL", name)
        } else {
            format!("ALTER COLUMN {} SET NOT NULL", name)
        });
        let default = if column.use_current && column.kind.is_temporal() {
            Some("CURRENT_TIMESTAMP(6)".to_string())
        } else {
            column.default.as_ref().map(|d| self.default_literal(d))
        };
        clauses.push(match default {
            Some(value) => format!("ALTER COLUMN {} SET DEFAULT {}", name, value),
            None => format!("ALTER COLUMN {} DROP DEFAULT", name),
        });
        clauses
    }
}

#[async_trait]
impl SchemaGrammar for PostgresGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn wrap(&self, identifier: &str) -> String {
        quote_double(identifier)
    }

    fn modifiers(&self) -> &'static [Modifier] {
        MODIFIERS
    }

    fn serials(&self) -> &'static [ColumnType] {
        SERIALS
    }

    fn type_sql(&self, column: &Column) -> String {
        if column.auto_increment && column.kind.is_integer() {
            return Self::serial_type(column.kind).to_string();
        }
        let base = self.base_type(column);
        match column.kind {
            ColumnType::Enum => format!("{} {}", base, enum_check(self, column)),
            ColumnType::DateTime | ColumnType::Timestamp if column.use_current => {
                format!("{} DEFAULT CURRENT_TIMESTAMP(6)", base)
            }
            _ => base,
        }
    }

    fn modify_increment(&self, column: &Column) -> Option<String> {
        column.auto_increment.then(|| " PRIMARY KEY".to_string())
    }

    fn default_literal(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Bool(b) => b.to_string(),
            DefaultValue::Integer(i) => format!("'{}'", i),
            DefaultValue::Float(f) => format!("'{}'", f),
            DefaultValue::Text(s) => self.quote_string(s),
            DefaultValue::Raw(raw) => raw.clone(),
        }
    }

    fn compile_create(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        Ok(vec![format!(
            "CREATE TABLE {} ({})",
            self.wrap(blueprint.table()),
            added_definitions(self, blueprint)?.join(", ")
        )])
    }

    fn compile_add(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        let clauses = added_definitions(self, blueprint)?
            .into_iter()
            .map(|def| format!("ADD COLUMN {}", def))
            .collect();
        Ok(self.alter(blueprint, clauses))
    }

    async fn compile_change(&self, blueprint: &Blueprint, _conn: &dyn Connection) -> Result<Vec<String>> {
        let table = blueprint.table();
        let mut clauses = Vec::new();
        let mut checks = Vec::new();
        for column in blueprint.changed_columns() {
            clauses.extend(self.change_clauses(column));
            let check = self.wrap(&Self::check_name(table, &column.name));
            clauses.push(format!("DROP CONSTRAINT IF EXISTS {}", check));
            if column.kind == ColumnType::Enum {
                checks.push(format!("ADD CONSTRAINT {} {}", check, enum_check(self, column)));
            }
        }
        let mut statements = self.alter(blueprint, clauses);
        if !checks.is_empty() {
            statements.extend(self.alter(blueprint, checks));
        }
        Ok(statements)
    }

    fn compile_drop(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        Ok(vec![format!("DROP TABLE {}", self.wrap(blueprint.table()))])
    }

    fn compile_drop_if_exists(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        Ok(vec![format!("DROP TABLE IF EXISTS {}", self.wrap(blueprint.table()))])
    }

    fn compile_rename(&self, blueprint: &Blueprint, to: &str) -> Result<Vec<String>> {
        Ok(self.alter(blueprint, vec![format!("RENAME TO {}", self.wrap(to))]))
    }

    async fn compile_drop_column(
        &self,
        blueprint: &Blueprint,
        columns: &[String],
        _conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        let clauses = columns
            .iter()
            .map(|c| format!("DROP COLUMN {}", self.wrap(c)))
            .collect();
        Ok(self.alter(blueprint, clauses))
    }

    async fn compile_rename_column(
        &self,
        blueprint: &Blueprint,
        from: &str,
        to: &str,
        _conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        Ok(self.alter(
            blueprint,
            vec![format!("RENAME COLUMN {} TO {}", self.wrap(from), self.wrap(to))],
        ))
    }

    fn compile_primary(&self, blueprint: &Blueprint, index: &Index) -> Result<Vec<String>> {
        Ok(self.alter(
            blueprint,
            vec![format!("ADD PRIMARY KEY ({})", self.columnize(&index.columns))],
        ))
    }

    fn compile_unique(&self, blueprint: &Blueprint, index: &Index) -> Result<Vec<String>> {
        Ok(self.alter(
            blueprint,
            vec![format!(
                "ADD CONSTRAINT {} UNIQUE ({})",
                self.wrap(&index.resolved_name(blueprint.table())),
                self.columnize(&index.columns)
            )],
        ))
    }

    fn compile_index(&self, blueprint: &Blueprint, index: &Index) -> Result<Vec<String>> {
        Ok(vec![format!(
            "CREATE INDEX {} ON {} ({})",
            self.wrap(&index.resolved_name(blueprint.table())),
            self.wrap(blueprint.table()),
            self.columnize(&index.columns)
        )])
    }

    fn compile_foreign(&self, blueprint: &Blueprint, foreign: &ForeignKey) -> Result<Vec<String>> {
        Ok(self.alter(
            blueprint,
            vec![format!(
                "ADD CONSTRAINT {} {}",
                self.wrap(&foreign.resolved_name(blueprint.table())),
                self.foreign_clause(foreign)
            )],
        ))
    }

    fn compile_drop_primary(&self, blueprint: &Blueprint, name: Option<&str>) -> Result<Vec<String>> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_pkey", blueprint.table()));
        Ok(self.alter(blueprint, vec![format!("DROP CONSTRAINT {}", self.wrap(&name))]))
    }

    fn compile_drop_unique(&self, blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(self.alter(blueprint, vec![format!("DROP CONSTRAINT {}", self.wrap(name))]))
    }

    fn compile_drop_index(&self, _blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(vec![format!("DROP INDEX {}", self.wrap(name))])
    }

    fn compile_drop_foreign(&self, blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(self.alter(blueprint, vec![format!("DROP CONSTRAINT {}", self.wrap(name))]))
    }

    // Catalog queries are scoped to the connection's current database and
    // schema, so `database` is not interpolated.

    fn compile_list_tables(&self, _database: &str) -> String {
        "SELECT table_name::text \
         FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
            .to_string()
    }

    fn compile_list_columns(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT column_name::text, data_type::text, character_maximum_length::int4, \
                numeric_precision::int4, numeric_scale::int4, is_nullable::text, \
                column_default::text, udt_name::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = {} \
             ORDER BY ordinal_position",
            self.quote_string(table)
        )
    }

    fn compile_list_indexes(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT i.relname::text, a.attname::text, ix.indisunique, ix.indisprimary \
             FROM pg_catalog.pg_index ix \
             JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
             JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
             CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = current_schema() AND t.relname = {} \
             ORDER BY i.relname, k.ord",
            self.quote_string(table)
        )
    }

    fn compile_list_foreign_keys(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT c.conname::text, a.attname::text, rt.relname::text, ra.attname::text, \
                c.confupdtype::text, c.confdeltype::text \
             FROM pg_catalog.pg_constraint c \
             JOIN pg_catalog.pg_class t ON t.oid = c.conrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid \
             CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, refnum, ord) \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum \
             JOIN pg_catalog.pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = k.refnum \
             WHERE c.contype = 'f' AND n.nspname = current_schema() AND t.relname = {} \
             ORDER BY c.conname, k.ord",
            self.quote_string(table)
        )
    }

    fn compile_table_exists(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = {}",
            self.quote_string(table)
        )
    }
}

impl PostgresGrammar {
    /// `CHECK` constraint definitions on a table, used to recover enum
    /// allowed-value sets.
    pub fn compile_list_check_constraints(&self, table: &str) -> String {
        format!(
            "SELECT c.conname::text, pg_get_constraintdef(c.oid)::text \
             FROM pg_catalog.pg_constraint c \
             JOIN pg_catalog.pg_class t ON t.oid = c.conrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
             WHERE c.contype = 'c' AND n.nspname = current_schema() AND t.relname = {} \
             ORDER BY c.conname",
            self.quote_string(table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::ForeignAction;
    use crate::testing::FakeConnection;

    async fn compile(bp: &Blueprint) -> Vec<String> {
        let conn = FakeConnection::new(Dialect::Postgres);
        bp.to_sql(&conn).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_table_with_serial_and_enum() {
        let mut bp = Blueprint::new("users");
        bp.create();
        bp.big_increments("id");
        bp.tiny_integer("level").unsigned().default(1);
        bp.enum_column("role", &["admin", "member"]);
        bp.boolean("active").default(true);
        bp.timestamp("created_at").use_current();

        let sql = compile(&bp).await;
        assert_eq!(
            sql,
            ["CREATE TABLE \"users\" (\
              \"id\" BIGSERIAL PRIMARY KEY NOT NULL, \
              \"level\" SMALLINT NOT NULL DEFAULT '1', \
              \"role\" VARCHAR(255) CHECK (\"role\" IN ('admin', 'member')) NOT NULL, \
              \"active\" BOOLEAN NOT NULL DEFAULT true, \
              \"created_at\" TIMESTAMP(6) WITHOUT TIME ZONE DEFAULT CURRENT_TIMESTAMP(6) NOT NULL)"]
        );
    }

    #[tokio::test]
    async fn test_change_column() {
        let mut bp = Blueprint::new("users");
        bp.string("name", 100).nullable().change();
        bp.enum_column("role", &["a", "b"]).default("a").change();

        let sql = compile(&bp).await;
        assert_eq!(sql.len(), 2);
        assert_eq!(
            sql[0],
            "ALTER TABLE \"users\" \
             ALTER COLUMN \"name\" TYPE VARCHAR(100), \
             ALTER COLUMN \"name\" DROP NOT NULL, \
             ALTER COLUMN \"name\" DROP DEFAULT, \
             DROP CONSTRAINT IF EXISTS \"users_name_check\", \
             ALTER COLUMN \"role\" TYPE VARCHAR(255), \
             ALTER COLUMN \"role\" SET NOT NULL, \
             ALTER COLUMN \"role\" SET DEFAULT 'a', \
             DROP CONSTRAINT IF EXISTS \"users_role_check\""
        );
        assert_eq!(
            sql[1],
            "ALTER TABLE \"users\" ADD CONSTRAINT \"users_role_check\" CHECK (\"role\" IN ('a', 'b'))"
        );
    }

    #[tokio::test]
    async fn test_index_verbs() {
        let mut bp = Blueprint::new("posts");
        bp.string("slug", 100);
        bp.unique(&["slug"]);
        bp.index(&["created_at"]);
        bp.integer("user_id")
            .references("users", "id")
            .on_delete(ForeignAction::SetNull);

        let sql = compile(&bp).await;
        assert_eq!(
            sql,
            [
                "ALTER TABLE \"posts\" ADD COLUMN \"slug\" VARCHAR(100) NOT NULL, ADD COLUMN \"user_id\" INTEGER NOT NULL",
                "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_slug_unique\" UNIQUE (\"slug\")",
                "CREATE INDEX \"posts_created_at_index\" ON \"posts\" (\"created_at\")",
                "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_user_id_foreign\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE SET NULL",
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_verbs() {
        let mut bp = Blueprint::new("posts");
        bp.drop_primary();
        bp.drop_index("posts_created_at_index");
        bp.drop_foreign("posts_user_id_foreign");
        bp.rename("articles");

        let sql = compile(&bp).await;
        assert_eq!(
            sql,
            [
                "ALTER TABLE \"posts\" DROP CONSTRAINT \"posts_pkey\"",
                "DROP INDEX \"posts_created_at_index\"",
                "ALTER TABLE \"posts\" DROP CONSTRAINT \"posts_user_id_foreign\"",
                "ALTER TABLE \"posts\" RENAME TO \"articles\"",
            ]
        );
    }
}
