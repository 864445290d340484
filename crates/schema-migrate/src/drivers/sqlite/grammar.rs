//! SQLite schema grammar.

use async_trait::async_trait;
use tracing::debug;

use crate::core::blueprint::{Blueprint, Command};
use crate::core::column::{Column, ColumnType};
use crate::core::constraint::{ForeignKey, Index};
use crate::core::diff::{TableDiff, TableRebuilder};
use crate::core::grammar::{added_definitions, enum_check, Modifier, SchemaGrammar};
use crate::core::identifier::quote_double;
use crate::core::traits::Connection;
use crate::drivers::sqlite::SqliteRebuilder;
use crate::drivers::Dialect;
use crate::error::{MigrateError, Result};

const MODIFIERS: &[Modifier] = &[
    Modifier::Unsigned,
    Modifier::Nullable,
    Modifier::Default,
    Modifier::Increment,
];

/// Only `INTEGER PRIMARY KEY` aliases the rowid.
const SERIALS: &[ColumnType] = &[ColumnType::Integer, ColumnType::BigInteger];

/// SQLite grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl SqliteGrammar {
    fn physical_type(kind: ColumnType) -> &'static str {
        match kind {
            ColumnType::BigInteger
            | ColumnType::Integer
            | ColumnType::MediumInteger
            | ColumnType::SmallInteger
            | ColumnType::TinyInteger => "INTEGER",
            ColumnType::String | ColumnType::Enum => "VARCHAR",
            ColumnType::Char => "CHAR",
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText | ColumnType::Json => {
                "TEXT"
            }
            ColumnType::Decimal => "NUMERIC",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::DateTime | ColumnType::Timestamp => "DATETIME",
            ColumnType::Time => "TIME",
            ColumnType::Binary => "BLOB",
        }
    }

    /// Logical type with its arguments: `string(255)`, `decimal(8,2)`,
    /// `enum('a','b')`.
    fn origin(&self, column: &Column) -> String {
        let name = column.kind.name();
        match column.kind {
            ColumnType::String | ColumnType::Char => format!("{}({})", name, column.string_length()),
            ColumnType::Decimal => format!(
                "{}({},{})",
                name,
                column.precision.unwrap_or(8),
                column.scale.unwrap_or(2)
            ),
            ColumnType::Float | ColumnType::Double => match (column.precision, column.scale) {
                (Some(p), Some(s)) => format!("{}({},{})", name, p, s),
                (Some(p), None) => format!("{}({})", name, p),
                _ => name.to_string(),
            },
            ColumnType::Enum => {
                let allowed = column
                    .allowed
                    .iter()
                    .map(|v| self.quote_string(v))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}({})", name, allowed)
            }
            _ => name.to_string(),
        }
    }

    fn index_statement(&self, keyword: &str, blueprint: &Blueprint, index: &Index) -> Vec<String> {
        vec![format!(
            "CREATE {} {} ON {} ({})",
            keyword,
            self.wrap(&index.resolved_name(blueprint.table())),
            self.wrap(blueprint.table()),
            self.columnize(&index.columns)
        )]
    }

    /// `PRAGMA foreign_keys` read at compile time.
    pub async fn foreign_keys_enabled(&self, conn: &dyn Connection) -> Result<bool> {
        let rows = conn.select(&self.compile_foreign_keys_enabled()).await?;
        Ok(rows.first().is_some_and(|row| row.flag_at(0)))
    }

    /// Bracket statements with `PRAGMA foreign_keys = OFF/ON` when
    /// enforcement is currently on.
    async fn without_foreign_keys(&self, conn: &dyn Connection, statements: Vec<String>) -> Result<Vec<String>> {
        if !self.foreign_keys_enabled(conn).await? {
            return Ok(statements);
        }
        debug!("Foreign keys enforced, toggling around {} statement(s)", statements.len());
        let mut wrapped = Vec::with_capacity(statements.len() + 2);
        wrapped.push("PRAGMA foreign_keys = OFF".to_string());
        wrapped.extend(statements);
        wrapped.push("PRAGMA foreign_keys = ON".to_string());
        Ok(wrapped)
    }

    /// One rebuild covering every `change` and `drop_column` of the
    /// blueprint, so the live table is read once and later verbs see the
    /// earlier ones.
    async fn compile_rebuild(&self, blueprint: &Blueprint, conn: &dyn Connection) -> Result<Vec<String>> {
        let diff = rebuild_diff(blueprint);
        if diff.is_empty() {
            return Ok(Vec::new());
        }
        let statements = SqliteRebuilder.rebuild(&diff, conn).await?;
        if diff.changed_columns.is_empty() {
            return Ok(statements);
        }
        self.without_foreign_keys(conn, statements).await
    }

    pub fn compile_plain_sql(&self, table: &str) -> String {
        format!(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = {}",
            self.quote_string(table)
        )
    }

    pub fn compile_show_index(&self, index: &str) -> String {
        format!(
            "SELECT name AS column_name FROM pragma_index_info({}) ORDER BY seqno",
            self.quote_string(index)
        )
    }

    pub fn compile_foreign_keys_enabled(&self) -> String {
        "PRAGMA foreign_keys".to_string()
    }
}

#[async_trait]
impl SchemaGrammar for SqliteGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
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
        let mut sql = format!("{} /*{}*/", Self::physical_type(column.kind), self.origin(column));
        if column.kind == ColumnType::Enum {
            sql.push(' ');
            sql.push_str(&enum_check(self, column));
        }
        if column.kind.is_temporal() && column.use_current {
            sql.push_str(" DEFAULT CURRENT_TIMESTAMP");
        }
        sql
    }

    fn modify_unsigned(&self, column: &Column) -> Option<String> {
        let eligible = column.kind.is_numeric() && column.kind != ColumnType::Boolean;
        (column.unsigned && eligible && !column.auto_increment).then(|| " /*unsigned*/".to_string())
    }

    fn modify_increment(&self, column: &Column) -> Option<String> {
        column
            .auto_increment
            .then(|| " PRIMARY KEY AUTOINCREMENT".to_string())
    }

    /// Primary and foreign keys are part of the table definition.
    fn compile_create(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        let mut definitions = added_definitions(self, blueprint)?;
        let auto = blueprint.auto_increment_column().map(|c| c.name.as_str());

        for command in blueprint.compiled_commands() {
            match command {
                Command::Primary(index) if matches!(&index.columns[..], [c] if Some(c.as_str()) == auto) => {}
                Command::Primary(index) => {
                    definitions.push(format!("PRIMARY KEY ({})", self.columnize(&index.columns)));
                }
                Command::Foreign(foreign) => definitions.push(self.foreign_clause(&foreign)),
                _ => {}
            }
        }

        Ok(vec![format!(
            "CREATE TABLE {} ({})",
            self.wrap(blueprint.table()),
            definitions.join(", ")
        )])
    }

    fn compile_add(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        let table = self.wrap(blueprint.table());
        Ok(added_definitions(self, blueprint)?
            .into_iter()
            .map(|def| format!("ALTER TABLE {} ADD COLUMN {}", table, def))
            .collect())
    }

    async fn compile_change(&self, blueprint: &Blueprint, conn: &dyn Connection) -> Result<Vec<String>> {
        self.compile_rebuild(blueprint, conn).await
    }

    fn compile_drop(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        Ok(vec![format!("DROP TABLE {}", self.wrap(blueprint.table()))])
    }

    fn compile_drop_if_exists(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        Ok(vec![format!("DROP TABLE IF EXISTS {}", self.wrap(blueprint.table()))])
    }

    fn compile_rename(&self, blueprint: &Blueprint, to: &str) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} RENAME TO {}",
            self.wrap(blueprint.table()),
            self.wrap(to)
        )])
    }

    async fn compile_drop_column(
        &self,
        blueprint: &Blueprint,
        columns: &[String],
        conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        // The first rebuild verb of the blueprint emits the merged rebuild
        let first_drop = blueprint.commands().iter().find_map(|command| match command {
            Command::DropColumn { columns } => Some(columns),
            _ => None,
        });
        if retypes_columns(blueprint) || first_drop.map(Vec::as_slice) != Some(columns) {
            return Ok(Vec::new());
        }
        self.compile_rebuild(blueprint, conn).await
    }

    async fn compile_rename_column(
        &self,
        blueprint: &Blueprint,
        from: &str,
        to: &str,
        conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        let rename = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.wrap(blueprint.table()),
            self.wrap(from),
            self.wrap(to)
        );
        self.without_foreign_keys(conn, vec![rename]).await
    }

    fn compile_primary(&self, blueprint: &Blueprint, _index: &Index) -> Result<Vec<String>> {
        if blueprint.creating() {
            return Ok(Vec::new());
        }
        Err(MigrateError::unsupported(self.dialect(), "primary"))
    }

    fn compile_unique(&self, blueprint: &Blueprint, index: &Index) -> Result<Vec<String>> {
        Ok(self.index_statement("UNIQUE INDEX", blueprint, index))
    }

    fn compile_index(&self, blueprint: &Blueprint, index: &Index) -> Result<Vec<String>> {
        Ok(self.index_statement("INDEX", blueprint, index))
    }

    fn compile_foreign(&self, blueprint: &Blueprint, _foreign: &ForeignKey) -> Result<Vec<String>> {
        if blueprint.creating() {
            return Ok(Vec::new());
        }
        Err(MigrateError::unsupported(self.dialect(), "foreign"))
    }

    fn compile_drop_unique(&self, _blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(vec![format!("DROP INDEX {}", self.wrap(name))])
    }

    fn compile_drop_index(&self, _blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(vec![format!("DROP INDEX {}", self.wrap(name))])
    }

    // Table-valued pragma functions keep the catalog queries plain SELECTs,
    // so rows come back column-keyed like the MySQL catalog.

    fn compile_list_tables(&self, _database: &str) -> String {
        "SELECT name AS table_name FROM sqlite_master WHERE type = 'table' ORDER BY name".to_string()
    }

    fn compile_list_columns(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT name, type, \"notnull\", dflt_value, pk \
             FROM pragma_table_info({}) ORDER BY cid",
            self.quote_string(table)
        )
    }

    fn compile_list_indexes(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT name, \"unique\", origin FROM pragma_index_list({}) ORDER BY name",
            self.quote_string(table)
        )
    }

    fn compile_list_foreign_keys(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT id, seq, \"table\", \"from\", \"to\", on_update, on_delete \
             FROM pragma_foreign_key_list({}) ORDER BY id, seq",
            self.quote_string(table)
        )
    }

    fn compile_table_exists(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = {}",
            self.quote_string(table)
        )
    }
}

/// Changed columns only imply a `change` command on an existing table.
fn retypes_columns(blueprint: &Blueprint) -> bool {
    !blueprint.creating() && blueprint.changed_columns().next().is_some()
}

fn rebuild_diff(blueprint: &Blueprint) -> TableDiff {
    let mut diff = TableDiff::new(blueprint.table());
    if retypes_columns(blueprint) {
        diff = diff.changing(blueprint.changed_columns());
    }
    for command in blueprint.commands() {
        if let Command::DropColumn { columns } = command {
            diff = diff.removing(columns);
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::ForeignAction;
    use crate::core::value::Row;
    use crate::testing::FakeConnection;

    fn make_test_connection(foreign_keys: bool) -> FakeConnection {
        let flag = if foreign_keys { "1" } else { "0" };
        FakeConnection::new(Dialect::Sqlite)
            .on_select("PRAGMA foreign_keys", vec![Row::from_pairs([("foreign_keys", flag)])])
    }

    #[tokio::test]
    async fn test_create_folds_keys_and_records_origin() {
        let mut bp = Blueprint::new("users");
        bp.create();
        bp.increments("id");
        bp.small_integer("votes").unsigned().default(0);
        bp.string("email", 190);
        bp.enum_column("role", &["admin", "member"]);
        bp.timestamp("created_at").use_current();
        bp.integer("team_id")
            .references("teams", "id")
            .on_delete(ForeignAction::Cascade);
        bp.unique(&["email"]);

        let conn = make_test_connection(true);
        let sql = bp.to_sql(&conn).await.unwrap();
        assert_eq!(
            sql,
            [
                "CREATE TABLE \"users\" (\
                 \"id\" INTEGER /*integer*/ NOT NULL PRIMARY KEY AUTOINCREMENT, \
                 \"votes\" INTEGER /*small_integer*/ /*unsigned*/ NOT NULL DEFAULT '0', \
                 \"email\" VARCHAR /*string(190)*/ NOT NULL, \
                 \"role\" VARCHAR /*enum('admin','member')*/ CHECK (\"role\" IN ('admin', 'member')) NOT NULL, \
                 \"created_at\" DATETIME /*timestamp*/ DEFAULT CURRENT_TIMESTAMP NOT NULL, \
                 \"team_id\" INTEGER /*integer*/ NOT NULL, \
                 FOREIGN KEY (\"team_id\") REFERENCES \"teams\" (\"id\") ON DELETE CASCADE)",
                "CREATE UNIQUE INDEX \"users_email_unique\" ON \"users\" (\"email\")",
            ]
        );
    }

    #[tokio::test]
    async fn test_composite_primary_key_is_inline() {
        let mut bp = Blueprint::new("role_user");
        bp.create();
        bp.integer("role_id");
        bp.integer("user_id");
        bp.primary(&["role_id", "user_id"]);

        let sql = bp.to_sql(&make_test_connection(false)).await.unwrap();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].ends_with("PRIMARY KEY (\"role_id\", \"user_id\"))"));
    }

    #[tokio::test]
    async fn test_keys_on_existing_table_are_unsupported() {
        let mut bp = Blueprint::new("users");
        bp.primary(&["id"]);
        let err = bp.to_sql(&make_test_connection(false)).await.unwrap_err();
        assert!(matches!(err, MigrateError::Compilation { ref verb, .. } if verb == "primary"));

        let mut bp = Blueprint::new("users");
        bp.drop_foreign("users_team_id_foreign");
        let err = bp.to_sql(&make_test_connection(false)).await.unwrap_err();
        assert!(matches!(err, MigrateError::Compilation { ref verb, .. } if verb == "drop_foreign"));
    }

    #[tokio::test]
    async fn test_add_columns_one_statement_each() {
        let mut bp = Blueprint::new("users");
        bp.string("nickname", 50).nullable();
        bp.boolean("admin").default(false);

        let sql = bp.to_sql(&make_test_connection(false)).await.unwrap();
        assert_eq!(
            sql,
            [
                "ALTER TABLE \"users\" ADD COLUMN \"nickname\" VARCHAR /*string(50)*/ NULL",
                "ALTER TABLE \"users\" ADD COLUMN \"admin\" BOOLEAN /*boolean*/ NOT NULL DEFAULT '0'",
            ]
        );
    }

    #[tokio::test]
    async fn test_rename_column_toggles_foreign_keys_when_enforced() {
        let mut bp = Blueprint::new("users");
        bp.rename_column("name", "full_name");

        let sql = bp.to_sql(&make_test_connection(true)).await.unwrap();
        assert_eq!(
            sql,
            [
                "PRAGMA foreign_keys = OFF",
                "ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\"",
                "PRAGMA foreign_keys = ON",
            ]
        );

        let sql = bp.to_sql(&make_test_connection(false)).await.unwrap();
        assert_eq!(sql, ["ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\""]);
    }

    #[test]
    fn test_auto_increment_rejected_on_small_integer() {
        let mut column = Column::new("id", ColumnType::SmallInteger);
        column.auto_increment = true;
        assert!(SqliteGrammar.column_definition(&column).is_err());
    }
}
