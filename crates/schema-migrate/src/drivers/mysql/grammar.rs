//! MySQL schema grammar.

use async_trait::async_trait;

use crate::core::blueprint::Blueprint;
use crate::core::column::{Column, ColumnType};
use crate::core::constraint::{ForeignKey, Index};
use crate::core::grammar::{added_definitions, Modifier, SchemaGrammar};
use crate::core::identifier::{quote_backtick, quote_mysql_literal};
use crate::core::traits::Connection;
use crate::drivers::Dialect;
use crate::error::Result;

const MODIFIERS: &[Modifier] = &[
    Modifier::Unsigned,
    Modifier::Nullable,
    Modifier::Default,
    Modifier::Increment,
];

const SERIALS: &[ColumnType] = &[
    ColumnType::BigInteger,
    ColumnType::Integer,
    ColumnType::MediumInteger,
    ColumnType::SmallInteger,
    ColumnType::TinyInteger,
];

/// MySQL/MariaDB grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl MySqlGrammar {
    fn alter(&self, blueprint: &Blueprint, clauses: Vec<String>) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} {}",
            self.wrap(blueprint.table()),
            clauses.join(", ")
        )]
    }

    fn key_clause(&self, keyword: &str, blueprint: &Blueprint, index: &Index) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD {} {}({})",
            self.wrap(blueprint.table()),
            keyword,
            self.wrap(&index.resolved_name(blueprint.table())),
            self.columnize(&index.columns)
        )]
    }

    fn precision(column: &Column) -> String {
        match (column.precision, column.scale) {
            (Some(p), Some(s)) => format!("({}, {})", p, s),
            (Some(p), None) => format!("({})", p),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl SchemaGrammar for MySqlGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn wrap(&self, identifier: &str) -> String {
        quote_backtick(identifier)
    }

    fn quote_string(&self, value: &str) -> String {
        quote_mysql_literal(value)
    }

    fn modifiers(&self) -> &'static [Modifier] {
        MODIFIERS
    }

    fn serials(&self) -> &'static [ColumnType] {
        SERIALS
    }

    fn type_sql(&self, column: &Column) -> String {
        match column.kind {
            ColumnType::BigInteger => "BIGINT".into(),
            ColumnType::Integer => "INT".into(),
            ColumnType::MediumInteger => "MEDIUMINT".into(),
            ColumnType::SmallInteger => "SMALLINT".into(),
            ColumnType::TinyInteger => "TINYINT".into(),
            ColumnType::String => format!("VARCHAR({})", column.string_length()),
            ColumnType::Char => format!("CHAR({})", column.string_length()),
            ColumnType::Text => "TEXT".into(),
            ColumnType::MediumText => "MEDIUMTEXT".into(),
            ColumnType::LongText => "LONGTEXT".into(),
            ColumnType::Decimal => format!(
                "DECIMAL({}, {})",
                column.precision.unwrap_or(8),
                column.scale.unwrap_or(2)
            ),
            ColumnType::Float => format!("FLOAT{}", Self::precision(column)),
            ColumnType::Double => format!("DOUBLE{}", Self::precision(column)),
            ColumnType::Boolean => "TINYINT(1)".into(),
            ColumnType::Enum => {
                let allowed = column
                    .allowed
                    .iter()
                    .map(|v| self.quote_string(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("ENUM({})", allowed)
            }
            ColumnType::Json => "JSON".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime if column.use_current => "DATETIME DEFAULT CURRENT_TIMESTAMP".into(),
            ColumnType::DateTime => "DATETIME".into(),
            ColumnType::Timestamp if column.use_current => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP".into(),
            ColumnType::Timestamp => "TIMESTAMP".into(),
            ColumnType::Time => "TIME".into(),
            ColumnType::Binary => "BLOB".into(),
        }
    }

    fn modify_unsigned(&self, column: &Column) -> Option<String> {
        let eligible = column.kind.is_numeric() && column.kind != ColumnType::Boolean;
        (column.unsigned && eligible && !column.auto_increment).then(|| " UNSIGNED".to_string())
    }

    fn modify_increment(&self, column: &Column) -> Option<String> {
        column
            .auto_increment
            .then(|| " AUTO_INCREMENT PRIMARY KEY".to_string())
    }

    fn compile_create(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        let mut sql = format!(
            "CREATE TABLE {} ({})",
            self.wrap(blueprint.table()),
            added_definitions(self, blueprint)?.join(", ")
        );
        if let Some(engine) = &blueprint.engine {
            sql.push_str(&format!(" ENGINE = {}", engine));
        }
        Ok(vec![sql])
    }

    fn compile_add(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        let clauses = added_definitions(self, blueprint)?
            .into_iter()
            .map(|def| format!("ADD {}", def))
            .collect();
        Ok(self.alter(blueprint, clauses))
    }

    async fn compile_change(&self, blueprint: &Blueprint, _conn: &dyn Connection) -> Result<Vec<String>> {
        let columns: Vec<&Column> = blueprint.changed_columns().collect();
        let clauses = self
            .column_definitions(&columns)?
            .into_iter()
            .map(|def| format!("MODIFY {}", def))
            .collect();
        Ok(self.alter(blueprint, clauses))
    }

    fn compile_drop(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        Ok(vec![format!("DROP TABLE {}", self.wrap(blueprint.table()))])
    }

    fn compile_drop_if_exists(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        Ok(vec![format!("DROP TABLE IF EXISTS {}", self.wrap(blueprint.table()))])
    }

    fn compile_rename(&self, blueprint: &Blueprint, to: &str) -> Result<Vec<String>> {
        Ok(vec![format!(
            "RENAME TABLE {} TO {}",
            self.wrap(blueprint.table()),
            self.wrap(to)
        )])
    }

    async fn compile_drop_column(
        &self,
        blueprint: &Blueprint,
        columns: &[String],
        _conn: &dyn Connection,
    ) -> Result<Vec<String>> {
        let clauses = columns.iter().map(|c| format!("DROP {}", self.wrap(c))).collect();
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
        Ok(self.key_clause("UNIQUE", blueprint, index))
    }

    fn compile_index(&self, blueprint: &Blueprint, index: &Index) -> Result<Vec<String>> {
        Ok(self.key_clause("INDEX", blueprint, index))
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

    fn compile_drop_primary(&self, blueprint: &Blueprint, _name: Option<&str>) -> Result<Vec<String>> {
        Ok(self.alter(blueprint, vec!["DROP PRIMARY KEY".into()]))
    }

    fn compile_drop_unique(&self, blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(self.alter(blueprint, vec![format!("DROP INDEX {}", self.wrap(name))]))
    }

    fn compile_drop_index(&self, blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(self.alter(blueprint, vec![format!("DROP INDEX {}", self.wrap(name))]))
    }

    fn compile_drop_foreign(&self, blueprint: &Blueprint, name: &str) -> Result<Vec<String>> {
        Ok(self.alter(blueprint, vec![format!("DROP FOREIGN KEY {}", self.wrap(name))]))
    }

    // CAST to CHAR to handle collation differences between
    // INFORMATION_SCHEMA and user tables.

    fn compile_list_tables(&self, database: &str) -> String {
        format!(
            "SELECT CAST(TABLE_NAME AS CHAR(255)) AS table_name \
             FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME",
            self.quote_string(database)
        )
    }

    fn compile_list_columns(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT \
                CAST(COLUMN_NAME AS CHAR(255)) AS column_name, \
                CAST(COLUMN_TYPE AS CHAR(1024)) AS column_type, \
                CAST(IS_NULLABLE AS CHAR(3)) AS is_nullable, \
                CAST(COLUMN_DEFAULT AS CHAR(1024)) AS column_default, \
                CAST(EXTRA AS CHAR(255)) AS extra \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} \
             ORDER BY ORDINAL_POSITION",
            self.quote_string(database),
            self.quote_string(table)
        )
    }

    fn compile_list_indexes(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT \
                CAST(INDEX_NAME AS CHAR(255)) AS index_name, \
                CAST(COLUMN_NAME AS CHAR(255)) AS column_name, \
                CAST(NON_UNIQUE AS SIGNED) AS non_unique \
             FROM INFORMATION_SCHEMA.STATISTICS \
             WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            self.quote_string(database),
            self.quote_string(table)
        )
    }

    fn compile_list_foreign_keys(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT \
                CAST(kcu.CONSTRAINT_NAME AS CHAR(255)) AS constraint_name, \
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS column_name, \
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS referenced_table, \
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS referenced_column, \
                CAST(rc.UPDATE_RULE AS CHAR(64)) AS update_rule, \
                CAST(rc.DELETE_RULE AS CHAR(64)) AS delete_rule \
             FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
             JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc \
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA \
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
                AND rc.TABLE_NAME = kcu.TABLE_NAME \
             WHERE kcu.TABLE_SCHEMA = {} AND kcu.TABLE_NAME = {} \
                AND kcu.REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION",
            self.quote_string(database),
            self.quote_string(table)
        )
    }

    fn compile_table_exists(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {}",
            self.quote_string(database),
            self.quote_string(table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::ForeignAction;
    use crate::error::MigrateError;
    use crate::testing::FakeConnection;

    async fn compile(bp: &Blueprint) -> Vec<String> {
        let conn = FakeConnection::new(Dialect::MySql);
        bp.to_sql(&conn).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_table() {
        let mut bp = Blueprint::new("users");
        bp.create();
        bp.increments("id");
        bp.string("email", 255);
        bp.integer("votes").unsigned().default(0);
        bp.enum_column("role", &["admin", "member"]).default("member");
        bp.timestamp("created_at").use_current();
        bp.engine = Some("InnoDB".into());

        let sql = compile(&bp).await;
        assert_eq!(
            sql,
            ["CREATE TABLE `users` (\
              `id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
              `email` VARCHAR(255) NOT NULL, \
              `votes` INT UNSIGNED NOT NULL DEFAULT '0', \
              `role` ENUM('admin', 'member') NOT NULL DEFAULT 'member', \
              `created_at` TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL) \
              ENGINE = InnoDB"]
        );
    }

    #[tokio::test]
    async fn test_auto_increment_never_unsigned() {
        let mut bp = Blueprint::new("users");
        bp.create();
        bp.big_increments("id").unsigned();

        let sql = compile(&bp).await;
        assert_eq!(sql, ["CREATE TABLE `users` (`id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY)"]);
    }

    #[tokio::test]
    async fn test_add_and_change_columns() {
        let mut bp = Blueprint::new("users");
        bp.string("nickname", 40).nullable();
        bp.text("bio").change();

        let sql = compile(&bp).await;
        assert_eq!(
            sql,
            [
                "ALTER TABLE `users` MODIFY `bio` TEXT NOT NULL",
                "ALTER TABLE `users` ADD `nickname` VARCHAR(40) NULL",
            ]
        );
    }

    #[tokio::test]
    async fn test_indexes_and_foreign_keys() {
        let mut bp = Blueprint::new("posts");
        bp.unique(&["slug"]);
        bp.index(&["user_id", "created_at"]);
        let mut fk = ForeignKey::new(vec!["user_id".into()], "users", vec!["id".into()]);
        fk.on_delete = Some(ForeignAction::Cascade);
        bp.foreign(fk);

        let sql = compile(&bp).await;
        assert_eq!(
            sql,
            [
                "ALTER TABLE `posts` ADD UNIQUE `posts_slug_unique`(`slug`)",
                "ALTER TABLE `posts` ADD INDEX `posts_user_id_created_at_index`(`user_id`, `created_at`)",
                "ALTER TABLE `posts` ADD CONSTRAINT `posts_user_id_foreign` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) ON DELETE CASCADE",
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_verbs() {
        let mut bp = Blueprint::new("posts");
        bp.drop_columns(vec!["a".into(), "b".into()]);
        bp.rename_column("c", "d");
        bp.drop_primary();
        bp.drop_unique("posts_slug_unique");
        bp.drop_foreign("posts_user_id_foreign");

        let sql = compile(&bp).await;
        assert_eq!(
            sql,
            [
                "ALTER TABLE `posts` DROP `a`, DROP `b`",
                "ALTER TABLE `posts` RENAME COLUMN `c` TO `d`",
                "ALTER TABLE `posts` DROP PRIMARY KEY",
                "ALTER TABLE `posts` DROP INDEX `posts_slug_unique`",
                "ALTER TABLE `posts` DROP FOREIGN KEY `posts_user_id_foreign`",
            ]
        );
    }

    #[tokio::test]
    async fn test_table_verbs() {
        let mut bp = Blueprint::new("a");
        bp.rename("b");
        assert_eq!(compile(&bp).await, ["RENAME TABLE `a` TO `b`"]);

        let mut bp = Blueprint::new("a");
        bp.drop_if_exists();
        assert_eq!(compile(&bp).await, ["DROP TABLE IF EXISTS `a`"]);
    }

    #[tokio::test]
    async fn test_invalid_column_is_rejected() {
        let mut bp = Blueprint::new("t");
        bp.create();
        bp.string("code", 10).auto_increment = true;

        let conn = FakeConnection::new(Dialect::MySql);
        let err = bp.to_sql(&conn).await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidColumn { .. }));
    }

    #[test]
    fn test_mysql_literals_escape_backslash() {
        let grammar = MySqlGrammar;
        assert_eq!(grammar.quote_string(r"C:\temp's"), r"'C:\\temp''s'");
        assert!(grammar
            .compile_list_columns("app", "o'brien")
            .contains("TABLE_NAME = 'o''brien'"));
    }
}
