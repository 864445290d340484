//! `CREATE TABLE` statements into blueprints.
//!
//! The accepted grammar is what `SHOW CREATE TABLE` and hand-written MySQL
//! or SQLite schema files contain: quoted or bare column names, inline and
//! table-level keys, named foreign-key constraints and trailing table
//! options. Columns are nullable unless `NOT NULL`, `AUTO_INCREMENT` or an
//! inline `PRIMARY KEY` says otherwise.

use crate::core::blueprint::{Blueprint, Command};
use crate::core::column::{Column, ColumnType, DefaultValue, ForeignKeyRole};
use crate::core::constraint::{ForeignAction, ForeignKey, Index, IndexKind};
use crate::ddl::lexer::{tokenize, Token};
use crate::ddl::types::{apply_mysql_type, apply_origin_type, parse_type, read_type};
use crate::ddl::{matching_paren, split_at_depth_zero, split_top_level};
use crate::error::{MigrateError, Result};

/// Parse every statement in a script. Empty statements are ignored.
pub fn parse_create_tables(sql: &str) -> Result<Vec<Blueprint>> {
    let tokens = tokenize(sql)?;
    split_at_depth_zero(&tokens, &Token::Semicolon)
        .into_iter()
        .map(strip_comments)
        .filter(|statement| !statement.is_empty())
        .map(|statement| parse_statement(&statement))
        .collect()
}

/// Parse a single `CREATE TABLE` statement.
pub fn parse_create_table(sql: &str) -> Result<Blueprint> {
    let mut blueprints = parse_create_tables(sql)?;
    match blueprints.len() {
        1 => Ok(blueprints.remove(0)),
        0 => Err(MigrateError::BadMatch("no CREATE TABLE statement found".into())),
        n => Err(MigrateError::BadMatch(format!(
            "expected one CREATE TABLE statement, found {}",
            n
        ))),
    }
}

/// Comments between statements carry nothing; the ones inside a column
/// clause are kept for the origin-type hints.
fn strip_comments(statement: &[Token]) -> Vec<Token> {
    let start = statement
        .iter()
        .position(|t| !matches!(t, Token::Comment(_)))
        .unwrap_or(statement.len());
    statement[start..].to_vec()
}

fn parse_statement(tokens: &[Token]) -> Result<Blueprint> {
    let mut cursor = Cursor::new(tokens, "CREATE TABLE");
    if !cursor.eat_keyword("create") {
        return Err(MigrateError::BadMatch(format!(
            "expected CREATE TABLE, found '{}'",
            statement_preview(tokens)
        )));
    }
    cursor.eat_keyword("temporary");
    if !cursor.eat_keyword("table") {
        return Err(MigrateError::BadMatch(format!(
            "expected CREATE TABLE, found '{}'",
            statement_preview(tokens)
        )));
    }
    if cursor.eat_keyword("if") {
        cursor.expect_keyword("not")?;
        cursor.expect_keyword("exists")?;
    }
    let table = cursor.qualified_name()?;

    let open = cursor.pos;
    cursor.expect(&Token::LParen)?;
    let close = matching_paren(tokens, open)?;

    let mut blueprint = Blueprint::new(&table);
    blueprint.create();

    let mut table_builder = TableBuilder::new(&table);
    for clause in split_top_level(&tokens[open + 1..close]) {
        if clause.is_empty() {
            return Err(MigrateError::BadMatch(format!("empty clause in table {}", table)));
        }
        table_builder.clause(clause)?;
    }

    cursor.pos = close + 1;
    blueprint.engine = table_options(&mut cursor);

    table_builder.finish(&mut blueprint);
    blueprint.normalize_catalog();
    Ok(blueprint)
}

fn statement_preview(tokens: &[Token]) -> String {
    tokens
        .iter()
        .take(3)
        .map(Token::text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Skip trailing table options, keeping `ENGINE`.
fn table_options(cursor: &mut Cursor<'_>) -> Option<String> {
    let mut engine = None;
    while let Some(token) = cursor.next() {
        if token.is_keyword("engine") {
            if cursor.peek() == Some(&Token::Symbol('=')) {
                cursor.pos += 1;
            }
            engine = cursor.next().and_then(Token::name).map(str::to_string);
        }
    }
    engine
}

/// Accumulates columns and constraints for one table.
struct TableBuilder {
    table: String,
    columns: Vec<Column>,
    indexes: Vec<Index>,
    foreign_keys: Vec<ForeignKey>,
}

impl TableBuilder {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    fn clause(&mut self, tokens: &[Token]) -> Result<()> {
        let context = format!("table {}", self.table);
        let mut cursor = Cursor::new(tokens, &context);
        let Some(first) = cursor.peek() else {
            return Ok(());
        };

        if first.is_keyword("constraint") {
            cursor.pos += 1;
            let name = match cursor.peek() {
                Some(t) if t.is_keyword("primary") || t.is_keyword("unique") || t.is_keyword("foreign") => None,
                Some(_) => Some(cursor.name()?),
                None => return Err(cursor.unexpected_end()),
            };
            return self.constraint(&mut cursor, name);
        }
        if first.is_keyword("primary") || first.is_keyword("unique") || first.is_keyword("foreign") {
            return self.constraint(&mut cursor, None);
        }
        if first.is_keyword("key") || first.is_keyword("index") {
            cursor.pos += 1;
            let name = cursor.optional_index_name()?;
            let columns = cursor.column_list()?;
            cursor.finish()?;
            self.push_index(IndexKind::Index, columns, name);
            return Ok(());
        }
        if first.is_keyword("check") {
            return Ok(());
        }
        if first.is_keyword("fulltext") || first.is_keyword("spatial") {
            return Err(MigrateError::unknown_token(first.text(), context));
        }

        let column = self.column(&mut cursor)?;
        self.columns.push(column);
        Ok(())
    }

    /// `PRIMARY KEY (..)`, `UNIQUE [KEY] [name] (..)` or
    /// `FOREIGN KEY [name] (..) REFERENCES t (..) [actions]`.
    fn constraint(&mut self, cursor: &mut Cursor<'_>, name: Option<String>) -> Result<()> {
        if cursor.eat_keyword("primary") {
            cursor.expect_keyword("key")?;
            let columns = cursor.column_list()?;
            cursor.finish()?;
            self.push_index(IndexKind::Primary, columns, None);
        } else if cursor.eat_keyword("unique") {
            if !cursor.eat_keyword("key") {
                cursor.eat_keyword("index");
            }
            let own_name = cursor.optional_index_name()?;
            let columns = cursor.column_list()?;
            cursor.finish()?;
            self.push_index(IndexKind::Unique, columns, own_name.or(name));
        } else if cursor.eat_keyword("foreign") {
            cursor.expect_keyword("key")?;
            let own_name = cursor.optional_index_name()?;
            let columns = cursor.column_list()?;
            let target = cursor.references()?;
            cursor.finish()?;
            let mut fk = ForeignKey::new(columns, target.on, target.columns);
            fk.on_delete = target.on_delete;
            fk.on_update = target.on_update;
            fk.name = name.or(own_name);
            self.foreign_keys.push(fk);
        } else {
            return Err(cursor.unexpected());
        }
        Ok(())
    }

    fn push_index(&mut self, kind: IndexKind, columns: Vec<String>, name: Option<String>) {
        let mut index = Index::new(kind, columns);
        index.name = name;
        self.indexes.push(index);
    }

    fn column(&mut self, cursor: &mut Cursor<'_>) -> Result<Column> {
        let name = cursor.name()?;
        let physical = read_type(cursor.tokens, &mut cursor.pos)?;
        let mut column = Column::new(&name, ColumnType::Text);
        if !apply_mysql_type(&mut column, &physical) {
            return Err(MigrateError::unknown_token(
                physical.name,
                format!("column {}.{}", self.table, name),
            ));
        }
        column.nullable = true;
        let mut explicit_null = false;

        while let Some(token) = cursor.next() {
            match token {
                Token::Comment(body) if body.eq_ignore_ascii_case("unsigned") => column.unsigned = true,
                Token::Comment(body) => {
                    if let Ok(origin) = parse_type(body) {
                        apply_origin_type(&mut column, &origin);
                    }
                }
                t if t.is_keyword("not") => {
                    cursor.expect_keyword("null")?;
                    column.nullable = false;
                }
                t if t.is_keyword("null") => explicit_null = true,
                t if t.is_keyword("default") => self.column_default(cursor, &mut column)?,
                t if t.is_keyword("auto_increment") || t.is_keyword("autoincrement") => {
                    column.auto_increment = true;
                }
                t if t.is_keyword("unsigned") => {
                    column.unsigned = column.kind.is_numeric() && column.kind != ColumnType::Boolean;
                }
                t if t.is_keyword("zerofill") => {}
                t if t.is_keyword("primary") => {
                    cursor.expect_keyword("key")?;
                    column.nullable = false;
                    self.push_index(IndexKind::Primary, vec![name.clone()], None);
                }
                t if t.is_keyword("unique") => {
                    cursor.eat_keyword("key");
                    self.push_index(IndexKind::Unique, vec![name.clone()], None);
                }
                t if t.is_keyword("references") => {
                    cursor.pos -= 1;
                    let mut target = cursor.references()?;
                    column.foreign = Some(ForeignKeyRole {
                        on: target.on,
                        references: target.columns.pop().unwrap_or_else(|| name.clone()),
                        on_delete: target.on_delete,
                        on_update: target.on_update,
                        name: None,
                    });
                }
                t if t.is_keyword("on") => {
                    // ON UPDATE CURRENT_TIMESTAMP
                    cursor.expect_keyword("update")?;
                    cursor.next();
                    cursor.skip_parens()?;
                }
                t if t.is_keyword("collate") || t.is_keyword("charset") => {
                    cursor.next();
                }
                t if t.is_keyword("character") => {
                    cursor.expect_keyword("set")?;
                    cursor.next();
                }
                t if t.is_keyword("comment") => {
                    cursor.next();
                }
                t if t.is_keyword("check") => cursor.skip_parens()?,
                other => return Err(cursor.unknown(other)),
            }
        }

        if column.auto_increment {
            column.nullable = false;
        }
        if explicit_null && !column.auto_increment {
            column.nullable = true;
        }
        Ok(column)
    }

    fn column_default(&self, cursor: &mut Cursor<'_>, column: &mut Column) -> Result<()> {
        let token = cursor.next().ok_or_else(|| cursor.unexpected_end())?;
        let default = match token {
            Token::Str(s) => Some(DefaultValue::from_literal(s, column.kind)),
            Token::Number(n) => Some(DefaultValue::from_literal(n, column.kind)),
            Token::Symbol('-') => match cursor.next() {
                Some(Token::Number(n)) => Some(DefaultValue::from_literal(&format!("-{}", n), column.kind)),
                Some(other) => return Err(cursor.unknown(other)),
                None => return Err(cursor.unexpected_end()),
            },
            t if t.is_keyword("null") => None,
            t if t.is_keyword("current_timestamp") || t.is_keyword("now") => {
                cursor.skip_parens()?;
                if column.kind.is_temporal() {
                    column.use_current = true;
                    None
                } else {
                    Some(DefaultValue::Raw("CURRENT_TIMESTAMP".into()))
                }
            }
            t if t.is_keyword("true") || t.is_keyword("false") => {
                Some(DefaultValue::from_literal(&t.text(), column.kind))
            }
            Token::Word(w) => Some(DefaultValue::Raw(w.to_ascii_uppercase())),
            Token::LParen => {
                let start = cursor.pos - 1;
                let end = matching_paren(cursor.tokens, start)?;
                let expression = cursor.tokens[start + 1..end]
                    .iter()
                    .map(Token::text)
                    .collect::<Vec<_>>()
                    .join(" ");
                cursor.pos = end + 1;
                Some(DefaultValue::Raw(expression))
            }
            other => return Err(cursor.unknown(other)),
        };
        column.default = default;
        Ok(())
    }

    fn finish(self, blueprint: &mut Blueprint) {
        for column in self.columns {
            blueprint.add_column(column);
        }
        for index in self.indexes {
            blueprint.add_index(index);
        }
        for fk in self.foreign_keys {
            blueprint.push(Command::Foreign(fk));
        }
    }
}

/// Target of a `REFERENCES` clause.
struct Reference {
    on: String,
    columns: Vec<String>,
    on_delete: Option<ForeignAction>,
    on_update: Option<ForeignAction>,
}

/// Position over one clause or statement.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    context: String,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token], context: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            context: context.to_string(),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.peek() {
            Some(t) if t == expected => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.unexpected()),
        }
    }

    fn name(&mut self) -> Result<String> {
        match self.next() {
            Some(t) => t
                .name()
                .map(str::to_string)
                .ok_or_else(|| self.unknown(t)),
            None => Err(self.unexpected_end()),
        }
    }

    /// `name` or `schema.name`; the schema part is dropped.
    fn qualified_name(&mut self) -> Result<String> {
        let mut name = self.name()?;
        while self.peek() == Some(&Token::Symbol('.')) {
            self.pos += 1;
            name = self.name()?;
        }
        Ok(name)
    }

    /// An index name, when one precedes the column list.
    fn optional_index_name(&mut self) -> Result<Option<String>> {
        match self.peek() {
            Some(Token::LParen) | None => Ok(None),
            Some(_) => self.name().map(Some),
        }
    }

    /// `(a, b(10), c DESC)` into `["a", "b", "c"]`.
    fn column_list(&mut self) -> Result<Vec<String>> {
        let open = self.pos;
        self.expect(&Token::LParen)?;
        let close = matching_paren(self.tokens, open)?;
        let mut columns = Vec::new();
        for part in split_top_level(&self.tokens[open + 1..close]) {
            match part.first().and_then(Token::name) {
                Some(name) => columns.push(name.to_string()),
                None => {
                    return Err(MigrateError::BadMatch(format!(
                        "invalid column list in {}",
                        self.context
                    )))
                }
            }
        }
        if columns.is_empty() {
            return Err(MigrateError::BadMatch(format!("empty column list in {}", self.context)));
        }
        self.pos = close + 1;
        Ok(columns)
    }

    /// `REFERENCES t (cols) [ON DELETE a] [ON UPDATE a]`
    fn references(&mut self) -> Result<Reference> {
        self.expect_keyword("references")?;
        let on = self.qualified_name()?;
        let references = self.column_list()?;
        let mut on_delete = None;
        let mut on_update = None;
        while self.peek().is_some_and(|t| t.is_keyword("on")) {
            let after = self.tokens.get(self.pos + 1);
            if after.is_some_and(|t| t.is_keyword("delete")) {
                self.pos += 2;
                on_delete = self.action()?;
            } else if after.is_some_and(|t| t.is_keyword("update")) {
                self.pos += 2;
                on_update = self.action()?;
            } else {
                break;
            }
        }
        Ok(Reference {
            on,
            columns: references,
            on_delete,
            on_update,
        })
    }

    fn action(&mut self) -> Result<Option<ForeignAction>> {
        let first = self.name()?;
        let rule = if first.eq_ignore_ascii_case("set") || first.eq_ignore_ascii_case("no") {
            format!("{} {}", first, self.name()?)
        } else {
            first
        };
        match ForeignAction::from_rule(&rule) {
            Some(action) => Ok(ForeignAction::explicit(Some(action))),
            None => Err(MigrateError::unknown_token(rule, self.context.clone())),
        }
    }

    /// Skip a parenthesized group if one starts here.
    fn skip_parens(&mut self) -> Result<()> {
        if self.peek() == Some(&Token::LParen) {
            self.pos = matching_paren(self.tokens, self.pos)? + 1;
        }
        Ok(())
    }

    /// Everything in the clause must have been consumed.
    fn finish(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.unknown(t)),
        }
    }

    fn unknown(&self, token: &Token) -> MigrateError {
        MigrateError::unknown_token(token.text(), self.context.clone())
    }

    fn unexpected(&self) -> MigrateError {
        match self.peek() {
            Some(t) => self.unknown(t),
            None => self.unexpected_end(),
        }
    }

    fn unexpected_end(&self) -> MigrateError {
        MigrateError::BadMatch(format!("unexpected end of {}", self.context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MYSQL_POSTS: &str = r#"
        CREATE TABLE `posts` (
          `id` int(10) unsigned NOT NULL AUTO_INCREMENT,
          `user_id` int(10) unsigned NOT NULL,
          `title` varchar(190) COLLATE utf8mb4_unicode_ci NOT NULL DEFAULT '',
          `status` enum('draft','published') NOT NULL DEFAULT 'draft',
          `score` decimal(8,2) DEFAULT NULL,
          `published` tinyint(1) NOT NULL DEFAULT '0',
          `created_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
          PRIMARY KEY (`id`),
          UNIQUE KEY `posts_title_unique` (`title`),
          KEY `posts_user_id_foreign` (`user_id`),
          KEY `by_status` (`status`,`published`),
          CONSTRAINT `posts_user_id_foreign` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) ON DELETE CASCADE
        ) ENGINE=InnoDB AUTO_INCREMENT=12 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
    "#;

    #[test]
    fn test_parse_mysql_show_create_table() {
        let bp = parse_create_table(MYSQL_POSTS).unwrap();
        assert_eq!(bp.table(), "posts");
        assert_eq!(bp.engine.as_deref(), Some("InnoDB"));
        assert!(bp.creating());

        let id = bp.column("id").unwrap();
        assert!(id.auto_increment && id.unsigned && !id.nullable);

        let title = bp.column("title").unwrap();
        assert_eq!((title.kind, title.length), (ColumnType::String, Some(190)));
        assert_eq!(title.default, Some(DefaultValue::Text(String::new())));

        let status = bp.column("status").unwrap();
        assert_eq!(status.allowed, ["draft", "published"]);

        let score = bp.column("score").unwrap();
        assert!(score.nullable);
        assert_eq!(score.default, None);

        let published = bp.column("published").unwrap();
        assert_eq!(published.kind, ColumnType::Boolean);
        assert_eq!(published.default, Some(DefaultValue::Bool(false)));

        let created = bp.column("created_at").unwrap();
        assert!(created.use_current);
        assert_eq!(created.default, None);
    }

    #[test]
    fn test_parse_mysql_keys_are_normalized() {
        let bp = parse_create_table(MYSQL_POSTS).unwrap();

        // PK on the auto-increment column is implied, the FK backing index
        // is dropped and the single-column FK becomes a column role.
        let verbs: Vec<_> = bp.commands().iter().map(Command::verb).collect();
        assert_eq!(verbs, ["create", "unique", "index"]);

        let indexes: Vec<_> = bp.indexes().collect();
        assert_eq!(indexes[0].name, None);
        assert_eq!(indexes[1].name.as_deref(), Some("by_status"));
        assert_eq!(indexes[1].columns, ["status", "published"]);

        let role = bp.column("user_id").unwrap().foreign.as_ref().unwrap();
        assert_eq!(role.on, "users");
        assert_eq!(role.references, "id");
        assert_eq!(role.on_delete, Some(ForeignAction::Cascade));
    }

    #[test]
    fn test_parse_sqlite_ddl_with_origin_comments() {
        let sql = r#"CREATE TABLE "accounts" (
            "id" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            "age" INTEGER /*small_integer*/ /*unsigned*/ NOT NULL DEFAULT '18',
            "name" VARCHAR /*string(40)*/ NOT NULL,
            "kind" VARCHAR /*enum('a','b')*/ NOT NULL CHECK ("kind" IN ('a', 'b'))
        )"#;
        let bp = parse_create_table(sql).unwrap();

        let age = bp.column("age").unwrap();
        assert_eq!(age.kind, ColumnType::SmallInteger);
        assert!(age.unsigned);
        assert_eq!(age.default, Some(DefaultValue::Integer(18)));

        let name = bp.column("name").unwrap();
        assert_eq!((name.kind, name.length), (ColumnType::String, Some(40)));

        let kind = bp.column("kind").unwrap();
        assert_eq!(kind.kind, ColumnType::Enum);
        assert_eq!(kind.allowed, ["a", "b"]);

        assert!(bp.column("id").unwrap().auto_increment);
        assert_eq!(bp.indexes().count(), 0);
    }

    #[test]
    fn test_parse_multiple_statements_and_composite_foreign_key() {
        let sql = "
            CREATE TABLE IF NOT EXISTS teams (id int NOT NULL, region char(2) NOT NULL, PRIMARY KEY (id, region));
            -- members reference teams
            CREATE TABLE members (
              team_id int NOT NULL,
              region char(2) NOT NULL,
              CONSTRAINT fk_team FOREIGN KEY (team_id, region) REFERENCES teams (id, region) ON UPDATE SET NULL
            );
        ";
        let tables = parse_create_tables(sql).unwrap();
        assert_eq!(tables.len(), 2);

        let pk = tables[0].indexes().next().unwrap();
        assert_eq!(pk.kind, IndexKind::Primary);
        assert_eq!(pk.columns, ["id", "region"]);

        let fk = tables[1].foreign_keys().next().unwrap();
        assert_eq!(fk.name.as_deref(), Some("fk_team"));
        assert_eq!(fk.columns, ["team_id", "region"]);
        assert_eq!(fk.on_update, Some(ForeignAction::SetNull));
    }

    #[test]
    fn test_non_create_statement_is_bad_match() {
        let err = parse_create_tables("INSERT INTO users VALUES (1)").unwrap_err();
        assert!(matches!(err, MigrateError::BadMatch(_)));
    }

    #[test]
    fn test_unknown_column_token() {
        let err = parse_create_table("CREATE TABLE t (a int NOT NULL BOGUS)").unwrap_err();
        assert!(matches!(err, MigrateError::UnknownToken { ref token, .. } if token == "BOGUS"));

        let err = parse_create_table("CREATE TABLE t (a geometry)").unwrap_err();
        assert!(matches!(err, MigrateError::UnknownToken { .. }));
    }

    #[test]
    fn test_negative_and_expression_defaults() {
        let bp = parse_create_table(
            "CREATE TABLE t (a int NOT NULL DEFAULT -1, b date DEFAULT (CURRENT_DATE))",
        )
        .unwrap();
        assert_eq!(bp.column("a").unwrap().default, Some(DefaultValue::Integer(-1)));
        assert_eq!(
            bp.column("b").unwrap().default,
            Some(DefaultValue::Raw("CURRENT_DATE".into()))
        );
    }
}
