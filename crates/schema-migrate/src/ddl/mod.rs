//! MySQL-style `CREATE TABLE` parsing.
//!
//! - [`lexer`]: tokens, including the `/* */` comments SQLite DDL carries
//! - [`types`]: physical type clauses and their logical mapping
//! - [`parser`]: statements into blueprints
//!
//! [`ddl_to_migration`] turns a DDL script into a migration document using
//! the same renderer as the schema dumper.

pub mod lexer;
pub mod parser;
pub mod types;

use std::collections::HashMap;

use crate::dumper::render::render_document;
use crate::dumper::DumpOptions;
use crate::error::{MigrateError, Result};

pub use lexer::{tokenize, Token};
pub use parser::{parse_create_table, parse_create_tables};
pub use types::{parse_type, TypeSpec};

/// Keywords that open a table constraint instead of a column clause.
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "primary",
    "unique",
    "key",
    "index",
    "constraint",
    "foreign",
    "check",
    "fulltext",
    "spatial",
];

/// Split a token run on commas at parenthesis depth zero.
///
/// Empty input yields no parts; an empty part between two commas is kept so
/// callers can report it.
pub fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    split_at_depth_zero(tokens, &Token::Comma)
}

pub(crate) fn split_at_depth_zero<'a>(tokens: &'a [Token], separator: &Token) -> Vec<&'a [Token]> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            t if depth == 0 && t == separator => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Index of the `)` closing the `(` at `open`.
pub fn matching_paren(tokens: &[Token], open: usize) -> Result<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(MigrateError::BadMatch("unbalanced parentheses".into()))
}

/// Column metadata recovered from a table's raw `CREATE TABLE` text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnHints {
    /// Logical type from the origin comment (`/*small_integer*/`).
    pub origin: Option<TypeSpec>,
    pub unsigned: bool,
    pub autoincrement: bool,
}

/// Scan a `CREATE TABLE` statement for per-column structured comments and
/// the `AUTOINCREMENT` keyword, keyed by column name.
pub fn scan_column_hints(sql: &str) -> Result<HashMap<String, ColumnHints>> {
    let tokens = tokenize(sql)?;
    let mut hints = HashMap::new();

    let Some(open) = tokens.iter().position(|t| *t == Token::LParen) else {
        return Ok(hints);
    };
    let close = matching_paren(&tokens, open)?;

    for clause in split_top_level(&tokens[open + 1..close]) {
        let Some(first) = clause.first() else {
            continue;
        };
        if CONSTRAINT_KEYWORDS.iter().any(|kw| first.is_keyword(kw)) {
            continue;
        }
        let Some(name) = first.name() else {
            continue;
        };

        let mut hint = ColumnHints::default();
        for token in &clause[1..] {
            match token {
                Token::Comment(body) if body.eq_ignore_ascii_case("unsigned") => hint.unsigned = true,
                Token::Comment(body) if hint.origin.is_none() => {
                    hint.origin = parse_type(body).ok();
                }
                t if t.is_keyword("autoincrement") => hint.autoincrement = true,
                _ => {}
            }
        }
        hints.insert(name.to_string(), hint);
    }
    Ok(hints)
}

/// Parse a DDL script and render it as a migration document.
pub fn ddl_to_migration(sql: &str) -> Result<String> {
    let blueprints = parse_create_tables(sql)?;
    render_document(&blueprints, &DumpOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_top_level_respects_parens() {
        let tokens = tokenize("a decimal(8, 2), b int, PRIMARY KEY (a, b)").unwrap();
        let parts = split_top_level(&tokens);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 7);
        assert!(parts[2][0].is_keyword("primary"));
        assert!(split_top_level(&[]).is_empty());
    }

    #[test]
    fn test_matching_paren() {
        let tokens = tokenize("(a (b) c) d").unwrap();
        assert_eq!(matching_paren(&tokens, 0).unwrap(), 6);
        assert!(matching_paren(&tokens[..5], 0).is_err());
    }

    #[test]
    fn test_scan_column_hints() {
        let sql = r#"CREATE TABLE "users" (
            "id" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            "votes" INTEGER /*small_integer*/ /*unsigned*/ NOT NULL,
            "email" VARCHAR /*string(190)*/ NOT NULL,
            FOREIGN KEY("team_id") REFERENCES "teams"("id")
        )"#;
        let hints = scan_column_hints(sql).unwrap();

        assert!(hints["id"].autoincrement);
        assert!(hints["votes"].unsigned);
        assert_eq!(hints["votes"].origin.as_ref().unwrap().name, "small_integer");
        assert_eq!(hints["email"].origin.as_ref().unwrap().args, ["190"]);
        assert_eq!(hints.len(), 3);
    }
}
