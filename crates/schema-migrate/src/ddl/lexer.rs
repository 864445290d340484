//! Tokenizer for `CREATE TABLE` text and catalog type strings.

use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare word or keyword, original case.
    Word(String),
    /// Back-tick or double-quoted identifier, quotes removed.
    Ident(String),
    /// Single-quoted string literal, unescaped.
    Str(String),
    Number(String),
    /// Block comment body, trimmed.
    Comment(String),
    LParen,
    RParen,
    Comma,
    Semicolon,
    Symbol(char),
}

impl Token {
    /// Case-insensitive keyword match.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    /// Identifier text for quoted or bare names.
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::Word(w) | Token::Ident(w) => Some(w),
            _ => None,
        }
    }

    /// Source-like rendering, used in error messages and raw defaults.
    pub fn text(&self) -> String {
        match self {
            Token::Word(w) | Token::Number(w) => w.clone(),
            Token::Ident(i) => format!("`{}`", i),
            Token::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Token::Comment(c) => format!("/*{}*/", c),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
            Token::Semicolon => ";".into(),
            Token::Symbol(c) => c.to_string(),
        }
    }
}

/// Split SQL text into tokens. Line comments are dropped, block comments
/// are kept because they carry column metadata in SQLite DDL.
pub fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = i + 2;
                let end = (start..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
                    .ok_or_else(|| MigrateError::unknown_token("/*", "unterminated comment"))?;
                let body: String = chars[start..end].iter().collect();
                tokens.push(Token::Comment(body.trim().to_string()));
                i = end + 2;
            }
            '`' | '"' => {
                let (text, next) = read_quoted(&chars, i, c, false)?;
                tokens.push(Token::Ident(text));
                i = next;
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i, c, true)?;
                tokens.push(Token::Str(text));
                i = next;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => {
                tokens.push(Token::Symbol(other));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted run starting at `start`. A doubled quote is an escaped
/// quote; string literals also honour MySQL backslash escapes.
fn read_quoted(chars: &[char], start: usize, quote: char, backslash: bool) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash && c == '\\' && i + 1 < chars.len() {
            out.push(match chars[i + 1] {
                'n' => '\n',
                't' => '\t',
                '0' => '\0',
                other => other,
            });
            i += 2;
            continue;
        }
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(c);
        i += 1;
    }
    Err(MigrateError::unknown_token(
        quote.to_string(),
        "unterminated quoted text",
    ))
}
