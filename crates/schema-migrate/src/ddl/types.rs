//! Physical type strings (`int(10) unsigned`, `enum('a','b')`) and the
//! mapping from MySQL-family names to logical column types.

use crate::core::column::{Column, ColumnType};
use crate::ddl::lexer::{tokenize, Token};
use crate::error::{MigrateError, Result};

/// A parsed type clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    /// Lower-cased type name.
    pub name: String,
    pub args: Vec<String>,
    pub unsigned: bool,
}

impl TypeSpec {
    fn arg(&self, i: usize) -> Option<u32> {
        self.args.get(i).and_then(|a| a.trim().parse().ok())
    }
}

/// Parse a complete type string such as a MySQL `COLUMN_TYPE` value.
pub fn parse_type(text: &str) -> Result<TypeSpec> {
    let tokens = tokenize(text)?;
    let mut pos = 0;
    let spec = read_type(&tokens, &mut pos)?;
    if let Some(extra) = tokens.get(pos) {
        return Err(MigrateError::unknown_token(extra.text(), format!("type '{}'", text)));
    }
    Ok(spec)
}

/// Read `name [(args)] [unsigned] [zerofill]` starting at `pos`.
pub fn read_type(tokens: &[Token], pos: &mut usize) -> Result<TypeSpec> {
    let name = match tokens.get(*pos) {
        Some(Token::Word(w)) => w.to_ascii_lowercase(),
        Some(other) => return Err(MigrateError::unknown_token(other.text(), "type name")),
        None => return Err(MigrateError::BadMatch("missing type name".into())),
    };
    *pos += 1;

    let mut args = Vec::new();
    if tokens.get(*pos) == Some(&Token::LParen) {
        *pos += 1;
        loop {
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    break;
                }
                Some(Token::Comma) => *pos += 1,
                Some(Token::Number(n)) | Some(Token::Str(n)) | Some(Token::Word(n)) => {
                    args.push(n.clone());
                    *pos += 1;
                }
                Some(other) => {
                    return Err(MigrateError::unknown_token(other.text(), format!("{} arguments", name)))
                }
                None => {
                    return Err(MigrateError::BadMatch(format!("unclosed arguments for {}", name)))
                }
            }
        }
    }

    let mut unsigned = false;
    while let Some(token) = tokens.get(*pos) {
        if token.is_keyword("unsigned") {
            unsigned = true;
        } else if !token.is_keyword("zerofill") {
            break;
        }
        *pos += 1;
    }

    Ok(TypeSpec { name, args, unsigned })
}

/// Apply a MySQL-family physical type to a column. Returns false when the
/// type has no logical counterpart.
///
/// Integer display widths are dropped; `tinyint(1)` reads as boolean.
pub fn apply_mysql_type(column: &mut Column, spec: &TypeSpec) -> bool {
    let kind = match spec.name.as_str() {
        "bigint" => ColumnType::BigInteger,
        "int" | "integer" => ColumnType::Integer,
        "mediumint" => ColumnType::MediumInteger,
        "smallint" => ColumnType::SmallInteger,
        "tinyint" if spec.arg(0) == Some(1) => ColumnType::Boolean,
        "tinyint" => ColumnType::TinyInteger,
        "bool" | "boolean" => ColumnType::Boolean,
        "varchar" => ColumnType::String,
        "char" => ColumnType::Char,
        "text" | "tinytext" => ColumnType::Text,
        "mediumtext" => ColumnType::MediumText,
        "longtext" => ColumnType::LongText,
        "decimal" | "numeric" => ColumnType::Decimal,
        "float" => ColumnType::Float,
        "double" | "real" => ColumnType::Double,
        "enum" => ColumnType::Enum,
        "json" => ColumnType::Json,
        "date" => ColumnType::Date,
        "datetime" => ColumnType::DateTime,
        "timestamp" => ColumnType::Timestamp,
        "time" => ColumnType::Time,
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            ColumnType::Binary
        }
        _ => return false,
    };
    column.kind = kind;
    column.unsigned = spec.unsigned && kind.is_numeric() && kind != ColumnType::Boolean;
    apply_args(column, spec);
    true
}

/// Apply a logical type recorded in a structured comment, e.g.
/// `string(255)` or `enum('a','b')`.
pub fn apply_origin_type(column: &mut Column, spec: &TypeSpec) -> bool {
    match spec.name.parse::<ColumnType>() {
        Ok(kind) => {
            column.kind = kind;
            apply_args(column, spec);
            true
        }
        Err(_) => false,
    }
}

fn apply_args(column: &mut Column, spec: &TypeSpec) {
    column.length = None;
    column.precision = None;
    column.scale = None;
    column.allowed.clear();
    match column.kind {
        ColumnType::String | ColumnType::Char => column.length = spec.arg(0),
        ColumnType::Decimal | ColumnType::Float | ColumnType::Double => {
            column.precision = spec.arg(0);
            column.scale = spec.arg(1);
        }
        ColumnType::Enum => column.allowed = spec.args.clone(),
        _ => {}
    }
}
