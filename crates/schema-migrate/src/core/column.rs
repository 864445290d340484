//! Column descriptors: logical types, defaults and modifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::constraint::ForeignAction;
use crate::error::{MigrateError, Result};

/// Default length for string and char columns.
pub const DEFAULT_STRING_LENGTH: u32 = 255;

/// Logical column type, independent of any engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    BigInteger,
    Integer,
    MediumInteger,
    SmallInteger,
    TinyInteger,
    String,
    Char,
    Text,
    MediumText,
    LongText,
    Decimal,
    Float,
    Double,
    Boolean,
    Enum,
    Json,
    Date,
    DateTime,
    Timestamp,
    Time,
    Binary,
}

impl ColumnType {
    pub const ALL: [ColumnType; 21] = [
        ColumnType::BigInteger,
        ColumnType::Integer,
        ColumnType::MediumInteger,
        ColumnType::SmallInteger,
        ColumnType::TinyInteger,
        ColumnType::String,
        ColumnType::Char,
        ColumnType::Text,
        ColumnType::MediumText,
        ColumnType::LongText,
        ColumnType::Decimal,
        ColumnType::Float,
        ColumnType::Double,
        ColumnType::Boolean,
        ColumnType::Enum,
        ColumnType::Json,
        ColumnType::Date,
        ColumnType::DateTime,
        ColumnType::Timestamp,
        ColumnType::Time,
        ColumnType::Binary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::BigInteger => "big_integer",
            ColumnType::Integer => "integer",
            ColumnType::MediumInteger => "medium_integer",
            ColumnType::SmallInteger => "small_integer",
            ColumnType::TinyInteger => "tiny_integer",
            ColumnType::String => "string",
            ColumnType::Char => "char",
            ColumnType::Text => "text",
            ColumnType::MediumText => "medium_text",
            ColumnType::LongText => "long_text",
            ColumnType::Decimal => "decimal",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::Enum => "enum",
            ColumnType::Json => "json",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Time => "time",
            ColumnType::Binary => "binary",
        }
    }

    /// Whether the type belongs to the integer family.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnType::BigInteger
                | ColumnType::Integer
                | ColumnType::MediumInteger
                | ColumnType::SmallInteger
                | ColumnType::TinyInteger
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer()
            || matches!(
                self,
                ColumnType::Decimal | ColumnType::Float | ColumnType::Double | ColumnType::Boolean
            )
    }

    pub fn is_string(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Char)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnType::DateTime | ColumnType::Timestamp)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "big_integer" | "big_int" | "bigint" => ColumnType::BigInteger,
            "integer" | "int" => ColumnType::Integer,
            "medium_integer" | "medium_int" => ColumnType::MediumInteger,
            "small_integer" | "small_int" => ColumnType::SmallInteger,
            "tiny_integer" | "tiny_int" => ColumnType::TinyInteger,
            "string" => ColumnType::String,
            "char" => ColumnType::Char,
            "text" => ColumnType::Text,
            "medium_text" => ColumnType::MediumText,
            "long_text" => ColumnType::LongText,
            "decimal" => ColumnType::Decimal,
            "float" => ColumnType::Float,
            "double" => ColumnType::Double,
            "boolean" | "bool" => ColumnType::Boolean,
            "enum" => ColumnType::Enum,
            "json" => ColumnType::Json,
            "date" => ColumnType::Date,
            "datetime" => ColumnType::DateTime,
            "timestamp" => ColumnType::Timestamp,
            "time" => ColumnType::Time,
            "binary" => ColumnType::Binary,
            other => {
                return Err(MigrateError::Config(format!(
                    "Unknown column type: '{}'",
                    other
                )))
            }
        };
        Ok(ty)
    }
}

/// A column default.
///
/// `Raw` is an SQL expression emitted verbatim (`CURRENT_DATE`), the other
/// variants are literals quoted by the grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DefaultRepr", into = "DefaultRepr")]
pub enum DefaultValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Raw(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DefaultRepr {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Raw { raw: String },
}

impl From<DefaultRepr> for DefaultValue {
    fn from(repr: DefaultRepr) -> Self {
        match repr {
            DefaultRepr::Bool(b) => DefaultValue::Bool(b),
            DefaultRepr::Integer(i) => DefaultValue::Integer(i),
            DefaultRepr::Float(f) => DefaultValue::Float(f),
            DefaultRepr::Text(s) => DefaultValue::Text(s),
            DefaultRepr::Raw { raw } => DefaultValue::Raw(raw),
        }
    }
}

impl From<DefaultValue> for DefaultRepr {
    fn from(value: DefaultValue) -> Self {
        match value {
            DefaultValue::Bool(b) => DefaultRepr::Bool(b),
            DefaultValue::Integer(i) => DefaultRepr::Integer(i),
            DefaultValue::Float(f) => DefaultRepr::Float(f),
            DefaultValue::Text(s) => DefaultRepr::Text(s),
            DefaultValue::Raw(raw) => DefaultRepr::Raw { raw },
        }
    }
}

impl DefaultValue {
    /// Interpret a literal read back from a catalog or DDL text.
    ///
    /// On numeric columns digit strings become integers and decimal strings
    /// become floats. Boolean columns accept `0/1/true/false`. Everything
    /// else stays text.
    pub fn from_literal(literal: &str, kind: ColumnType) -> Self {
        if kind == ColumnType::Boolean {
            match literal.to_ascii_lowercase().as_str() {
                "1" | "true" | "t" => return DefaultValue::Bool(true),
                "0" | "false" | "f" => return DefaultValue::Bool(false),
                _ => {}
            }
        }
        if !kind.is_numeric() {
            return DefaultValue::Text(literal.to_string());
        }
        if is_integer_literal(literal) {
            if let Ok(i) = literal.parse() {
                return DefaultValue::Integer(i);
            }
        }
        if is_decimal_literal(literal) {
            if let Ok(f) = literal.parse() {
                return DefaultValue::Float(f);
            }
        }
        DefaultValue::Text(literal.to_string())
    }
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    match digits.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

impl From<i64> for DefaultValue {
    fn from(i: i64) -> Self {
        DefaultValue::Integer(i)
    }
}

impl From<i32> for DefaultValue {
    fn from(i: i32) -> Self {
        DefaultValue::Integer(i64::from(i))
    }
}

impl From<f64> for DefaultValue {
    fn from(f: f64) -> Self {
        DefaultValue::Float(f)
    }
}

impl From<&str> for DefaultValue {
    fn from(s: &str) -> Self {
        DefaultValue::Text(s.to_string())
    }
}

impl From<bool> for DefaultValue {
    fn from(b: bool) -> Self {
        DefaultValue::Bool(b)
    }
}

/// Marks a column as the local side of a single-column foreign key.
///
/// Rendering and compilation branch on its presence: the column is dumped
/// in the foreign-key priority slot and compiles to an implied `foreign`
/// command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRole {
    /// Referenced table.
    pub on: String,
    /// Referenced column.
    pub references: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ForeignAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColumnSpec", into = "ColumnSpec")]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub allowed: Vec<String>,
    pub nullable: bool,
    pub unsigned: bool,
    pub auto_increment: bool,
    pub use_current: bool,
    pub default: Option<DefaultValue>,
    /// Retype an existing column instead of adding a new one.
    pub change: bool,
    pub foreign: Option<ForeignKeyRole>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            length: None,
            precision: None,
            scale: None,
            allowed: Vec::new(),
            nullable: false,
            unsigned: false,
            auto_increment: false,
            use_current: false,
            default: None,
            change: false,
            foreign: None,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    pub fn default(&mut self, value: impl Into<DefaultValue>) -> &mut Self {
        self.default = Some(value.into());
        self
    }

    /// Default to a raw SQL expression.
    pub fn default_raw(&mut self, expression: impl Into<String>) -> &mut Self {
        self.default = Some(DefaultValue::Raw(expression.into()));
        self
    }

    pub fn use_current(&mut self) -> &mut Self {
        self.use_current = true;
        self
    }

    pub fn change(&mut self) -> &mut Self {
        self.change = true;
        self
    }

    /// Tag the column as referencing `on.references`.
    pub fn references(&mut self, on: impl Into<String>, references: impl Into<String>) -> &mut Self {
        self.foreign = Some(ForeignKeyRole {
            on: on.into(),
            references: references.into(),
            on_delete: None,
            on_update: None,
            name: None,
        });
        self
    }

    pub fn on_delete(&mut self, action: ForeignAction) -> &mut Self {
        if let Some(role) = self.foreign.as_mut() {
            role.on_delete = Some(action);
        }
        self
    }

    pub fn on_update(&mut self, action: ForeignAction) -> &mut Self {
        if let Some(role) = self.foreign.as_mut() {
            role.on_update = Some(action);
        }
        self
    }

    /// Effective length for string-like columns.
    pub fn string_length(&self) -> u32 {
        self.length.unwrap_or(DEFAULT_STRING_LENGTH)
    }

    /// Check the descriptor invariants.
    pub fn validate(&self) -> Result<()> {
        if self.auto_increment && !self.kind.is_integer() {
            return Err(MigrateError::invalid_column(
                &self.name,
                format!("auto-increment requires an integer type, got {}", self.kind),
            ));
        }
        if self.auto_increment && self.nullable {
            return Err(MigrateError::invalid_column(
                &self.name,
                "auto-increment column cannot be nullable",
            ));
        }
        if self.kind == ColumnType::Enum && self.allowed.is_empty() {
            return Err(MigrateError::invalid_column(
                &self.name,
                "enum requires at least one allowed value",
            ));
        }
        Ok(())
    }
}

/// Document form of a column. `increments` and `big_increments` are
/// shorthand for an auto-incrementing integer.
#[derive(Serialize, Deserialize)]
struct ColumnSpec {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    allowed: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    nullable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    unsigned: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    auto_increment: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    use_current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<DefaultValue>,
    #[serde(default, skip_serializing_if = "is_false")]
    change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    foreign: Option<ForeignKeyRole>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TryFrom<ColumnSpec> for Column {
    type Error = MigrateError;

    fn try_from(spec: ColumnSpec) -> Result<Self> {
        let (kind, increments) = match spec.kind.as_str() {
            "increments" => (ColumnType::Integer, true),
            "big_increments" => (ColumnType::BigInteger, true),
            other => (other.parse()?, false),
        };
        Ok(Column {
            name: spec.name,
            kind,
            length: spec.length,
            precision: spec.precision,
            scale: spec.scale,
            allowed: spec.allowed,
            nullable: spec.nullable,
            unsigned: spec.unsigned,
            auto_increment: spec.auto_increment || increments,
            use_current: spec.use_current,
            default: spec.default,
            change: spec.change,
            foreign: spec.foreign,
        })
    }
}

impl From<Column> for ColumnSpec {
    fn from(column: Column) -> Self {
        let (kind, auto_increment) = match (column.kind, column.auto_increment) {
            (ColumnType::Integer, true) => ("increments".to_string(), false),
            (ColumnType::BigInteger, true) => ("big_increments".to_string(), false),
            (kind, auto) => (kind.name().to_string(), auto),
        };
        ColumnSpec {
            name: column.name,
            kind,
            length: column.length,
            precision: column.precision,
            scale: column.scale,
            allowed: column.allowed,
            nullable: column.nullable,
            unsigned: column.unsigned,
            auto_increment,
            use_current: column.use_current,
            default: column.default,
            change: column.change,
            foreign: column.foreign,
        }
    }
}
