//! Core abstractions shared by every dialect.
//!
//! - [`column`], [`constraint`]: column, index and foreign-key descriptors
//! - [`blueprint`]: a table change with its ordered command list
//! - [`grammar`]: the per-engine compiler contract
//! - [`traits`]: the connection and introspector seams
//! - [`value`]: rows returned by `select`
//! - [`diff`]: table diffs for engines that rebuild instead of ALTER
//! - [`identifier`]: identifier validation and quoting

pub mod blueprint;
pub mod column;
pub mod constraint;
pub mod diff;
pub mod grammar;
pub mod identifier;
pub mod traits;
pub mod value;

pub use blueprint::{Blueprint, Command};
pub use column::{Column, ColumnType, DefaultValue, ForeignKeyRole};
pub use constraint::{ForeignAction, ForeignKey, Index, IndexKind};
pub use diff::{TableDiff, TableRebuilder};
pub use grammar::{Modifier, SchemaGrammar};
pub use traits::{Connection, Introspector};
pub use value::{Row, Value};
