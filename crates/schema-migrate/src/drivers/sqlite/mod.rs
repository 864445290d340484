//! SQLite driver.
//!
//! SQLite stores few physical types, so the grammar records each column's
//! logical type in a `/*...*/` comment inside the `CREATE TABLE` text and
//! the introspector reads it back through the DDL lexer. Column removal and
//! retyping go through [`SqliteRebuilder`].

mod grammar;
mod introspect;
mod rebuild;

pub use grammar::SqliteGrammar;
pub use introspect::SqliteIntrospector;
pub use rebuild::SqliteRebuilder;
