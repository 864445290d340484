//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresGrammar`]: DDL compilation with serial types and `CHECK`-based enums
//! - [`PostgresIntrospector`]: `information_schema` and `pg_catalog` reader
//!
//! Catalog queries cast every column to `text`/`int4` so rows decode the
//! same way regardless of the catalog's internal types.

mod grammar;
mod introspect;

pub use grammar::PostgresGrammar;
pub use introspect::PostgresIntrospector;
