//! Error types for the schema migration library.

use thiserror::Error;

use crate::drivers::Dialect;

/// Main error type for schema compilation, introspection and migration runs.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blueprint command has no compiler for the target dialect
    #[error("{dialect} grammar cannot compile '{verb}'")]
    Compilation { dialect: Dialect, verb: String },

    /// A column definition violates the blueprint invariants
    #[error("Invalid column {column}: {message}")]
    InvalidColumn { column: String, message: String },

    /// The DDL tokenizer or parser met something it does not understand
    #[error("Unknown token '{token}' in {context}")]
    UnknownToken { token: String, context: String },

    /// Input was not the statement shape the parser expects
    #[error("Parse error: {0}")]
    BadMatch(String),

    /// Introspected metadata does not map to a known logical type
    #[error("Table {table}: column {column} has unsupported type '{physical}'")]
    CatalogMismatch {
        table: String,
        column: String,
        physical: String,
    },

    /// Introspection found no columns for a table
    #[error("Table {0} not found")]
    TableNotFound(String),

    /// A named migration could not be found or loaded
    #[error("Cannot resolve migration {name}: {reason}")]
    MigrationResolution { name: String, reason: String },

    /// The up/down step of a migration failed
    #[error("Migration {migration} failed")]
    StepExecution {
        migration: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Driver level database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A statement failed, with the SQL that caused it
    #[error("Query failed: {message}\n  SQL: {sql}")]
    Query { sql: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Compilation error for a verb the dialect cannot express.
    pub fn unsupported(dialect: Dialect, verb: impl Into<String>) -> Self {
        MigrateError::Compilation {
            dialect,
            verb: verb.into(),
        }
    }

    /// Create an InvalidColumn error
    pub fn invalid_column(column: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::InvalidColumn {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an UnknownToken error
    pub fn unknown_token(token: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::UnknownToken {
            token: token.into(),
            context: context.into(),
        }
    }

    /// Create a MigrationResolution error
    pub fn resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        MigrateError::MigrationResolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a Query error keeping the failing SQL
    pub fn query(sql: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Query {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an error raised by a migration's up or down step
    pub fn step(migration: impl Into<String>, source: MigrateError) -> Self {
        MigrateError::StepExecution {
            migration: migration.into(),
            source: Box::new(source),
        }
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => 1,
            MigrateError::Database(_) | MigrateError::Query { .. } => 2,
            MigrateError::Compilation { .. } | MigrateError::InvalidColumn { .. } => 3,
            MigrateError::UnknownToken { .. } | MigrateError::BadMatch(_) => 4,
            MigrateError::CatalogMismatch { .. } | MigrateError::TableNotFound(_) => 5,
            MigrateError::MigrationResolution { .. } | MigrateError::StepExecution { .. } => 6,
            MigrateError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
