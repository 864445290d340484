//! Index and foreign-key descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
}

impl IndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Primary => "primary",
            IndexKind::Unique => "unique",
            IndexKind::Index => "index",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An index descriptor. Column order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(rename = "type")]
    pub kind: IndexKind,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Index {
    pub fn new(kind: IndexKind, columns: Vec<String>) -> Self {
        Self {
            kind,
            columns,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit name, or `{table}_{columns}_{kind}` when none was given.
    pub fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => derive_name(table, &self.columns, self.kind.as_str()),
        }
    }

    /// Forget a catalog name that is identical to the derived one.
    pub fn normalize_name(&mut self, table: &str) {
        if self.kind == IndexKind::Primary
            || self.name.as_deref() == Some(&derive_name(table, &self.columns, self.kind.as_str()))
        {
            self.name = None;
        }
    }
}

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ForeignAction::NoAction => "NO ACTION",
            ForeignAction::Restrict => "RESTRICT",
            ForeignAction::Cascade => "CASCADE",
            ForeignAction::SetNull => "SET NULL",
            ForeignAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Canonicalize a rule name as reported by a catalog (`CASCADE`,
    /// `SET NULL`, `NO ACTION`, ...).
    pub fn from_rule(rule: &str) -> Option<Self> {
        let normalized = rule.trim().to_ascii_uppercase().replace('_', " ");
        match normalized.as_str() {
            "NO ACTION" => Some(ForeignAction::NoAction),
            "RESTRICT" => Some(ForeignAction::Restrict),
            "CASCADE" => Some(ForeignAction::Cascade),
            "SET NULL" => Some(ForeignAction::SetNull),
            "SET DEFAULT" => Some(ForeignAction::SetDefault),
            _ => None,
        }
    }

    /// Postgres `confupdtype` / `confdeltype` codes.
    pub fn from_pg_code(code: &str) -> Option<Self> {
        match code.trim() {
            "a" => Some(ForeignAction::NoAction),
            "r" => Some(ForeignAction::Restrict),
            "c" => Some(ForeignAction::Cascade),
            "n" => Some(ForeignAction::SetNull),
            "d" => Some(ForeignAction::SetDefault),
            _ => None,
        }
    }

    /// Engine defaults are not worth re-emitting.
    pub fn explicit(action: Option<Self>) -> Option<Self> {
        action.filter(|a| !matches!(a, ForeignAction::NoAction | ForeignAction::Restrict))
    }
}

/// A foreign-key descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    /// Referenced table.
    pub on: String,
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ForeignAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ForeignKey {
    pub fn new(columns: Vec<String>, on: impl Into<String>, references: Vec<String>) -> Self {
        Self {
            columns,
            on: on.into(),
            references,
            on_delete: None,
            on_update: None,
            name: None,
        }
    }

    pub fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => derive_name(table, &self.columns, "foreign"),
        }
    }

    pub fn normalize_name(&mut self, table: &str) {
        if self.name.as_deref() == Some(&derive_name(table, &self.columns, "foreign")) {
            self.name = None;
        }
    }
}

/// `{table}_{col1}_{col2}_{suffix}`, lower-cased with `-` and `.` replaced.
pub fn derive_name(table: &str, columns: &[String], suffix: &str) -> String {
    format!("{}_{}_{}", table, columns.join("_"), suffix)
        .to_lowercase()
        .replace(['-', '.'], "_")
}
