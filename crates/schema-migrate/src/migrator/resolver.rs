//! Locating migration units by name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::document::MigrationDocument;
use super::Migration;
use crate::error::{MigrateError, Result};

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Maps migration names to runnable units.
pub trait MigrationResolver: Send + Sync {
    /// Every known migration name, sorted.
    fn discover(&self, path: &Path) -> Result<Vec<String>>;

    /// Load one migration by name.
    fn resolve(&self, path: &Path, name: &str) -> Result<Arc<dyn Migration>>;
}

/// Resolves `<digits>_<name>.yaml` (or `.yml`) files in a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResolver;

impl FileResolver {
    /// Migration name for a file, if it follows the naming convention.
    pub fn migration_name(file: &Path) -> Option<String> {
        let extension = file.extension()?.to_str()?;
        if !EXTENSIONS.contains(&extension) {
            return None;
        }
        let stem = file.file_stem()?.to_str()?;
        let (prefix, rest) = stem.split_once('_')?;
        let valid = !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty();
        valid.then(|| stem.to_string())
    }

    fn locate(path: &Path, name: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| path.join(format!("{}.{}", name, ext)))
            .find(|candidate| candidate.is_file())
    }

    /// Parse one migration file.
    pub fn load(path: &Path, name: &str) -> Result<MigrationDocument> {
        let file = Self::locate(path, name).ok_or_else(|| {
            MigrateError::resolution(name, format!("no migration file in {}", path.display()))
        })?;
        let content = std::fs::read_to_string(&file)
            .map_err(|e| MigrateError::resolution(name, e.to_string()))?;
        MigrationDocument::from_yaml(&content)
            .map_err(|e| MigrateError::resolution(name, e.to_string()))
    }
}

impl MigrationResolver for FileResolver {
    fn discover(&self, path: &Path) -> Result<Vec<String>> {
        if !path.is_dir() {
            return Err(MigrateError::Config(format!(
                "Migration directory {} does not exist",
                path.display()
            )));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let file = entry?.path();
            if !file.is_file() {
                continue;
            }
            match Self::migration_name(&file) {
                Some(name) => names.push(name),
                None => debug!("Skipping {}", file.display()),
            }
        }
        names.sort();

        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(MigrateError::resolution(
                pair[0].clone(),
                "both .yaml and .yml files exist",
            ));
        }
        Ok(names)
    }

    fn resolve(&self, path: &Path, name: &str) -> Result<Arc<dyn Migration>> {
        Ok(Arc::new(Self::load(path, name)?))
    }
}

/// Code-defined migrations registered by name, falling back to files.
#[derive(Default)]
pub struct Registry {
    migrations: BTreeMap<String, Arc<dyn Migration>>,
    files: FileResolver,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, migration: Arc<dyn Migration>) -> &mut Self {
        self.migrations.insert(name.into(), migration);
        self
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl MigrationResolver for Registry {
    /// Registered names plus files. The directory may be absent when every
    /// migration is registered in code.
    fn discover(&self, path: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = if path.is_dir() || self.migrations.is_empty() {
            self.files.discover(path)?
        } else {
            Vec::new()
        };
        names.extend(self.migrations.keys().cloned());
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn resolve(&self, path: &Path, name: &str) -> Result<Arc<dyn Migration>> {
        match self.migrations.get(name) {
            Some(migration) => Ok(Arc::clone(migration)),
            None => self.files.resolve(path, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMigration;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn make_test_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_migration_name_convention() {
        let name = |f: &str| FileResolver::migration_name(Path::new(f));
        assert_eq!(name("2024_01_01_000000_create_users.yaml").as_deref(), Some("2024_01_01_000000_create_users"));
        assert_eq!(name("1_init.yml").as_deref(), Some("1_init"));
        assert_eq!(name("init.yaml"), None);
        assert_eq!(name("1_.yaml"), None);
        assert_eq!(name("1_init.sql"), None);
        assert_eq!(name("v1_init.yaml"), None);
    }

    #[test]
    fn test_discover_sorts_and_skips_other_files() {
        let dir = make_test_dir(&[
            ("2_posts.yaml", "up: []\n"),
            ("1_users.yml", "up: []\n"),
            ("README.md", "notes"),
        ]);
        let names = FileResolver.discover(dir.path()).unwrap();
        assert_eq!(names, ["1_users", "2_posts"]);
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let err = FileResolver.discover(Path::new("/nonexistent/migrations")).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_duplicate_extensions_are_ambiguous() {
        let dir = make_test_dir(&[("1_users.yml", "up: []\n"), ("1_users.yaml", "up: []\n")]);
        let err = FileResolver.discover(dir.path()).unwrap_err();
        assert!(matches!(err, MigrateError::MigrationResolution { .. }));
    }

    #[test]
    fn test_resolve_errors() {
        let dir = make_test_dir(&[("1_broken.yaml", "up: [[[\n")]);

        let err = FileResolver.resolve(dir.path(), "2_missing").err().unwrap();
        assert!(err.to_string().starts_with("Cannot resolve migration 2_missing"));

        let err = FileResolver.resolve(dir.path(), "1_broken").err().unwrap();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_registry_prefers_registered_units() {
        let dir = make_test_dir(&[("1_users.yaml", "up:\n  - drop: users\n")]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.register("2_seed", Arc::new(RecordingMigration::new("2_seed", calls)));

        assert_eq!(registry.discover(dir.path()).unwrap(), ["1_users", "2_seed"]);
        assert!(registry.resolve(dir.path(), "1_users").is_ok());
        assert!(registry.resolve(dir.path(), "2_seed").is_ok());
        assert_eq!(registry.len(), 1);

        let names = registry.discover(Path::new("/nonexistent/migrations")).unwrap();
        assert_eq!(names, ["2_seed"]);
    }
}
