//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::drivers::Dialect;
use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a bare connection URL, as given on the command line.
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let config = Config {
            database: DatabaseConfig {
                url: Some(url.into()),
                ..Default::default()
            },
            migrations: MigrationsConfig::default(),
            dump: Default::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl DatabaseConfig {
    /// The configured engine, from `driver` or else the URL scheme.
    pub fn dialect(&self) -> Result<Dialect> {
        match (&self.driver, &self.url) {
            (Some(driver), _) => Dialect::from_db_type(driver),
            (None, Some(url)) => Dialect::from_url(url),
            (None, None) => Err(MigrateError::Config(
                "database.driver is required when database.url is not set".into(),
            )),
        }
    }

    /// Build a connection URL for sqlx.
    pub fn url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let dialect = self.dialect()?;
        let database = self
            .database
            .as_deref()
            .ok_or_else(|| MigrateError::Config("database.database is required".into()))?;
        if dialect == Dialect::Sqlite {
            return Ok(format!("sqlite://{}", database));
        }

        let host = self.host.as_deref().unwrap_or("localhost");
        let port = self.port.unwrap_or(match dialect {
            Dialect::MySql => 3306,
            _ => 5432,
        });
        let credentials = match (&self.user, &self.password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        Ok(format!(
            "{}://{}{}:{}/{}",
            dialect.name(),
            credentials,
            host,
            port,
            database
        ))
    }
}
