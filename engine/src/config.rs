//! Store configuration loaded from the environment.

use crate::Error;
use std::env;

/// Which dialect to open and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Registered dialect name
    pub dialect: String,
    /// Dialect-specific connection descriptor
    pub connection: String,
}

impl StoreConfig {
    pub fn new(dialect: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            connection: connection.into(),
        }
    }

    /// Load from `ODM_DIALECT` and `ODM_CONNECTION`, reading a `.env` file
    /// first if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let dialect = lookup("ODM_DIALECT")
            .filter(|d| !d.trim().is_empty())
            .ok_or(ConfigError::MissingDialect)?;

        let connection = lookup("ODM_CONNECTION").unwrap_or_default();

        Ok(Self {
            dialect: dialect.trim().to_string(),
            connection,
        })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("ODM_DIALECT environment variable is required")]
    MissingDialect,
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
