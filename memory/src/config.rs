//! Connection descriptor for the in-memory dialect.
//!
//! The descriptor is a `;`-separated list of `Key=Value` pairs, for example
//! `BatchCapacity=2;TransactionLimit=10`. Keys are case-insensitive. An
//! empty descriptor selects the defaults.

use std::str::FromStr;

/// Items a batch call processes before handing the rest back (default)
pub const DEFAULT_BATCH_CAPACITY: usize = usize::MAX;
pub const DEFAULT_BATCH_GET_LIMIT: usize = 100;
pub const DEFAULT_BATCH_WRITE_LIMIT: usize = 25;
pub const DEFAULT_TRANSACTION_LIMIT: usize = 100;

/// Limits of one in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Items processed per batch call; the rest come back unprocessed
    pub batch_capacity: usize,
    /// Keys a single batch get may request
    pub batch_get_limit: usize,
    /// Writes a single batch write may request
    pub batch_write_limit: usize,
    /// Operations per transaction
    pub transaction_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            batch_get_limit: DEFAULT_BATCH_GET_LIMIT,
            batch_write_limit: DEFAULT_BATCH_WRITE_LIMIT,
            transaction_limit: DEFAULT_TRANSACTION_LIMIT,
        }
    }
}

impl MemoryConfig {
    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn parse(descriptor: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for pair in descriptor.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedPair(pair.to_string()))?;
            let key = key.trim();
            let slot = match key.to_ascii_lowercase().as_str() {
                "batchcapacity" => &mut config.batch_capacity,
                "batchgetlimit" => &mut config.batch_get_limit,
                "batchwritelimit" => &mut config.batch_write_limit,
                "transactionlimit" => &mut config.transaction_limit,
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            };
            *slot = parse_limit(key, value.trim())?;
        }

        Ok(config)
    }
}

impl FromStr for MemoryConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_limit(key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
        Ok(n) => Ok(n),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("expected Key=Value, got '{0}'")]
    MalformedPair(String),

    #[error("unknown descriptor key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for '{key}': expected a positive integer")]
    InvalidValue { key: String, value: String },
}
