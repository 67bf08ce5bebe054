//! Error types for the mapper.

use crate::{driver::DriverError, Document, TableName};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

/// All possible errors from the mapper.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Usage errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    // Store outcomes
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ConditionFailed(Box<ConditionFailure>),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Returns the condition failure details if this is a `ConditionFailed`.
    pub fn condition_failure(&self) -> Option<&ConditionFailure> {
        match self {
            Error::ConditionFailed(failure) => Some(failure),
            _ => None,
        }
    }

    /// True if a precondition rejected the write.
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Error::ConditionFailed(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<DriverError> for Error {
    /// Context-free mapping. Callers that know the table decode condition
    /// failures themselves before falling back to this.
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::TableNotFound(name) => Error::NotFound(format!("table '{}'", name)),
            DriverError::ConditionalCheckFailed { .. } => {
                Error::ConditionFailed(Box::new(ConditionFailure::new("")))
            }
            DriverError::TransactionCanceled { .. } => {
                Error::Transport("transaction canceled".to_string())
            }
            DriverError::Validation(msg) => Error::Transport(format!("rejected by store: {}", msg)),
            DriverError::Transport(msg) => Error::Transport(msg),
        }
    }
}

/// A write precondition that did not hold.
///
/// For transactions `operation` is the index of the rejected operation in
/// the order it was added to the builder. `prior` is only populated when the
/// operation asked for its prior value on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionFailure {
    pub table: TableName,
    pub operation: Option<usize>,
    pub prior: Option<Document>,
}

impl ConditionFailure {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            operation: None,
            prior: None,
        }
    }

    /// Decode the prior value into a record type.
    pub fn prior_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.prior
            .as_ref()
            .map(|doc| serde_json::from_value(serde_json::Value::Object(doc.clone())))
            .transpose()
            .map_err(Error::from)
    }
}

impl fmt::Display for ConditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition failed on table '{}'", self.table)?;
        if let Some(index) = self.operation {
            write!(f, " (operation {})", index)?;
        }
        Ok(())
    }
}

/// Result type for mapper operations.
pub type Result<T> = std::result::Result<T, Error>;
