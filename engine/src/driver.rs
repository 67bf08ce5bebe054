//! Driver boundary.
//!
//! A driver owns the connection to a concrete store and executes fully
//! marshaled requests. The mapper never talks to a store any other way.

use crate::{ExpressionAttributes, Item, TableName, TableSchema};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Which image of the item a write should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    AllNew,
    UpdatedOld,
    UpdatedNew,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutRequest {
    pub table: TableName,
    pub item: Item,
    pub condition: Option<String>,
    pub attributes: ExpressionAttributes,
    pub return_values: ReturnValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRequest {
    pub table: TableName,
    pub key: Item,
    pub consistent: bool,
    pub projection: Option<String>,
    pub attributes: ExpressionAttributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub table: TableName,
    pub key: Item,
    pub update_expression: String,
    pub condition: Option<String>,
    pub attributes: ExpressionAttributes,
    pub return_values: ReturnValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub table: TableName,
    pub key: Item,
    pub condition: Option<String>,
    pub attributes: ExpressionAttributes,
    pub return_values: ReturnValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: TableName,
    pub key_condition: String,
    pub filter: Option<String>,
    pub projection: Option<String>,
    pub attributes: ExpressionAttributes,
    pub consistent: bool,
    pub limit: Option<usize>,
    pub index_name: Option<String>,
    pub descending: bool,
    pub exclusive_start_key: Option<Item>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    /// Set only when more items remain
    pub last_evaluated_key: Option<Item>,
}

/// Keys to read from one table in a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeysAndAttributes {
    pub keys: Vec<Item>,
    pub consistent: bool,
    pub projection: Option<String>,
    pub attributes: ExpressionAttributes,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetRequest {
    /// One entry per table, in request order
    pub tables: Vec<(TableName, KeysAndAttributes)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    pub responses: BTreeMap<TableName, Vec<Item>>,
    pub unprocessed: Vec<(TableName, KeysAndAttributes)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(Item),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteRequest {
    pub tables: Vec<(TableName, Vec<WriteRequest>)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<(TableName, Vec<WriteRequest>)>,
}

/// One operation of an atomic write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactWriteItem {
    ConditionCheck {
        table: TableName,
        key: Item,
        condition: String,
        attributes: ExpressionAttributes,
        return_on_failure: bool,
    },
    Put {
        table: TableName,
        item: Item,
        condition: Option<String>,
        attributes: ExpressionAttributes,
        return_on_failure: bool,
    },
    Update {
        table: TableName,
        key: Item,
        update_expression: String,
        condition: Option<String>,
        attributes: ExpressionAttributes,
        return_on_failure: bool,
    },
    Delete {
        table: TableName,
        key: Item,
        condition: Option<String>,
        attributes: ExpressionAttributes,
        return_on_failure: bool,
    },
}

impl TransactWriteItem {
    pub fn table(&self) -> &str {
        match self {
            TransactWriteItem::ConditionCheck { table, .. }
            | TransactWriteItem::Put { table, .. }
            | TransactWriteItem::Update { table, .. }
            | TransactWriteItem::Delete { table, .. } => table,
        }
    }
}

/// One read of an atomic multi-get.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactGetItem {
    pub table: TableName,
    pub key: Item,
    pub projection: Option<String>,
    pub attributes: ExpressionAttributes,
}

/// Why an operation of a cancelled transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationCode {
    /// The operation itself was fine
    None,
    ConditionalCheckFailed,
    ValidationError,
    TransactionConflict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationReason {
    pub code: CancellationCode,
    pub message: Option<String>,
    /// Item as it was before, when the operation asked for it
    pub item: Option<Item>,
}

impl CancellationReason {
    pub fn ok() -> Self {
        Self {
            code: CancellationCode::None,
            message: None,
            item: None,
        }
    }
}

/// Errors reported by a driver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("table not found: {0}")]
    TableNotFound(TableName),

    #[error("conditional check failed")]
    ConditionalCheckFailed { item: Option<Item> },

    #[error("transaction canceled")]
    TransactionCanceled { reasons: Vec<CancellationReason> },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result type for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A connection to a concrete store. Calls are synchronous.
pub trait Driver: Send + Sync {
    /// Dialect name used to resolve per-dialect field names.
    fn dialect(&self) -> &str;

    /// Fails with `TableNotFound` when the table does not exist.
    fn describe_table(&self, name: &str) -> DriverResult<TableSchema>;

    fn create_table_if_absent(&self, schema: &TableSchema) -> DriverResult<()>;

    /// Returns the prior item when asked for `AllOld`.
    fn put_item(&self, request: PutRequest) -> DriverResult<Option<Item>>;

    /// `None` when no item has the key.
    fn get_item(&self, request: GetRequest) -> DriverResult<Option<Item>>;

    fn update_item(&self, request: UpdateRequest) -> DriverResult<Option<Item>>;

    fn delete_item(&self, request: DeleteRequest) -> DriverResult<Option<Item>>;

    fn query(&self, request: QueryRequest) -> DriverResult<QueryOutput>;

    fn batch_get(&self, request: BatchGetRequest) -> DriverResult<BatchGetOutput>;

    fn batch_write(&self, request: BatchWriteRequest) -> DriverResult<BatchWriteOutput>;

    /// All or nothing. A rejected set fails with `TransactionCanceled`
    /// carrying one reason per operation.
    fn transact_write(&self, items: Vec<TransactWriteItem>) -> DriverResult<()>;

    fn transact_get(&self, items: Vec<TransactGetItem>) -> DriverResult<Vec<Option<Item>>>;
}

/// Opens drivers of one dialect from a connection descriptor.
pub trait DriverOpener: Send + Sync {
    fn open(&self, descriptor: &str) -> DriverResult<Arc<dyn Driver>>;
}
