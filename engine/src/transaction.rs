//! Transaction coordinator.
//!
//! A [`Transaction`] collects either writes (checks, puts, updates, deletes)
//! or reads, never both, and submits them in one driver call. Writes are all
//! or nothing: if any precondition fails nothing is applied and the error
//! names the operation that failed, by its position in the builder.

use crate::{
    driver::{CancellationCode, CancellationReason, DriverError, TransactGetItem, TransactWriteItem},
    error::Result,
    record, ConditionFailure, ConditionSpec, Document, Error, ExpressionAttributes, Key, Record,
    Store, TableName, TableSchema,
};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// What a failed operation reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnOnFailure {
    #[default]
    None,
    /// Include the item as it was before the transaction
    PriorValue,
}

/// One write of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOp {
    ConditionCheck {
        table: TableName,
        key: Key,
        condition: ConditionSpec,
        on_failure: ReturnOnFailure,
    },
    Put {
        table: TableName,
        item: Document,
        condition: Option<ConditionSpec>,
        on_failure: ReturnOnFailure,
    },
    Update {
        table: TableName,
        key: Key,
        update_expression: String,
        params: Option<ConditionSpec>,
        on_failure: ReturnOnFailure,
    },
    Delete {
        table: TableName,
        key: Key,
        condition: Option<ConditionSpec>,
        on_failure: ReturnOnFailure,
    },
}

impl TransactionOp {
    pub fn table(&self) -> &str {
        match self {
            TransactionOp::ConditionCheck { table, .. }
            | TransactionOp::Put { table, .. }
            | TransactionOp::Update { table, .. }
            | TransactionOp::Delete { table, .. } => table,
        }
    }
}

/// One read of a read-mode transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGet {
    pub table: TableName,
    pub key: Key,
    pub projection: Option<String>,
    pub names: BTreeMap<String, String>,
}

impl TransactionGet {
    pub fn new(table: impl Into<TableName>, key: Key) -> Self {
        Self {
            table: table.into(),
            key,
            projection: None,
            names: BTreeMap::new(),
        }
    }
}

/// Result of a committed transaction. Reads yield one entry per get, in
/// order; writes yield none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionOutcome {
    pub items: Vec<Option<Document>>,
}

impl TransactionOutcome {
    /// Decode the item of the `index`-th get.
    pub fn item<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        match self.items.get(index) {
            Some(Some(doc)) => record::from_document(doc.clone()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    Read,
}

/// Builder for an atomic set of operations. See [`Store::transaction`].
pub struct Transaction<'s> {
    store: &'s Store,
    mode: Option<Mode>,
    writes: Vec<(TransactWriteItem, Arc<TableSchema>)>,
    gets: Vec<(TransactGetItem, Arc<TableSchema>)>,
    keys: HashSet<(TableName, String)>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self {
            store,
            mode: None,
            writes: Vec::new(),
            gets: Vec::new(),
            keys: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len() + self.gets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Require the item at `key` to satisfy `condition`.
    pub fn check(
        &mut self,
        table: impl Into<TableName>,
        key: Key,
        condition: ConditionSpec,
    ) -> Result<&mut Self> {
        self.add(TransactionOp::ConditionCheck {
            table: table.into(),
            key,
            condition,
            on_failure: ReturnOnFailure::None,
        })
    }

    /// Write `record`. Its table is created first if the store lacks it.
    pub fn put<T: Record>(&mut self, record: &T, condition: Option<ConditionSpec>) -> Result<&mut Self> {
        self.store.table::<T>().ensure_ready()?;
        self.add(TransactionOp::Put {
            table: T::table_name(),
            item: record::to_document(record)?,
            condition,
            on_failure: ReturnOnFailure::None,
        })
    }

    pub fn update(
        &mut self,
        table: impl Into<TableName>,
        key: Key,
        update_expression: impl Into<String>,
        params: Option<ConditionSpec>,
    ) -> Result<&mut Self> {
        self.add(TransactionOp::Update {
            table: table.into(),
            key,
            update_expression: update_expression.into(),
            params,
            on_failure: ReturnOnFailure::None,
        })
    }

    pub fn delete(
        &mut self,
        table: impl Into<TableName>,
        key: Key,
        condition: Option<ConditionSpec>,
    ) -> Result<&mut Self> {
        self.add(TransactionOp::Delete {
            table: table.into(),
            key,
            condition,
            on_failure: ReturnOnFailure::None,
        })
    }

    /// Ask the most recently added write to report its prior value if its
    /// condition fails.
    pub fn return_prior_on_failure(&mut self) -> &mut Self {
        if let Some((item, _)) = self.writes.last_mut() {
            match item {
                TransactWriteItem::ConditionCheck {
                    return_on_failure, ..
                }
                | TransactWriteItem::Put {
                    return_on_failure, ..
                }
                | TransactWriteItem::Update {
                    return_on_failure, ..
                }
                | TransactWriteItem::Delete {
                    return_on_failure, ..
                } => *return_on_failure = true,
            }
        }
        self
    }

    /// Add a write operation.
    pub fn add(&mut self, op: TransactionOp) -> Result<&mut Self> {
        self.enter(Mode::Write)?;
        let store = self.store;
        let schema = store.resolve_schema(op.table())?;
        let dialect = store.dialect();

        let (item, key) = match op {
            TransactionOp::ConditionCheck {
                table,
                key,
                condition,
                on_failure,
            } => {
                let (expression, attributes) = condition.write_parts();
                let expression = expression.ok_or_else(|| {
                    Error::configuration(format!(
                        "condition check on '{}' has no condition expression",
                        table
                    ))
                })?;
                let item = TransactWriteItem::ConditionCheck {
                    table,
                    key: key.to_item(&schema, dialect)?,
                    condition: expression,
                    attributes,
                    return_on_failure: on_failure == ReturnOnFailure::PriorValue,
                };
                (item, key)
            }
            TransactionOp::Put {
                table,
                item,
                condition,
                on_failure,
            } => {
                let item = record::document_to_item(&item, &schema, dialect)?;
                let key = Key::from_item(&item, &schema, dialect)?;
                let (condition, attributes) = write_parts(condition.as_ref());
                let item = TransactWriteItem::Put {
                    table,
                    item,
                    condition,
                    attributes,
                    return_on_failure: on_failure == ReturnOnFailure::PriorValue,
                };
                (item, key)
            }
            TransactionOp::Update {
                table,
                key,
                update_expression,
                params,
                on_failure,
            } => {
                let (condition, attributes) = params
                    .as_ref()
                    .map(ConditionSpec::update_parts)
                    .unwrap_or_default();
                let item = TransactWriteItem::Update {
                    table,
                    key: key.to_item(&schema, dialect)?,
                    update_expression,
                    condition,
                    attributes,
                    return_on_failure: on_failure == ReturnOnFailure::PriorValue,
                };
                (item, key)
            }
            TransactionOp::Delete {
                table,
                key,
                condition,
                on_failure,
            } => {
                let (condition, attributes) = write_parts(condition.as_ref());
                let item = TransactWriteItem::Delete {
                    table,
                    key: key.to_item(&schema, dialect)?,
                    condition,
                    attributes,
                    return_on_failure: on_failure == ReturnOnFailure::PriorValue,
                };
                (item, key)
            }
        };

        self.claim(item.table(), &key)?;
        self.writes.push((item, schema));
        Ok(self)
    }

    /// Read the item at `key` as part of a read-mode transaction.
    pub fn get(&mut self, table: impl Into<TableName>, key: Key) -> Result<&mut Self> {
        self.add_get(TransactionGet::new(table, key))
    }

    pub fn add_get(&mut self, get: TransactionGet) -> Result<&mut Self> {
        self.enter(Mode::Read)?;
        let schema = self.store.resolve_schema(&get.table)?;
        let item = TransactGetItem {
            key: get.key.to_item(&schema, self.store.dialect())?,
            table: get.table,
            projection: get.projection,
            attributes: ExpressionAttributes {
                names: get.names,
                values: Default::default(),
            },
        };
        self.claim(&item.table, &get.key)?;
        self.gets.push((item, schema));
        Ok(self)
    }

    /// Submit everything in one driver call.
    pub fn commit(self) -> Result<TransactionOutcome> {
        if self.is_empty() {
            return Err(Error::configuration("nothing to commit"));
        }
        match self.mode {
            Some(Mode::Read) => self.commit_reads(),
            _ => self.commit_writes(),
        }
    }

    fn commit_writes(self) -> Result<TransactionOutcome> {
        let count = self.writes.len();
        let items = self.writes.iter().map(|(item, _)| item.clone()).collect();

        match self.store.driver().transact_write(items) {
            Ok(()) => {
                tracing::info!(operations = count, "transaction committed");
                Ok(TransactionOutcome::default())
            }
            Err(DriverError::TransactionCanceled { reasons }) => Err(self.cancellation(reasons)),
            Err(err) => Err(err.into()),
        }
    }

    fn commit_reads(self) -> Result<TransactionOutcome> {
        let dialect = self.store.dialect();
        let items = self.gets.iter().map(|(item, _)| item.clone()).collect();
        let found = self.store.driver().transact_get(items)?;

        if found.len() != self.gets.len() {
            return Err(Error::Transport(format!(
                "transactional get returned {} items for {} keys",
                found.len(),
                self.gets.len()
            )));
        }

        let items = found
            .into_iter()
            .zip(&self.gets)
            .map(|(item, (_, schema))| item.map(|item| record::item_to_document(item, schema, dialect)))
            .collect();
        Ok(TransactionOutcome { items })
    }

    fn cancellation(&self, reasons: Vec<CancellationReason>) -> Error {
        let failed = reasons
            .into_iter()
            .enumerate()
            .find(|(_, reason)| reason.code != CancellationCode::None);

        let Some((index, reason)) = failed else {
            return Error::Transport("transaction canceled without a reason".to_string());
        };
        let Some((op, schema)) = self.writes.get(index) else {
            return Error::Transport(format!("transaction canceled at unknown operation {}", index));
        };

        tracing::info!(table = %op.table(), operation = index, code = ?reason.code, "transaction canceled");
        match reason.code {
            CancellationCode::ConditionalCheckFailed => {
                let mut failure = ConditionFailure::new(op.table());
                failure.operation = Some(index);
                failure.prior = reason
                    .item
                    .map(|item| record::item_to_document(item, schema, self.store.dialect()));
                Error::ConditionFailed(Box::new(failure))
            }
            CancellationCode::ValidationError => Error::Transport(format!(
                "operation {} rejected by store: {}",
                index,
                reason.message.unwrap_or_default()
            )),
            CancellationCode::TransactionConflict | CancellationCode::None => Error::Transport(
                format!("operation {} conflicts with another transaction", index),
            ),
        }
    }

    fn enter(&mut self, mode: Mode) -> Result<()> {
        match self.mode {
            Some(current) if current != mode => Err(Error::configuration(
                "a transaction cannot mix reads and writes",
            )),
            _ => {
                self.mode = Some(mode);
                Ok(())
            }
        }
    }

    fn claim(&mut self, table: &str, key: &Key) -> Result<()> {
        if self.keys.insert((table.to_string(), key.fingerprint())) {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "transaction touches the same key of '{}' twice",
                table
            )))
        }
    }
}

fn write_parts(condition: Option<&ConditionSpec>) -> (Option<String>, ExpressionAttributes) {
    condition.map(ConditionSpec::write_parts).unwrap_or_default()
}
