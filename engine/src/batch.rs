//! Batch coordinator.
//!
//! Batches are best effort: the store may process only part of a request
//! and hand back the rest. The remainder is returned in request shape so
//! callers can resubmit it as is. Nothing is retried here.

use crate::{
    driver::{self, KeysAndAttributes, WriteRequest},
    error::Result,
    record, Document, Error, ExpressionAttributes, Item, Key, Store, TableName, TableSchema,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Keys to read from one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGet {
    pub table: TableName,
    pub keys: Vec<Key>,
    pub consistent: bool,
    pub projection: Option<String>,
    pub names: BTreeMap<String, String>,
}

impl BatchGet {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn key(mut self, key: Key) -> Self {
        self.keys.push(key);
        self
    }

    pub fn keys(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.keys.extend(keys);
        self
    }

    pub fn consistent(mut self) -> Self {
        self.consistent = true;
        self
    }

    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }
}

/// Puts and deletes against one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWrite {
    pub table: TableName,
    pub puts: Vec<Document>,
    pub deletes: Vec<Key>,
}

impl BatchWrite {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn put<T: Serialize + ?Sized>(mut self, record: &T) -> Result<Self> {
        self.puts.push(record::to_document(record)?);
        Ok(self)
    }

    pub fn delete(mut self, key: Key) -> Self {
        self.deletes.push(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

/// Items read by a batch get, by table, plus what the store skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    pub responses: BTreeMap<TableName, Vec<Document>>,
    pub unprocessed: Vec<BatchGet>,
}

impl BatchGetOutput {
    /// Decode the items read from `table`.
    pub fn items<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        self.responses
            .get(table)
            .map(|docs| {
                docs.iter()
                    .map(|doc| record::from_document(doc.clone()))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<BatchWrite>,
}

impl BatchWriteOutput {
    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

/// Fails on an empty or repeated table name.
fn check_tables<'a>(tables: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for table in tables {
        if table.is_empty() {
            return Err(Error::configuration("batch entry without a table name"));
        }
        if !seen.insert(table) {
            return Err(Error::configuration(format!(
                "table '{}' appears more than once in the batch",
                table
            )));
        }
    }
    Ok(())
}

pub(crate) fn get(store: &Store, requests: Vec<BatchGet>) -> Result<BatchGetOutput> {
    check_tables(requests.iter().map(|r| r.table.as_str()))?;

    let dialect = store.dialect();
    let mut schemas: HashMap<TableName, Arc<TableSchema>> = HashMap::new();
    let mut tables = Vec::new();

    for request in requests.into_iter().filter(|r| !r.keys.is_empty()) {
        let schema = store.resolve_schema(&request.table)?;
        let keys = request
            .keys
            .iter()
            .map(|key| key.to_item(&schema, dialect))
            .collect::<Result<Vec<Item>>>()?;

        let table = request.table.clone();
        tables.push((
            table.clone(),
            KeysAndAttributes {
                keys,
                consistent: request.consistent,
                projection: request.projection.clone(),
                attributes: ExpressionAttributes {
                    names: request.names.clone(),
                    values: Default::default(),
                },
            },
        ));
        schemas.insert(table, schema);
    }

    if tables.is_empty() {
        tracing::debug!("batch get has no keys, skipping driver call");
        return Ok(BatchGetOutput::default());
    }

    let output = store
        .driver()
        .batch_get(driver::BatchGetRequest { tables })?;

    let mut result = BatchGetOutput::default();
    for (table, items) in output.responses {
        let schema = schemas.get(&table).ok_or_else(|| unexpected_table(&table))?;
        let docs = items
            .into_iter()
            .map(|item| record::item_to_document(item, schema, dialect))
            .collect();
        result.responses.insert(table, docs);
    }

    for (table, entry) in output.unprocessed {
        let schema = schemas.get(&table).ok_or_else(|| unexpected_table(&table))?;
        let keys = entry
            .keys
            .iter()
            .map(|item| Key::from_item(item, schema, dialect))
            .collect::<Result<Vec<Key>>>()?;
        result.unprocessed.push(BatchGet {
            table,
            keys,
            consistent: entry.consistent,
            projection: entry.projection,
            names: entry.attributes.names,
        });
    }

    if !result.is_complete() {
        tracing::info!(tables = result.unprocessed.len(), "batch get left keys unprocessed");
    }
    Ok(result)
}

pub(crate) fn write(store: &Store, requests: Vec<BatchWrite>) -> Result<BatchWriteOutput> {
    check_tables(requests.iter().map(|r| r.table.as_str()))?;

    let dialect = store.dialect();
    let mut schemas: HashMap<TableName, Arc<TableSchema>> = HashMap::new();
    let mut tables = Vec::new();

    for request in requests.into_iter().filter(|r| !r.is_empty()) {
        let schema = store.resolve_schema(&request.table)?;
        let mut writes = Vec::with_capacity(request.puts.len() + request.deletes.len());
        for doc in &request.puts {
            writes.push(WriteRequest::Put(record::document_to_item(
                doc, &schema, dialect,
            )?));
        }
        for key in &request.deletes {
            writes.push(WriteRequest::Delete(key.to_item(&schema, dialect)?));
        }
        tables.push((request.table.clone(), writes));
        schemas.insert(request.table, schema);
    }

    if tables.is_empty() {
        tracing::debug!("batch write has no items, skipping driver call");
        return Ok(BatchWriteOutput::default());
    }

    let output = store
        .driver()
        .batch_write(driver::BatchWriteRequest { tables })?;

    let mut result = BatchWriteOutput::default();
    for (table, writes) in output.unprocessed {
        let schema = schemas.get(&table).ok_or_else(|| unexpected_table(&table))?;
        let mut remainder = BatchWrite::new(table.clone());
        for write in writes {
            match write {
                WriteRequest::Put(item) => remainder
                    .puts
                    .push(record::item_to_document(item, schema, dialect)),
                WriteRequest::Delete(key) => {
                    remainder.deletes.push(Key::from_item(&key, schema, dialect)?)
                }
            }
        }
        result.unprocessed.push(remainder);
    }

    if !result.is_complete() {
        tracing::info!(tables = result.unprocessed.len(), "batch write left items unprocessed");
    }
    Ok(result)
}

fn unexpected_table(table: &str) -> Error {
    Error::Transport(format!("store answered for table '{}' that was not requested", table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, Request};
    use crate::{Record, SchemaBuilder};
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Book {
        author: String,
        title: String,
    }

    impl Record for Book {
        fn describe(schema: &mut SchemaBuilder) {
            schema.field::<String>("author").partition_key();
            schema.field::<String>("title").sort_key();
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Account {
        id: i64,
        balance: i64,
    }

    impl Record for Account {
        fn describe(schema: &mut SchemaBuilder) {
            schema.field::<i64>("id").partition_key();
            schema.field::<i64>("balance");
        }
    }

    fn book(author: &str, title: &str) -> Book {
        Book {
            author: author.into(),
            title: title.into(),
        }
    }

    fn store() -> (Store, Arc<FakeDriver>) {
        let driver = Arc::new(FakeDriver::new());
        driver.add_table(crate::derive_schema::<Book>());
        driver.add_table(crate::derive_schema::<Account>());
        (Store::new(driver.clone()), driver)
    }

    #[test]
    fn duplicate_table_fails_before_driver() {
        let driver = Arc::new(FakeDriver::unreachable());
        let store = Store::new(driver.clone());

        let err = store
            .batch_get(vec![
                BatchGet::new("book").key(Key::composite("Tom", "a")),
                BatchGet::new("book").key(Key::composite("Tom", "b")),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = store.batch_write(vec![BatchWrite::new("")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(driver.requests().is_empty());
    }

    #[test]
    fn empty_entries_are_skipped() {
        let (store, driver) = store();

        let output = store
            .batch_get(vec![BatchGet::new("book"), BatchGet::new("account")])
            .unwrap();
        assert!(output.responses.is_empty());
        assert!(output.is_complete());

        let output = store.batch_write(vec![BatchWrite::new("book")]).unwrap();
        assert!(output.is_complete());
        assert!(driver.requests().is_empty());
    }

    #[test]
    fn results_routed_by_table() {
        let (store, driver) = store();
        store
            .batch_write(vec![
                BatchWrite::new("book").put(&book("Tom", "a")).unwrap(),
                BatchWrite::new("account")
                    .put(&Account { id: 1, balance: 5 })
                    .unwrap(),
            ])
            .unwrap();

        let output = store
            .batch_get(vec![
                BatchGet::new("account").key(Key::partition(1)),
                BatchGet::new("book").key(Key::composite("Tom", "a")),
                BatchGet::new("author"),
            ])
            .unwrap();

        assert_eq!(output.items::<Book>("book").unwrap(), vec![book("Tom", "a")]);
        assert_eq!(
            output.items::<Account>("account").unwrap(),
            vec![Account { id: 1, balance: 5 }]
        );
        // the empty "author" entry never reached the driver
        let sent = driver.requests().into_iter().find_map(|r| match r {
            Request::BatchGet(req) => Some(req),
            _ => None,
        });
        assert_eq!(sent.unwrap().tables.len(), 2);
    }

    #[test]
    fn unprocessed_comes_back_in_request_shape() {
        let (store, driver) = store();
        driver.defer_last();

        let output = store
            .batch_write(vec![BatchWrite::new("book")
                .put(&book("Tom", "a"))
                .unwrap()
                .delete(Key::composite("Tom", "z"))])
            .unwrap();
        assert_eq!(
            output.unprocessed,
            vec![BatchWrite::new("book").delete(Key::composite("Tom", "z"))]
        );

        let output = store
            .batch_get(vec![BatchGet::new("book")
                .key(Key::composite("Tom", "a"))
                .key(Key::composite("Tom", "b"))
                .consistent()])
            .unwrap();
        assert_eq!(
            output.unprocessed,
            vec![BatchGet::new("book")
                .key(Key::composite("Tom", "b"))
                .consistent()]
        );
        assert_eq!(output.items::<Book>("book").unwrap(), vec![book("Tom", "a")]);
    }
}
