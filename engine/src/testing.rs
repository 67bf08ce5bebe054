//! Scriptable driver for unit tests.
//!
//! Stores items by key without evaluating expressions, records every request
//! and can be told to fail the next call.

use crate::driver::*;
use crate::{Item, TableName, TableSchema};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Describe(TableName),
    Create(TableName),
    Put(PutRequest),
    Get(GetRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
    Query(QueryRequest),
    BatchGet(BatchGetRequest),
    BatchWrite(BatchWriteRequest),
    TransactWrite(Vec<TransactWriteItem>),
    TransactGet(Vec<TransactGetItem>),
}

#[derive(Default)]
pub struct FakeDriver {
    schemas: Mutex<BTreeMap<TableName, TableSchema>>,
    items: Mutex<BTreeMap<TableName, BTreeMap<String, Item>>>,
    requests: Mutex<Vec<Request>>,
    fail_next: Mutex<Option<DriverError>>,
    /// Leave the last key of every batch table unprocessed
    defer_last: Mutex<bool>,
    unreachable: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a transport error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn add_table(&self, schema: TableSchema) {
        self.schemas.lock().insert(schema.table_name.clone(), schema);
    }

    pub fn fail_next(&self, err: DriverError) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn defer_last(&self) {
        *self.defer_last.lock() = true;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn creates(&self) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| matches!(r, Request::Create(_)))
            .count()
    }

    fn record(&self, request: Request) -> DriverResult<()> {
        self.requests.lock().push(request);
        if self.unreachable {
            return Err(DriverError::Transport("unreachable".into()));
        }
        match self.fail_next.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn key_of(&self, table: &str, item: &Item) -> DriverResult<String> {
        let schemas = self.schemas.lock();
        let schema = schemas
            .get(table)
            .ok_or_else(|| DriverError::TableNotFound(table.to_string()))?;
        let key: Item = schema
            .fields
            .iter()
            .filter(|f| f.is_partition_key || f.is_sort_key)
            .filter_map(|f| {
                let name = f.storage_name(self.dialect());
                item.get(name).map(|v| (name.to_string(), v.clone()))
            })
            .collect();
        serde_json::to_string(&key).map_err(|e| DriverError::Validation(e.to_string()))
    }

    fn store(&self, table: &str, item: Item) -> DriverResult<Option<Item>> {
        let key = self.key_of(table, &item)?;
        Ok(self
            .items
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(key, item))
    }

    fn load(&self, table: &str, key: &Item) -> DriverResult<Option<Item>> {
        let key = self.key_of(table, key)?;
        Ok(self
            .items
            .lock()
            .get(table)
            .and_then(|items| items.get(&key).cloned()))
    }

    fn remove(&self, table: &str, key: &Item) -> DriverResult<Option<Item>> {
        let key = self.key_of(table, key)?;
        Ok(self
            .items
            .lock()
            .get_mut(table)
            .and_then(|items| items.remove(&key)))
    }
}

impl Driver for FakeDriver {
    fn dialect(&self) -> &str {
        "fake"
    }

    fn describe_table(&self, name: &str) -> DriverResult<TableSchema> {
        self.record(Request::Describe(name.to_string()))?;
        self.schemas
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::TableNotFound(name.to_string()))
    }

    fn create_table_if_absent(&self, schema: &TableSchema) -> DriverResult<()> {
        self.record(Request::Create(schema.table_name.clone()))?;
        self.schemas
            .lock()
            .entry(schema.table_name.clone())
            .or_insert_with(|| schema.clone());
        Ok(())
    }

    fn put_item(&self, request: PutRequest) -> DriverResult<Option<Item>> {
        self.record(Request::Put(request.clone()))?;
        let prior = self.store(&request.table, request.item)?;
        Ok(prior.filter(|_| request.return_values == ReturnValues::AllOld))
    }

    fn get_item(&self, request: GetRequest) -> DriverResult<Option<Item>> {
        self.record(Request::Get(request.clone()))?;
        self.load(&request.table, &request.key)
    }

    fn update_item(&self, request: UpdateRequest) -> DriverResult<Option<Item>> {
        self.record(Request::Update(request.clone()))?;
        let current = self.load(&request.table, &request.key)?;
        let item = current.unwrap_or_else(|| request.key.clone());
        self.store(&request.table, item.clone())?;
        Ok(Some(item).filter(|_| request.return_values == ReturnValues::AllNew))
    }

    fn delete_item(&self, request: DeleteRequest) -> DriverResult<Option<Item>> {
        self.record(Request::Delete(request.clone()))?;
        let prior = self.remove(&request.table, &request.key)?;
        Ok(prior.filter(|_| request.return_values == ReturnValues::AllOld))
    }

    fn query(&self, request: QueryRequest) -> DriverResult<QueryOutput> {
        self.record(Request::Query(request.clone()))?;
        let start = match &request.exclusive_start_key {
            Some(key) => Some(self.key_of(&request.table, key)?),
            None => None,
        };
        let items = self.items.lock();
        let mut remaining: Vec<(&String, &Item)> = items
            .get(&request.table)
            .map(|t| t.iter().collect())
            .unwrap_or_default();
        if let Some(start) = start {
            remaining.retain(|(k, _)| k.as_str() > start.as_str());
        }

        let limit = request.limit.unwrap_or(usize::MAX);
        let page: Vec<Item> = remaining.iter().take(limit).map(|(_, i)| (*i).clone()).collect();
        let last_evaluated_key = if remaining.len() > page.len() {
            page.last().cloned()
        } else {
            None
        };
        Ok(QueryOutput {
            items: page,
            last_evaluated_key,
        })
    }

    fn batch_get(&self, request: BatchGetRequest) -> DriverResult<BatchGetOutput> {
        self.record(Request::BatchGet(request.clone()))?;
        let defer = *self.defer_last.lock();
        let mut output = BatchGetOutput::default();

        for (table, mut entry) in request.tables {
            let deferred = if defer { entry.keys.pop() } else { None };
            let found = output.responses.entry(table.clone()).or_default();
            for key in &entry.keys {
                if let Some(item) = self.load(&table, key)? {
                    found.push(item);
                }
            }
            if let Some(key) = deferred {
                output.unprocessed.push((
                    table,
                    KeysAndAttributes {
                        keys: vec![key],
                        ..entry
                    },
                ));
            }
        }
        Ok(output)
    }

    fn batch_write(&self, request: BatchWriteRequest) -> DriverResult<BatchWriteOutput> {
        self.record(Request::BatchWrite(request.clone()))?;
        let defer = *self.defer_last.lock();
        let mut output = BatchWriteOutput::default();

        for (table, mut writes) in request.tables {
            let deferred = if defer { writes.pop() } else { None };
            for write in writes {
                match write {
                    WriteRequest::Put(item) => {
                        self.store(&table, item)?;
                    }
                    WriteRequest::Delete(key) => {
                        self.remove(&table, &key)?;
                    }
                }
            }
            if let Some(write) = deferred {
                output.unprocessed.push((table, vec![write]));
            }
        }
        Ok(output)
    }

    fn transact_write(&self, items: Vec<TransactWriteItem>) -> DriverResult<()> {
        self.record(Request::TransactWrite(items.clone()))?;
        for item in items {
            match item {
                TransactWriteItem::Put { table, item, .. } => {
                    self.store(&table, item)?;
                }
                TransactWriteItem::Delete { table, key, .. } => {
                    self.remove(&table, &key)?;
                }
                TransactWriteItem::Update { .. } | TransactWriteItem::ConditionCheck { .. } => {}
            }
        }
        Ok(())
    }

    fn transact_get(&self, items: Vec<TransactGetItem>) -> DriverResult<Vec<Option<Item>>> {
        self.record(Request::TransactGet(items.clone()))?;
        items
            .iter()
            .map(|get| self.load(&get.table, &get.key))
            .collect()
    }
}
