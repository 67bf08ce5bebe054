//! The in-memory driver.
//!
//! All tables sit behind one lock. Every request takes it once, so single
//! writes, batches and transactions are each atomic with respect to each
//! other.

use crate::config::{ConfigError, MemoryConfig};
use crate::expr::{parse_condition, parse_projection, parse_update, EvalContext, ExpressionError};
use crate::table::{MemoryTable, PrimaryKey};
use crate::DIALECT;
use odm_engine::driver::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, CancellationCode,
    CancellationReason, DeleteRequest, Driver, DriverError, DriverOpener, DriverResult,
    GetRequest, KeysAndAttributes, PutRequest, QueryOutput, QueryRequest, ReturnValues,
    TransactGetItem, TransactWriteItem, UpdateRequest, WriteRequest,
};
use odm_engine::{ExpressionAttributes, Item, TableName, TableSchema};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type Tables = BTreeMap<TableName, MemoryTable>;

impl From<ExpressionError> for DriverError {
    fn from(err: ExpressionError) -> Self {
        DriverError::Validation(err.to_string())
    }
}

/// An embedded store keeping every table in process memory.
#[derive(Debug, Default)]
pub struct MemoryDb {
    config: MemoryConfig,
    tables: RwLock<Tables>,
}

impl MemoryDb {
    /// Create an empty store with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            tables: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store from a connection descriptor.
    pub fn open(descriptor: &str) -> Result<Self, ConfigError> {
        MemoryConfig::parse(descriptor).map(Self::with_config)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Remove a table and its items. Returns false if it did not exist.
    pub fn drop_table(&self, name: &str) -> bool {
        let dropped = self.tables.write().remove(name).is_some();
        if dropped {
            tracing::info!(table = %name, "table dropped");
        }
        dropped
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<TableName> {
        self.tables.read().keys().cloned().collect()
    }

    /// Number of items in a table, `None` if it does not exist.
    pub fn item_count(&self, name: &str) -> Option<usize> {
        self.tables.read().get(name).map(MemoryTable::len)
    }
}

fn lookup<'t>(tables: &'t Tables, name: &str) -> DriverResult<&'t MemoryTable> {
    tables
        .get(name)
        .ok_or_else(|| DriverError::TableNotFound(name.to_string()))
}

fn lookup_mut<'t>(tables: &'t mut Tables, name: &str) -> DriverResult<&'t mut MemoryTable> {
    tables
        .get_mut(name)
        .ok_or_else(|| DriverError::TableNotFound(name.to_string()))
}

fn context<'a>(item: &'a Item, attributes: &'a ExpressionAttributes) -> EvalContext<'a> {
    EvalContext {
        item,
        names: &attributes.names,
        values: &attributes.values,
    }
}

/// Evaluate an optional condition. A missing item is seen as having no
/// attributes.
fn passes(
    item: Option<&Item>,
    condition: Option<&str>,
    attributes: &ExpressionAttributes,
) -> DriverResult<bool> {
    let Some(condition) = condition else {
        return Ok(true);
    };
    let empty = Item::new();
    let parsed = parse_condition(condition)?;
    Ok(context(item.unwrap_or(&empty), attributes).evaluate(&parsed)?)
}

fn project(
    item: Item,
    projection: Option<&str>,
    attributes: &ExpressionAttributes,
) -> DriverResult<Item> {
    match projection {
        None => Ok(item),
        Some(projection) => {
            let paths = parse_projection(projection)?;
            Ok(context(&item, attributes).project(&paths)?)
        }
    }
}

/// The item an update expression produces. Creates the item from its key
/// when it does not exist yet.
fn plan_update(
    table: &MemoryTable,
    key: &PrimaryKey,
    existing: Option<&Item>,
    update_expression: &str,
    attributes: &ExpressionAttributes,
) -> DriverResult<Item> {
    let base = match existing {
        Some(item) => item.clone(),
        None => table.key_item(key)?,
    };
    let update = parse_update(update_expression)?;
    let next = context(&base, attributes).apply_update(&update)?;
    if table.key_of(&next)? != *key {
        return Err(DriverError::Validation(
            "update expressions may not change key attributes".to_string(),
        ));
    }
    Ok(next)
}

/// Attributes of `image` whose value differs between `before` and `after`.
fn changed(image: &Item, before: &Item, after: &Item) -> Item {
    image
        .iter()
        .filter(|(name, _)| before.get(*name) != after.get(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn condition_failed(existing: Option<&Item>, return_values: ReturnValues) -> DriverError {
    DriverError::ConditionalCheckFailed {
        item: match return_values {
            ReturnValues::AllOld => existing.cloned(),
            _ => None,
        },
    }
}

impl Driver for MemoryDb {
    fn dialect(&self) -> &str {
        DIALECT
    }

    fn describe_table(&self, name: &str) -> DriverResult<TableSchema> {
        lookup(&self.tables.read(), name).map(|table| table.schema().clone())
    }

    fn create_table_if_absent(&self, schema: &TableSchema) -> DriverResult<()> {
        schema
            .validate()
            .map_err(|err| DriverError::Validation(err.to_string()))?;
        let mut tables = self.tables.write();
        if !tables.contains_key(&schema.table_name) {
            tables.insert(schema.table_name.clone(), MemoryTable::new(schema.clone()));
            tracing::info!(table = %schema.table_name, "table created");
        }
        Ok(())
    }

    fn put_item(&self, request: PutRequest) -> DriverResult<Option<Item>> {
        let mut tables = self.tables.write();
        let table = lookup_mut(&mut tables, &request.table)?;
        let key = table.key_of(&request.item)?;

        let existing = table.get(&key);
        if !passes(existing, request.condition.as_deref(), &request.attributes)? {
            return Err(condition_failed(existing, request.return_values));
        }

        let prior = table.put(key, request.item);
        Ok(match request.return_values {
            ReturnValues::AllOld => prior,
            _ => None,
        })
    }

    fn get_item(&self, request: GetRequest) -> DriverResult<Option<Item>> {
        let tables = self.tables.read();
        let table = lookup(&tables, &request.table)?;
        let key = table.key_from_request(&request.key)?;
        table
            .get(&key)
            .cloned()
            .map(|item| project(item, request.projection.as_deref(), &request.attributes))
            .transpose()
    }

    fn update_item(&self, request: UpdateRequest) -> DriverResult<Option<Item>> {
        let mut tables = self.tables.write();
        let table = lookup_mut(&mut tables, &request.table)?;
        let key = table.key_from_request(&request.key)?;

        let existing = table.get(&key).cloned();
        if !passes(existing.as_ref(), request.condition.as_deref(), &request.attributes)? {
            return Err(condition_failed(existing.as_ref(), request.return_values));
        }

        let next = plan_update(
            table,
            &key,
            existing.as_ref(),
            &request.update_expression,
            &request.attributes,
        )?;
        let before = existing.clone().unwrap_or_default();
        let returned = match request.return_values {
            ReturnValues::None => None,
            ReturnValues::AllOld => existing,
            ReturnValues::AllNew => Some(next.clone()),
            ReturnValues::UpdatedOld => Some(changed(&before, &before, &next)),
            ReturnValues::UpdatedNew => Some(changed(&next, &before, &next)),
        };
        table.put(key, next);
        Ok(returned)
    }

    fn delete_item(&self, request: DeleteRequest) -> DriverResult<Option<Item>> {
        let mut tables = self.tables.write();
        let table = lookup_mut(&mut tables, &request.table)?;
        let key = table.key_from_request(&request.key)?;

        let existing = table.get(&key);
        if !passes(existing, request.condition.as_deref(), &request.attributes)? {
            return Err(condition_failed(existing, request.return_values));
        }

        let prior = table.remove(&key);
        Ok(match request.return_values {
            ReturnValues::AllOld => prior,
            _ => None,
        })
    }

    fn query(&self, request: QueryRequest) -> DriverResult<QueryOutput> {
        if let Some(index) = &request.index_name {
            return Err(DriverError::Validation(format!(
                "secondary index '{}' is not supported",
                index
            )));
        }
        if request.limit == Some(0) {
            return Err(DriverError::Validation("query limit must be positive".to_string()));
        }

        let tables = self.tables.read();
        let table = lookup(&tables, &request.table)?;
        let attributes = &request.attributes;

        let empty = Item::new();
        let key_condition = table.key_condition(
            &parse_condition(&request.key_condition)?,
            &context(&empty, attributes),
        )?;
        let filter = request.filter.as_deref().map(parse_condition).transpose()?;
        let projection = request
            .projection
            .as_deref()
            .map(parse_projection)
            .transpose()?;

        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|key| table.key_from_request(key))
            .transpose()?;
        if let Some(start) = &start {
            if start.partition != key_condition.partition {
                return Err(DriverError::Validation(
                    "exclusive start key belongs to another partition".to_string(),
                ));
            }
        }

        let (evaluated, more) = table.query(
            &key_condition,
            request.descending,
            start.as_ref().map(|key| &key.sort),
            request.limit,
        );

        let last_evaluated_key = match evaluated.last() {
            Some(last) if more => Some(table.key_item(&table.key_of(last)?)?),
            _ => None,
        };

        let mut items = Vec::with_capacity(evaluated.len());
        for item in &evaluated {
            let ctx = context(item, attributes);
            if let Some(filter) = &filter {
                if !ctx.evaluate(filter)? {
                    continue;
                }
            }
            items.push(match &projection {
                Some(paths) => ctx.project(paths)?,
                None => item.clone(),
            });
        }

        tracing::debug!(
            table = %request.table,
            evaluated = evaluated.len(),
            returned = items.len(),
            more,
            "query"
        );
        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }

    fn batch_get(&self, request: BatchGetRequest) -> DriverResult<BatchGetOutput> {
        let total: usize = request.tables.iter().map(|(_, entry)| entry.keys.len()).sum();
        if total > self.config.batch_get_limit {
            return Err(DriverError::Validation(format!(
                "batch get of {} keys exceeds the limit of {}",
                total, self.config.batch_get_limit
            )));
        }

        let tables = self.tables.read();
        for (name, entry) in &request.tables {
            let table = lookup(&tables, name)?;
            for key in &entry.keys {
                table.key_from_request(key)?;
            }
        }

        let mut budget = self.config.batch_capacity;
        let mut output = BatchGetOutput::default();
        for (name, entry) in request.tables {
            let table = lookup(&tables, &name)?;
            let mut keys = entry.keys;
            let rest = keys.split_off(budget.min(keys.len()));
            budget -= keys.len();

            if !keys.is_empty() {
                let found = output.responses.entry(name.clone()).or_default();
                for key in &keys {
                    if let Some(item) = table.get(&table.key_from_request(key)?) {
                        found.push(project(
                            item.clone(),
                            entry.projection.as_deref(),
                            &entry.attributes,
                        )?);
                    }
                }
            }

            if !rest.is_empty() {
                output.unprocessed.push((
                    name,
                    KeysAndAttributes {
                        keys: rest,
                        consistent: entry.consistent,
                        projection: entry.projection,
                        attributes: entry.attributes,
                    },
                ));
            }
        }
        Ok(output)
    }

    fn batch_write(&self, request: BatchWriteRequest) -> DriverResult<BatchWriteOutput> {
        let total: usize = request.tables.iter().map(|(_, writes)| writes.len()).sum();
        if total > self.config.batch_write_limit {
            return Err(DriverError::Validation(format!(
                "batch write of {} items exceeds the limit of {}",
                total, self.config.batch_write_limit
            )));
        }

        let mut tables = self.tables.write();
        for (name, writes) in &request.tables {
            let table = lookup(&tables, name)?;
            for write in writes {
                match write {
                    WriteRequest::Put(item) => table.key_of(item)?,
                    WriteRequest::Delete(key) => table.key_from_request(key)?,
                };
            }
        }

        let mut budget = self.config.batch_capacity;
        let mut output = BatchWriteOutput::default();
        for (name, mut writes) in request.tables {
            let rest = writes.split_off(budget.min(writes.len()));
            budget -= writes.len();

            let table = lookup_mut(&mut tables, &name)?;
            for write in writes {
                match write {
                    WriteRequest::Put(item) => {
                        let key = table.key_of(&item)?;
                        table.put(key, item);
                    }
                    WriteRequest::Delete(key) => {
                        let key = table.key_from_request(&key)?;
                        table.remove(&key);
                    }
                }
            }

            if !rest.is_empty() {
                output.unprocessed.push((name, rest));
            }
        }
        Ok(output)
    }

    fn transact_write(&self, items: Vec<TransactWriteItem>) -> DriverResult<()> {
        if items.len() > self.config.transaction_limit {
            return Err(DriverError::Validation(format!(
                "transaction of {} operations exceeds the limit of {}",
                items.len(),
                self.config.transaction_limit
            )));
        }

        let mut tables = self.tables.write();
        let mut seen = BTreeSet::new();
        let mut reasons = Vec::with_capacity(items.len());
        // `None` removes the item
        let mut planned: Vec<(TableName, PrimaryKey, Option<Item>)> = Vec::new();
        let mut canceled = false;

        for op in &items {
            let table = lookup(&tables, op.table())?;
            let (key, condition, attributes, return_on_failure) = match op {
                TransactWriteItem::ConditionCheck {
                    key,
                    condition,
                    attributes,
                    return_on_failure,
                    ..
                } => (
                    table.key_from_request(key)?,
                    Some(condition.as_str()),
                    attributes,
                    *return_on_failure,
                ),
                TransactWriteItem::Put {
                    item,
                    condition,
                    attributes,
                    return_on_failure,
                    ..
                } => (
                    table.key_of(item)?,
                    condition.as_deref(),
                    attributes,
                    *return_on_failure,
                ),
                TransactWriteItem::Update {
                    key,
                    condition,
                    attributes,
                    return_on_failure,
                    ..
                }
                | TransactWriteItem::Delete {
                    key,
                    condition,
                    attributes,
                    return_on_failure,
                    ..
                } => (
                    table.key_from_request(key)?,
                    condition.as_deref(),
                    attributes,
                    *return_on_failure,
                ),
            };

            if !seen.insert((op.table().to_string(), key.clone())) {
                return Err(DriverError::Validation(
                    "transaction touches the same item more than once".to_string(),
                ));
            }

            let existing = table.get(&key);
            if !passes(existing, condition, attributes)? {
                canceled = true;
                reasons.push(CancellationReason {
                    code: CancellationCode::ConditionalCheckFailed,
                    message: Some("the conditional request failed".to_string()),
                    item: if return_on_failure { existing.cloned() } else { None },
                });
                continue;
            }

            let change = match op {
                TransactWriteItem::ConditionCheck { .. } => None,
                TransactWriteItem::Put { item, .. } => Some(Ok(Some(item.clone()))),
                TransactWriteItem::Update {
                    update_expression, ..
                } => Some(
                    plan_update(table, &key, existing, update_expression, attributes).map(Some),
                ),
                TransactWriteItem::Delete { .. } => Some(Ok(None)),
            };
            match change {
                None => reasons.push(CancellationReason::ok()),
                Some(Ok(next)) => {
                    reasons.push(CancellationReason::ok());
                    planned.push((op.table().to_string(), key, next));
                }
                Some(Err(err)) => {
                    canceled = true;
                    reasons.push(CancellationReason {
                        code: CancellationCode::ValidationError,
                        message: Some(err.to_string()),
                        item: None,
                    });
                }
            }
        }

        if canceled {
            tracing::debug!(operations = items.len(), "transaction canceled");
            return Err(DriverError::TransactionCanceled { reasons });
        }

        for (name, key, next) in planned {
            let table = lookup_mut(&mut tables, &name)?;
            match next {
                Some(item) => {
                    table.put(key, item);
                }
                None => {
                    table.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn transact_get(&self, items: Vec<TransactGetItem>) -> DriverResult<Vec<Option<Item>>> {
        if items.len() > self.config.transaction_limit {
            return Err(DriverError::Validation(format!(
                "transaction of {} reads exceeds the limit of {}",
                items.len(),
                self.config.transaction_limit
            )));
        }

        let tables = self.tables.read();
        items
            .into_iter()
            .map(|read| {
                let table = lookup(&tables, &read.table)?;
                let key = table.key_from_request(&read.key)?;
                table
                    .get(&key)
                    .cloned()
                    .map(|item| project(item, read.projection.as_deref(), &read.attributes))
                    .transpose()
            })
            .collect()
    }
}

/// Opens [`MemoryDb`] instances for the dialect registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryOpener;

impl DriverOpener for MemoryOpener {
    fn open(&self, descriptor: &str) -> DriverResult<Arc<dyn Driver>> {
        let db = MemoryDb::open(descriptor).map_err(|err| DriverError::Validation(err.to_string()))?;
        Ok(Arc::new(db))
    }
}
