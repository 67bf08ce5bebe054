//! Table accessor.
//!
//! A [`Table`] is a typed handle on one table. It resolves its schema lazily
//! on the first operation, through one of two paths:
//!
//! - opened from a record type: `SchemaReady -> ConnectionReady`, creating
//!   the table in the store if it does not exist yet
//! - opened by name: `Uninitialized -> MetaFetched -> ConnectionReady`,
//!   asking the driver to describe the table
//!
//! A schema that fails validation keeps the handle in its current state, so
//! every operation reports the same `Configuration` error.

use crate::{
    driver::{
        DeleteRequest, Driver, DriverError, GetRequest, PutRequest, QueryRequest, ReturnValues,
        UpdateRequest,
    },
    error::Result,
    record,
    store::SchemaCache,
    ConditionFailure, ConditionSpec, Cursor, Error, ExpressionAttributes, GetOptions, Item, Key,
    QuerySpec, TableName, TableSchema,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Initialization state of a table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Uninitialized,
    MetaFetched,
    SchemaReady,
    ConnectionReady,
}

enum TableState {
    Uninitialized,
    MetaFetched(Arc<TableSchema>),
    SchemaReady(Arc<TableSchema>),
    ConnectionReady(Arc<TableSchema>),
}

impl TableState {
    fn status(&self) -> TableStatus {
        match self {
            TableState::Uninitialized => TableStatus::Uninitialized,
            TableState::MetaFetched(_) => TableStatus::MetaFetched,
            TableState::SchemaReady(_) => TableStatus::SchemaReady,
            TableState::ConnectionReady(_) => TableStatus::ConnectionReady,
        }
    }
}

/// Typed handle on one table.
pub struct Table<T> {
    name: TableName,
    driver: Arc<dyn Driver>,
    schemas: Arc<SchemaCache>,
    state: RwLock<TableState>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Table<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TableStatus {
        self.state.read().status()
    }
}

impl<T> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

impl<T> Table<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Handle whose schema is already known.
    pub(crate) fn from_schema(
        schema: Arc<TableSchema>,
        driver: Arc<dyn Driver>,
        schemas: Arc<SchemaCache>,
    ) -> Self {
        Self {
            name: schema.table_name.clone(),
            driver,
            schemas,
            state: RwLock::new(TableState::SchemaReady(schema)),
            _record: PhantomData,
        }
    }

    /// Handle that will describe the table on first use.
    pub(crate) fn from_name(
        name: impl Into<TableName>,
        driver: Arc<dyn Driver>,
        schemas: Arc<SchemaCache>,
    ) -> Self {
        Self {
            name: name.into(),
            driver,
            schemas,
            state: RwLock::new(TableState::Uninitialized),
            _record: PhantomData,
        }
    }

    /// Drive the handle to `ConnectionReady` and return its schema.
    pub fn ensure_ready(&self) -> Result<Arc<TableSchema>> {
        if let TableState::ConnectionReady(schema) = &*self.state.read() {
            return Ok(Arc::clone(schema));
        }

        let mut state = self.state.write();
        loop {
            let next = match &*state {
                TableState::ConnectionReady(schema) => return Ok(Arc::clone(schema)),
                TableState::Uninitialized => TableState::MetaFetched(self.describe()?),
                TableState::MetaFetched(schema) => {
                    schema.validate()?;
                    TableState::ConnectionReady(Arc::clone(schema))
                }
                TableState::SchemaReady(schema) => {
                    schema.validate()?;
                    self.driver
                        .create_table_if_absent(schema)
                        .map_err(Error::from)?;
                    tracing::info!(table = %self.name, "table ready");
                    TableState::ConnectionReady(Arc::clone(schema))
                }
            };
            *state = next;
        }
    }

    fn describe(&self) -> Result<Arc<TableSchema>> {
        if let Some(schema) = self.schemas.get(&self.name) {
            return Ok(schema);
        }
        let schema = Arc::new(self.driver.describe_table(&self.name)?);
        tracing::debug!(table = %self.name, fields = schema.fields.len(), "described table");
        self.schemas.insert(Arc::clone(&schema));
        Ok(schema)
    }

    // Writes

    /// Store a record, replacing any item with the same key.
    pub fn put_item(&self, record: &T, condition: Option<&ConditionSpec>) -> Result<()> {
        self.put(record, condition, ReturnValues::None).map(|_| ())
    }

    /// Like [`put_item`](Self::put_item) but returns the item it replaced.
    pub fn replace_item(&self, record: &T, condition: Option<&ConditionSpec>) -> Result<Option<T>> {
        let schema = self.ensure_ready()?;
        self.put(record, condition, ReturnValues::AllOld)?
            .map(|item| record::from_item(item, &schema, self.driver.dialect()))
            .transpose()
    }

    fn put(
        &self,
        record: &T,
        condition: Option<&ConditionSpec>,
        return_values: ReturnValues,
    ) -> Result<Option<Item>> {
        let schema = self.ensure_ready()?;
        let item = record::to_item(record, &schema, self.driver.dialect())?;
        let (condition, attributes) = self.write_parts(condition, "put");

        self.driver
            .put_item(PutRequest {
                table: self.name.clone(),
                item,
                condition,
                attributes,
                return_values,
            })
            .map_err(|err| self.map_error(err, &schema))
    }

    /// Apply an update expression to the item at `key`.
    ///
    /// The parameters of `params` are sent even when it has no condition,
    /// since the update expression may reference them.
    pub fn update_item(
        &self,
        key: &Key,
        update_expression: &str,
        params: Option<&ConditionSpec>,
    ) -> Result<()> {
        self.update(key, update_expression, params, ReturnValues::None)
            .map(|_| ())
    }

    /// Like [`update_item`](Self::update_item) but returns the updated item.
    pub fn update_item_returning(
        &self,
        key: &Key,
        update_expression: &str,
        params: Option<&ConditionSpec>,
    ) -> Result<Option<T>> {
        let schema = self.ensure_ready()?;
        self.update(key, update_expression, params, ReturnValues::AllNew)?
            .map(|item| record::from_item(item, &schema, self.driver.dialect()))
            .transpose()
    }

    fn update(
        &self,
        key: &Key,
        update_expression: &str,
        params: Option<&ConditionSpec>,
        return_values: ReturnValues,
    ) -> Result<Option<Item>> {
        let schema = self.ensure_ready()?;
        let key = key.to_item(&schema, self.driver.dialect())?;
        let (condition, attributes) = params
            .map(ConditionSpec::update_parts)
            .unwrap_or_default();

        self.driver
            .update_item(UpdateRequest {
                table: self.name.clone(),
                key,
                update_expression: update_expression.to_string(),
                condition,
                attributes,
                return_values,
            })
            .map_err(|err| self.map_error(err, &schema))
    }

    pub fn delete_item(&self, key: &Key, condition: Option<&ConditionSpec>) -> Result<()> {
        self.delete(key, condition, ReturnValues::None).map(|_| ())
    }

    /// Delete and return the removed item, if there was one.
    pub fn take_item(&self, key: &Key, condition: Option<&ConditionSpec>) -> Result<Option<T>> {
        let schema = self.ensure_ready()?;
        self.delete(key, condition, ReturnValues::AllOld)?
            .map(|item| record::from_item(item, &schema, self.driver.dialect()))
            .transpose()
    }

    fn delete(
        &self,
        key: &Key,
        condition: Option<&ConditionSpec>,
        return_values: ReturnValues,
    ) -> Result<Option<Item>> {
        let schema = self.ensure_ready()?;
        let key = key.to_item(&schema, self.driver.dialect())?;
        let (condition, attributes) = self.write_parts(condition, "delete");

        self.driver
            .delete_item(DeleteRequest {
                table: self.name.clone(),
                key,
                condition,
                attributes,
                return_values,
            })
            .map_err(|err| self.map_error(err, &schema))
    }

    // Reads

    /// Fetch one record. An absent item is `Ok(None)`.
    pub fn get_item(&self, key: &Key, options: Option<&GetOptions>) -> Result<Option<T>> {
        let schema = self.ensure_ready()?;
        let request_key = key.to_item(&schema, self.driver.dialect())?;
        let options = options.cloned().unwrap_or_default();

        let item = self
            .driver
            .get_item(GetRequest {
                table: self.name.clone(),
                key: request_key,
                consistent: options.consistent,
                projection: options.projection,
                attributes: ExpressionAttributes {
                    names: options.names,
                    values: Default::default(),
                },
            })
            .map_err(|err| self.map_error(err, &schema))?;

        item.map(|item| record::from_item(item, &schema, self.driver.dialect()))
            .transpose()
    }

    /// Fetch one record into `sink`. Returns false and leaves `sink`
    /// untouched when the item is absent.
    pub fn load_item(&self, key: &Key, options: Option<&GetOptions>, sink: &mut T) -> Result<bool> {
        match self.get_item(key, options)? {
            Some(record) => {
                *sink = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// One page of records matching `spec`.
    ///
    /// `cursor` is read as the exclusive start key and overwritten with the
    /// last evaluated key; an empty cursor afterwards means no more pages.
    pub fn query(&self, spec: &QuerySpec, cursor: &mut Cursor) -> Result<Vec<T>> {
        if spec.key_condition.trim().is_empty() {
            return Err(Error::NotImplemented(format!(
                "query on '{}' without a key condition (scan)",
                self.name
            )));
        }

        let schema = self.ensure_ready()?;
        let output = self
            .driver
            .query(QueryRequest {
                table: self.name.clone(),
                key_condition: spec.key_condition.clone(),
                filter: spec.filter.clone(),
                projection: spec.projection.clone(),
                attributes: crate::bind(&spec.names, &spec.values),
                consistent: spec.consistent,
                limit: spec.limit,
                index_name: spec.index_name.clone(),
                descending: spec.descending,
                exclusive_start_key: cursor.last_key().cloned(),
            })
            .map_err(|err| self.map_error(err, &schema))?;

        tracing::debug!(
            table = %self.name,
            items = output.items.len(),
            more = output.last_evaluated_key.is_some(),
            "query page"
        );
        cursor.replace(output.last_evaluated_key);

        output
            .items
            .into_iter()
            .map(|item| record::from_item(item, &schema, self.driver.dialect()))
            .collect()
    }

    /// Full-table scans are not supported.
    pub fn scan(&self) -> Result<Vec<T>> {
        Err(Error::NotImplemented(format!("scan of '{}'", self.name)))
    }

    fn write_parts(
        &self,
        condition: Option<&ConditionSpec>,
        operation: &'static str,
    ) -> (Option<String>, ExpressionAttributes) {
        match condition {
            Some(spec) => {
                if spec.is_inert() {
                    tracing::debug!(
                        table = %self.name,
                        operation,
                        "condition parameters without an expression are ignored"
                    );
                }
                spec.write_parts()
            }
            None => (None, ExpressionAttributes::default()),
        }
    }

    fn map_error(&self, err: DriverError, schema: &TableSchema) -> Error {
        match err {
            DriverError::ConditionalCheckFailed { item } => {
                tracing::debug!(table = %self.name, "condition failed");
                let mut failure = ConditionFailure::new(self.name.clone());
                failure.prior =
                    item.map(|item| record::item_to_document(item, schema, self.driver.dialect()));
                Error::ConditionFailed(Box::new(failure))
            }
            other => {
                tracing::warn!(table = %self.name, error = %other, "driver call failed");
                other.into()
            }
        }
    }
}
