//! Store facade.
//!
//! A [`Store`] binds one driver to the table, batch and transaction
//! coordinators and owns the schema cache they share. Cloning a store is
//! cheap; clones share the driver and the cache.

use crate::{
    background::{self, Pending},
    batch::{self, BatchGet, BatchGetOutput, BatchWrite, BatchWriteOutput},
    config::StoreConfig,
    derive_schema, dialect,
    driver::Driver,
    error::Result,
    Record, Table, TableName, TableSchema, Transaction,
};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Table schemas keyed by table name. Read-through, last write wins.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: DashMap<TableName, Arc<TableSchema>>,
}

impl SchemaCache {
    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.schemas.get(table).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, schema: Arc<TableSchema>) {
        self.schemas.insert(schema.table_name.clone(), schema);
    }

    pub fn remove(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.schemas.remove(table).map(|(_, schema)| schema)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Entry point of the mapper.
#[derive(Clone)]
pub struct Store {
    driver: Arc<dyn Driver>,
    schemas: Arc<SchemaCache>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dialect", &self.driver.dialect())
            .field("cached_schemas", &self.schemas.len())
            .finish()
    }
}

impl Store {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            schemas: Arc::new(SchemaCache::default()),
        }
    }

    /// Open a store through the dialect registry.
    pub fn open(dialect: &str, descriptor: &str) -> Result<Self> {
        let driver = dialect::open(dialect, descriptor)?;
        tracing::info!(dialect = %dialect, "store opened");
        Ok(Self::new(driver))
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open(&config.dialect, &config.connection)
    }

    /// Open the store named by `ODM_DIALECT` and `ODM_CONNECTION`.
    pub fn from_env() -> Result<Self> {
        Self::from_config(&StoreConfig::from_env()?)
    }

    pub fn dialect(&self) -> &str {
        self.driver.dialect()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    // Schemas

    /// Schema of a record type, derived on first request and cached.
    pub fn schema_of<T: Record>(&self) -> Arc<TableSchema> {
        let name = T::table_name();
        if let Some(schema) = self.schemas.get(&name) {
            return schema;
        }
        let schema = Arc::new(derive_schema::<T>());
        tracing::debug!(table = %name, fields = schema.fields.len(), "derived schema");
        self.schemas.insert(Arc::clone(&schema));
        schema
    }

    /// Schema of a table by name: the cache first, else the driver.
    pub fn resolve_schema(&self, table: &str) -> Result<Arc<TableSchema>> {
        if let Some(schema) = self.schemas.get(table) {
            return Ok(schema);
        }
        let schema = Arc::new(self.driver.describe_table(table)?);
        self.schemas.insert(Arc::clone(&schema));
        Ok(schema)
    }

    /// Drop a cached schema so the next lookup rebuilds it.
    pub fn invalidate_schema(&self, table: &str) {
        if self.schemas.remove(table).is_some() {
            tracing::debug!(table = %table, "schema invalidated");
        }
    }

    // Tables

    /// Handle on the table of a record type. The table is created in the
    /// store on first use if it does not exist.
    pub fn table<T: Record>(&self) -> Table<T> {
        Table::from_schema(
            self.schema_of::<T>(),
            Arc::clone(&self.driver),
            Arc::clone(&self.schemas),
        )
    }

    /// Handle on an existing table. Its schema is described on first use.
    pub fn table_named<T>(&self, name: impl Into<TableName>) -> Table<T>
    where
        T: Serialize + DeserializeOwned,
    {
        Table::from_name(name, Arc::clone(&self.driver), Arc::clone(&self.schemas))
    }

    // Multi-item operations

    pub fn batch_get(&self, requests: Vec<BatchGet>) -> Result<BatchGetOutput> {
        batch::get(self, requests)
    }

    pub fn batch_write(&self, requests: Vec<BatchWrite>) -> Result<BatchWriteOutput> {
        batch::write(self, requests)
    }

    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Run `operation` on the blocking pool with a clone of this store.
    pub fn spawn<T, F>(&self, operation: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        background::spawn(move || operation(&store))
    }
}
