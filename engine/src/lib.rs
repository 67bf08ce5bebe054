//! # ODM Engine
//!
//! A typed document mapper for partition/sort-key document stores.
//!
//! Applications describe their records once; the engine derives the storage
//! schema from that description and performs single-item, batch and
//! transactional operations against any store reachable through a
//! [`Driver`](driver::Driver).
//!
//! ## Design Principles
//!
//! - **Narrow boundary**: the engine never talks to a store except through
//!   the driver trait
//! - **Opaque expressions**: conditions, updates and key conditions are
//!   strings; the engine only binds their placeholders
//! - **Lazy tables**: a table handle resolves its schema on first use
//! - **Explicit partial failure**: batches hand back what the store skipped,
//!   in request shape, and never retry on their own
//!
//! ## Core Concepts
//!
//! ### Records and schemas
//!
//! A [`Record`] is any serde type that describes its fields through a
//! [`SchemaBuilder`]. [`derive_schema`] turns that description into a
//! [`TableSchema`]: partition key first, sort key second, then the remaining
//! fields by name. Field types without a storage representation (maps, raw
//! JSON) are left out of the schema and never reach the store.
//!
//! ### Tables
//!
//! [`Table`] is a typed handle on one table: put, get, update, delete and
//! query, each with optional [`ConditionSpec`] preconditions. A failed
//! precondition is [`Error::ConditionFailed`]; a missing item on get is
//! `Ok(None)`.
//!
//! ### Batches and transactions
//!
//! [`Store::batch_get`] and [`Store::batch_write`] span several tables and may
//! complete partially. [`Store::transaction`] builds an all-or-nothing set of
//! writes, or a consistent set of reads.
//!
//! ## Quick Start
//!
//! ```rust
//! use odm_engine::{derive_schema, Record, SchemaBuilder, StorageType};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Book {
//!     author: String,
//!     title: String,
//!     pages: u32,
//! }
//!
//! impl Record for Book {
//!     fn describe(schema: &mut SchemaBuilder) {
//!         schema.field::<String>("author").partition_key();
//!         schema.field::<String>("title").sort_key();
//!         schema.field::<u32>("pages");
//!     }
//! }
//!
//! let schema = derive_schema::<Book>();
//! assert_eq!(schema.table_name, "book");
//! assert_eq!(schema.partition_field().map(|f| f.logical_name.as_str()), Some("author"));
//! assert_eq!(schema.field("pages").map(|f| f.storage_type), Some(StorageType::Number));
//! ```
//!
//! With a driver in hand, `Store::new(driver).table::<Book>()` gives a typed
//! table. Drivers are usually opened by name through the [`dialect`]
//! registry.

pub mod background;
pub mod batch;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod expression;
pub mod key;
pub mod record;
pub mod schema;
pub mod store;
pub mod table;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use background::Pending;
pub use batch::{BatchGet, BatchGetOutput, BatchWrite, BatchWriteOutput};
pub use config::{ConfigError, StoreConfig};
pub use error::{ConditionFailure, Error, Result};
pub use expression::{
    bind, equality_expression, ConditionSpec, ExpressionAttributes, GetOptions, QuerySpec,
};
pub use key::{Cursor, Key};
pub use schema::{
    derive_schema, to_snake_case, FieldDef, FieldKind, FieldSpec, Nested, Record, SchemaBuilder,
    StorageType, TableSchema,
};
pub use store::{SchemaCache, Store};
pub use table::{Table, TableStatus};
pub use transaction::{
    ReturnOnFailure, Transaction, TransactionGet, TransactionOp, TransactionOutcome,
};
pub use value::{AttributeValue, Document, Item};

/// Type aliases for clarity
pub type TableName = String;
pub type DialectName = String;
