//! # ODM Memory
//!
//! An embedded dialect that keeps tables in process memory. It understands
//! the same condition, update, projection and key-condition expressions the
//! mapper emits, so it doubles as a test backend for code written against
//! [`odm_engine::Store`].
//!
//! ## Quick start
//!
//! ```
//! use odm_engine::{Record, SchemaBuilder, Store};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Note {
//!     id: String,
//!     body: String,
//! }
//!
//! impl Record for Note {
//!     fn describe(schema: &mut SchemaBuilder) {
//!         schema.field::<String>("id").partition_key();
//!         schema.field::<String>("body");
//!     }
//! }
//!
//! odm_memory::register();
//! let store = Store::open(odm_memory::DIALECT, "").unwrap();
//! let notes = store.table::<Note>();
//! notes
//!     .put_item(&Note { id: "n1".into(), body: "hello".into() }, None)
//!     .unwrap();
//! ```

pub mod config;
pub mod db;
pub mod expr;
pub mod table;

pub use config::{ConfigError, MemoryConfig};
pub use db::{MemoryDb, MemoryOpener};
pub use table::{KeyValue, MemoryTable, PrimaryKey};

use std::sync::{Arc, Once};

/// Name the dialect registers under.
pub const DIALECT: &str = "memory";

/// Register the dialect with the engine's registry. Safe to call repeatedly.
pub fn register() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| odm_engine::dialect::register(DIALECT, Arc::new(MemoryOpener)));
}
