//! Shared fixtures for the memory dialect integration tests.

#![allow(dead_code)]

use odm_engine::driver::Driver;
use odm_engine::{Record, SchemaBuilder, Store};
use odm_memory::{MemoryConfig, MemoryDb};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A store over a fresh database, plus the database for inspection.
pub fn fixture() -> (Store, Arc<MemoryDb>) {
    fixture_with(MemoryConfig::default())
}

pub fn fixture_with(config: MemoryConfig) -> (Store, Arc<MemoryDb>) {
    init_tracing();
    let db = Arc::new(MemoryDb::with_config(config));
    let driver: Arc<dyn Driver> = db.clone();
    (Store::new(driver), db)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub author: String,
    pub title: String,
    pub age: i64,
    #[serde(rename = "dyInfo")]
    pub dy_tag_info: String,
    pub on_sale: bool,
    pub cart: HashMap<String, i32>,
}

impl Record for Book {
    fn describe(schema: &mut SchemaBuilder) {
        schema.field::<String>("author").partition_key();
        schema.field::<String>("title").sort_key();
        schema.field::<i64>("age");
        schema
            .field::<String>("dy_tag_info")
            .serialized_as("dyInfo")
            .dialect("memory", "dy_info");
        schema.field::<bool>("on_sale");
        schema.field::<HashMap<String, i32>>("cart");
    }
}

pub fn book(author: &str, title: &str, age: i64) -> Book {
    Book {
        author: author.into(),
        title: title.into(),
        age,
        ..Book::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub balance: i64,
}

impl Record for Account {
    fn describe(schema: &mut SchemaBuilder) {
        schema.field::<String>("id").partition_key();
        schema.field::<i64>("balance");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub status: String,
}

impl Record for Order {
    fn describe(schema: &mut SchemaBuilder) {
        schema.field::<String>("id").partition_key();
        schema.field::<String>("status");
    }
}
