//! Schema derivation.
//!
//! A record declares its fields once through [`Record::describe`]; the
//! deriver turns that declaration into a [`TableSchema`] with a stable field
//! order (partition key, sort key, then the rest by name).

use crate::{error::Result, Error, TableName};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Storage types a field can be persisted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    String,
    Number,
    Binary,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::String => write!(f, "String"),
            StorageType::Number => write!(f, "Number"),
            StorageType::Binary => write!(f, "Binary"),
        }
    }
}

/// Definition of a mapped field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name as declared on the record
    pub logical_name: String,
    /// Storage type derived from the field's Rust type
    pub storage_type: StorageType,
    /// Key the record serializes this field under, when it differs
    pub serialized_name: Option<String>,
    /// Storage name overrides by dialect
    pub dialect_names: BTreeMap<String, String>,
    pub is_partition_key: bool,
    pub is_sort_key: bool,
    /// Skip the attribute when the value is null or empty
    pub omit_if_empty: bool,
}

impl FieldDef {
    /// A plain field.
    pub fn new(logical_name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            logical_name: logical_name.into(),
            storage_type,
            serialized_name: None,
            dialect_names: BTreeMap::new(),
            is_partition_key: false,
            is_sort_key: false,
            omit_if_empty: false,
        }
    }

    /// A partition key field.
    pub fn partition(logical_name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            is_partition_key: true,
            ..Self::new(logical_name, storage_type)
        }
    }

    /// A sort key field.
    pub fn sort(logical_name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            is_sort_key: true,
            ..Self::new(logical_name, storage_type)
        }
    }

    /// Key this field appears under in the record's serde form.
    pub fn record_key(&self) -> &str {
        self.serialized_name.as_deref().unwrap_or(&self.logical_name)
    }

    /// Attribute name used by the given dialect: dialect override, else the
    /// serialized name, else the logical name.
    pub fn storage_name(&self, dialect: &str) -> &str {
        self.dialect_names
            .get(dialect)
            .map(String::as_str)
            .unwrap_or_else(|| self.record_key())
    }

    fn rank(&self) -> u8 {
        if self.is_partition_key {
            0
        } else if self.is_sort_key {
            1
        } else {
            2
        }
    }
}

/// Key and field layout of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table_name: TableName,
    /// Partition key first, sort key second, the rest ascending by name
    pub fields: Vec<FieldDef>,
}

impl TableSchema {
    /// Create a schema; fields are put in canonical order.
    pub fn new(table_name: impl Into<TableName>, mut fields: Vec<FieldDef>) -> Self {
        fields.sort_by(|a, b| {
            a.rank()
                .cmp(&b.rank())
                .then_with(|| a.logical_name.cmp(&b.logical_name))
        });
        Self {
            table_name: table_name.into(),
            fields,
        }
    }

    /// The first partition key field, if any.
    pub fn partition_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_partition_key)
    }

    /// The first sort key field, if any.
    pub fn sort_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_sort_key)
    }

    /// Look up a field by logical name.
    pub fn field(&self, logical_name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.logical_name == logical_name)
    }

    /// Check key cardinality: exactly one partition key, at most one sort key.
    pub fn validate(&self) -> Result<()> {
        self.key_fields().map(|_| ())
    }

    /// The validated partition and sort fields.
    pub fn key_fields(&self) -> Result<(&FieldDef, Option<&FieldDef>)> {
        let partitions: Vec<_> = self.fields.iter().filter(|f| f.is_partition_key).collect();
        let sorts: Vec<_> = self.fields.iter().filter(|f| f.is_sort_key).collect();

        match partitions.len() {
            0 => {
                return Err(Error::configuration(format!(
                    "table '{}' declares no partition key",
                    self.table_name
                )))
            }
            1 => {}
            n => {
                return Err(Error::configuration(format!(
                    "table '{}' declares {} partition keys",
                    self.table_name, n
                )))
            }
        }
        if sorts.len() > 1 {
            return Err(Error::configuration(format!(
                "table '{}' declares {} sort keys",
                self.table_name,
                sorts.len()
            )));
        }

        Ok((partitions[0], sorts.first().copied()))
    }
}

/// Maps a Rust field type to its storage type. `None` means the field kind
/// is not storable and the field is left out of the schema.
pub trait FieldKind {
    const STORAGE: Option<StorageType>;
    const OPTIONAL: bool = false;
}

/// Marker for nested structs and other unsupported field kinds.
#[derive(Debug, Clone, Copy)]
pub struct Nested;

impl FieldKind for Nested {
    const STORAGE: Option<StorageType> = None;
}

macro_rules! field_kind {
    ($storage:expr => $($ty:ty),*) => {
        $(
            impl FieldKind for $ty {
                const STORAGE: Option<StorageType> = $storage;
            }
        )*
    };
}

field_kind!(Some(StorageType::String) => String, str, char);
field_kind!(Some(StorageType::Number) =>
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool);
field_kind!(Some(StorageType::Binary) => Vec<u8>);
field_kind!(None => serde_json::Value, serde_json::Map<String, serde_json::Value>, Vec<String>);

impl<T: FieldKind> FieldKind for Option<T> {
    const STORAGE: Option<StorageType> = T::STORAGE;
    const OPTIONAL: bool = true;
}

impl<K, V, S> FieldKind for HashMap<K, V, S> {
    const STORAGE: Option<StorageType> = None;
}

impl<K, V> FieldKind for BTreeMap<K, V> {
    const STORAGE: Option<StorageType> = None;
}

/// A record type that can be stored in a table.
///
/// ```rust
/// use odm_engine::{Record, SchemaBuilder};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Book {
///     author: String,
///     title: String,
///     age: i64,
/// }
///
/// impl Record for Book {
///     fn describe(schema: &mut SchemaBuilder) {
///         schema.field::<String>("author").partition_key();
///         schema.field::<String>("title").sort_key();
///         schema.field::<i64>("age");
///     }
/// }
///
/// let schema = odm_engine::derive_schema::<Book>();
/// assert_eq!(schema.table_name, "book");
/// ```
pub trait Record: Serialize + DeserializeOwned {
    /// Declare the record's fields.
    fn describe(schema: &mut SchemaBuilder);

    /// Table the record lives in. Override to supply an explicit name; the
    /// default is the snake-cased type name.
    fn table_name() -> TableName {
        to_snake_case(short_type_name::<Self>())
    }
}

/// Declaration of one field, refined with the annotation methods.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    storage: Option<StorageType>,
    partition: bool,
    sort: bool,
    serialized_name: Option<String>,
    dialect_names: BTreeMap<String, String>,
    omit_if_empty: bool,
}

impl FieldSpec {
    /// Mark as the partition key.
    pub fn partition_key(&mut self) -> &mut Self {
        self.partition = true;
        self.sort = false;
        self
    }

    /// Mark as the sort key.
    pub fn sort_key(&mut self) -> &mut Self {
        self.sort = true;
        self.partition = false;
        self
    }

    /// The record serializes this field under a different key (e.g. a serde
    /// rename). Also the default storage name.
    pub fn serialized_as(&mut self, name: impl Into<String>) -> &mut Self {
        self.serialized_name = Some(name.into());
        self
    }

    /// Storage name override for one dialect.
    pub fn dialect(&mut self, dialect: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.dialect_names.insert(dialect.into(), name.into());
        self
    }

    /// Skip the attribute when the value is empty.
    pub fn omit_empty(&mut self) -> &mut Self {
        self.omit_if_empty = true;
        self
    }

    fn into_field_def(self) -> Option<FieldDef> {
        let storage_type = self.storage?;
        Some(FieldDef {
            logical_name: self.name,
            storage_type,
            serialized_name: self.serialized_name,
            dialect_names: self.dialect_names,
            is_partition_key: self.partition,
            is_sort_key: self.sort,
            omit_if_empty: self.omit_if_empty,
        })
    }
}

/// Collects field declarations in declaration order.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field whose Rust type is `V`.
    pub fn field<V: FieldKind + ?Sized>(&mut self, name: &str) -> &mut FieldSpec {
        let index = self.fields.len();
        self.fields.push(FieldSpec {
            name: name.to_string(),
            storage: V::STORAGE,
            partition: false,
            sort: false,
            serialized_name: None,
            dialect_names: BTreeMap::new(),
            omit_if_empty: V::OPTIONAL,
        });
        &mut self.fields[index]
    }

    /// Finish into a schema. Unsupported fields are dropped here.
    pub fn build(self, table_name: impl Into<TableName>) -> TableSchema {
        let fields = self
            .fields
            .into_iter()
            .filter_map(FieldSpec::into_field_def)
            .collect();
        TableSchema::new(table_name, fields)
    }
}

/// Derive the schema of a record type. Pure; cardinality is not checked.
pub fn derive_schema<T: Record>() -> TableSchema {
    let mut builder = SchemaBuilder::new();
    T::describe(&mut builder);
    builder.build(T::table_name())
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// `OrderItem` -> `order_item`, `JSONInfo` -> `json_info`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && prev != '_' {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}
