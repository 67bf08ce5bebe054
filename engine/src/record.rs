//! Marshaling between records and stored items.
//!
//! Records are serialized with serde into a [`Document`]; the table schema
//! decides which document entries become attributes, under which storage
//! names and with which storage types. Entries without a schema field are
//! left out in both directions.

use crate::{
    error::Result, AttributeValue, Document, Error, FieldDef, Item, StorageType, TableSchema,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Serialize a record into its document form.
pub fn to_document<T: Serialize + ?Sized>(record: &T) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(doc) => Ok(doc),
        other => Err(Error::Serialization(format!(
            "record must serialize to an object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Deserialize a document into a record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Marshal a document into a stored item.
pub fn document_to_item(doc: &Document, schema: &TableSchema, dialect: &str) -> Result<Item> {
    let mut item = Item::new();

    for field in &schema.fields {
        let value = match doc.get(field.record_key()) {
            None | Some(Value::Null) => None,
            Some(value) => Some(convert_field(field, value)?),
        };

        match value {
            Some(attr) if !(field.omit_if_empty && attr.is_empty()) => {
                if is_key(field) && attr.is_empty() {
                    return Err(empty_key(schema, field));
                }
                item.insert(field.storage_name(dialect).to_string(), attr);
            }
            _ if is_key(field) => return Err(empty_key(schema, field)),
            _ => {}
        }
    }

    Ok(item)
}

/// Unmarshal a stored item into a document.
pub fn item_to_document(mut item: Item, schema: &TableSchema, dialect: &str) -> Document {
    let mut doc = Document::new();
    for field in &schema.fields {
        if let Some(value) = item.remove(field.storage_name(dialect)) {
            doc.insert(field.record_key().to_string(), value.into_json());
        }
    }
    doc
}

/// Record -> item in one step.
pub fn to_item<T: Serialize + ?Sized>(
    record: &T,
    schema: &TableSchema,
    dialect: &str,
) -> Result<Item> {
    document_to_item(&to_document(record)?, schema, dialect)
}

/// Item -> record in one step.
pub fn from_item<T: DeserializeOwned>(item: Item, schema: &TableSchema, dialect: &str) -> Result<T> {
    from_document(item_to_document(item, schema, dialect))
}

fn is_key(field: &FieldDef) -> bool {
    field.is_partition_key || field.is_sort_key
}

fn empty_key(schema: &TableSchema, field: &FieldDef) -> Error {
    Error::InvalidKey(format!(
        "record for table '{}' has an empty key field '{}'",
        schema.table_name, field.logical_name
    ))
}

fn convert_field(field: &FieldDef, value: &Value) -> Result<AttributeValue> {
    let converted = match (field.storage_type, value) {
        (StorageType::String, Value::String(s)) => Some(AttributeValue::S(s.clone())),
        (StorageType::Number, Value::Number(n)) => Some(AttributeValue::N(n.clone())),
        (StorageType::Number, Value::Bool(b)) => Some(AttributeValue::Bool(*b)),
        (StorageType::Binary, Value::Array(values)) => bytes_of(values).map(AttributeValue::B),
        _ => None,
    };

    converted.ok_or_else(|| Error::TypeMismatch {
        field: field.logical_name.clone(),
        expected: field.storage_type.to_string(),
        got: json_type_name(value).to_string(),
    })
}

fn bytes_of(values: &[Value]) -> Option<Vec<u8>> {
    values
        .iter()
        .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}
