//! Item keys and query cursors.

use crate::{error::Result, AttributeValue, Error, FieldDef, Item, TableSchema};
use serde::{Deserialize, Serialize};

/// Partition value plus optional sort value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub partition: AttributeValue,
    pub sort: Option<AttributeValue>,
}

impl Key {
    /// Key for a table without a sort key.
    pub fn partition(value: impl Into<AttributeValue>) -> Self {
        Self {
            partition: value.into(),
            sort: None,
        }
    }

    /// Key with both components.
    pub fn composite(partition: impl Into<AttributeValue>, sort: impl Into<AttributeValue>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }

    /// Marshal into the storage key of `schema`.
    ///
    /// A sort value is required iff the schema has a sort key; when the
    /// schema has none it is dropped.
    pub fn to_item(&self, schema: &TableSchema, dialect: &str) -> Result<Item> {
        let (partition_field, sort_field) = schema.key_fields()?;
        let mut item = Item::new();

        if self.partition.is_empty() {
            return Err(Error::InvalidKey(format!(
                "empty partition value for table '{}'",
                schema.table_name
            )));
        }
        check_key_type(partition_field, &self.partition)?;
        item.insert(
            partition_field.storage_name(dialect).to_string(),
            self.partition.clone(),
        );

        if let Some(sort_field) = sort_field {
            let sort = self.sort.as_ref().ok_or_else(|| {
                Error::InvalidKey(format!(
                    "table '{}' requires a sort value for '{}'",
                    schema.table_name, sort_field.logical_name
                ))
            })?;
            check_key_type(sort_field, sort)?;
            item.insert(sort_field.storage_name(dialect).to_string(), sort.clone());
        }

        Ok(item)
    }

    /// Extract the key from a stored item.
    pub fn from_item(item: &Item, schema: &TableSchema, dialect: &str) -> Result<Self> {
        let (partition_field, sort_field) = schema.key_fields()?;
        let partition = item
            .get(partition_field.storage_name(dialect))
            .cloned()
            .ok_or_else(|| {
                Error::InvalidKey(format!(
                    "item has no partition attribute '{}'",
                    partition_field.storage_name(dialect)
                ))
            })?;
        let sort = match sort_field {
            Some(field) => Some(item.get(field.storage_name(dialect)).cloned().ok_or_else(
                || {
                    Error::InvalidKey(format!(
                        "item has no sort attribute '{}'",
                        field.storage_name(dialect)
                    ))
                },
            )?),
            None => None,
        };
        Ok(Self { partition, sort })
    }

    /// Canonical string form, used to detect duplicate keys. Numbers that
    /// compare equal share a fingerprint, so `1` and `1.0` collide.
    pub(crate) fn fingerprint(&self) -> String {
        match &self.sort {
            Some(sort) => format!("{}|{}", component(&self.partition), component(sort)),
            None => component(&self.partition),
        }
    }
}

fn component(value: &AttributeValue) -> String {
    match value {
        AttributeValue::N(n) => {
            if let Some(i) = n.as_i64() {
                return format!("N:{}", i);
            }
            if let Some(u) = n.as_u64() {
                return format!("N:{}", u);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    format!("N:{}", f as i64)
                }
                Some(f) => format!("N:{}", f),
                None => format!("N:{}", n),
            }
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn check_key_type(field: &FieldDef, value: &AttributeValue) -> Result<()> {
    let matches = matches!(
        (field.storage_type, value),
        (crate::StorageType::String, AttributeValue::S(_))
            | (crate::StorageType::Number, AttributeValue::N(_))
            | (crate::StorageType::Binary, AttributeValue::B(_))
    );
    if matches {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            field: field.logical_name.clone(),
            expected: field.storage_type.to_string(),
            got: value.type_name().to_string(),
        })
    }
}

/// Paging position for queries.
///
/// Passed in as the exclusive start key (empty means from the beginning) and
/// overwritten with the last evaluated key (empty means no more pages).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    last_key: Option<Item>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after a raw storage key.
    pub fn from_item(key: Item) -> Self {
        Self {
            last_key: Some(key).filter(|k| !k.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_key.is_none()
    }

    pub fn last_key(&self) -> Option<&Item> {
        self.last_key.as_ref()
    }

    pub(crate) fn replace(&mut self, key: Option<Item>) {
        self.last_key = key.filter(|k| !k.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDef, StorageType};

    fn book_schema() -> TableSchema {
        let mut title = FieldDef::sort("title", StorageType::String);
        title.dialect_names.insert("memory".into(), "t".into());
        TableSchema::new(
            "book",
            vec![
                FieldDef::partition("author", StorageType::String),
                title,
                FieldDef::new("age", StorageType::Number),
            ],
        )
    }

    fn account_schema() -> TableSchema {
        TableSchema::new(
            "account",
            vec![FieldDef::partition("id", StorageType::Number)],
        )
    }

    #[test]
    fn composite_key_uses_storage_names() {
        let item = Key::composite("Tom", "Hello")
            .to_item(&book_schema(), "memory")
            .unwrap();
        assert_eq!(item.get("author"), Some(&AttributeValue::from("Tom")));
        assert_eq!(item.get("t"), Some(&AttributeValue::from("Hello")));
        assert_eq!(item.len(), 2);
    }

    #[test]
    fn sort_value_required_iff_declared() {
        let err = Key::partition("Tom").to_item(&book_schema(), "memory");
        assert!(matches!(err, Err(Error::InvalidKey(_))));

        // dropped silently when the table has no sort key
        let item = Key::composite(10, "ignored")
            .to_item(&account_schema(), "memory")
            .unwrap();
        assert_eq!(item.len(), 1);
    }

    #[test]
    fn empty_partition_rejected() {
        let err = Key::composite("", "x").to_item(&book_schema(), "memory");
        assert!(matches!(err, Err(Error::InvalidKey(_))));
    }

    #[test]
    fn key_type_checked() {
        let err = Key::partition("ten").to_item(&account_schema(), "memory");
        assert!(matches!(err, Err(Error::TypeMismatch { field, .. }) if field == "id"));
    }

    #[test]
    fn key_from_item_roundtrip() {
        let schema = book_schema();
        let key = Key::composite("Tom", "Hello");
        let mut item = key.to_item(&schema, "memory").unwrap();
        item.insert("age".into(), AttributeValue::from(3));
        assert_eq!(Key::from_item(&item, &schema, "memory").unwrap(), key);
    }

    #[test]
    fn cursor_treats_empty_key_as_exhausted() {
        let mut cursor = Cursor::new();
        assert!(cursor.is_empty());
        cursor.replace(Some(Item::new()));
        assert!(cursor.is_empty());
        cursor.replace(Some(Item::from([("a".to_string(), AttributeValue::from(1))])));
        assert!(!cursor.is_empty());
    }

    #[test]
    fn equal_numbers_share_fingerprint() {
        assert_eq!(Key::partition(1).fingerprint(), Key::partition(1.0).fingerprint());
        assert_eq!(
            Key::composite("a", 7u64).fingerprint(),
            Key::composite("a", 7.0).fingerprint()
        );
        assert_ne!(Key::partition(1).fingerprint(), Key::partition(1.5).fingerprint());
        assert_ne!(Key::partition(1).fingerprint(), Key::partition("1").fingerprint());
    }
}
