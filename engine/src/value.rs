//! Attribute values exchanged with the driver.
//!
//! Records travel through `serde_json::Value`; the driver sees items made of
//! [`AttributeValue`]s keyed by storage name.

use crate::{error::Result, StorageType};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// A stored item: storage attribute name to value.
pub type Item = BTreeMap<String, AttributeValue>;

/// A record in its serde form, keyed by record field name.
pub type Document = serde_json::Map<String, Value>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    N(Number),
    S(String),
    B(Vec<u8>),
    L(Vec<AttributeValue>),
    M(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Convert any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::from_json(serde_json::to_value(value)?))
    }

    /// Convert a JSON value without a storage hint. Arrays stay lists.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::Number(n) => AttributeValue::N(n),
            Value::String(s) => AttributeValue::S(s),
            Value::Array(values) => {
                AttributeValue::L(values.into_iter().map(Self::from_json).collect())
            }
            Value::Object(map) => AttributeValue::M(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back into the JSON form serde expects. Binary becomes an
    /// array of byte numbers, which is how `Vec<u8>` deserializes.
    pub fn into_json(self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(b),
            AttributeValue::N(n) => Value::Number(n),
            AttributeValue::S(s) => Value::String(s),
            AttributeValue::B(bytes) => {
                Value::Array(bytes.into_iter().map(Value::from).collect())
            }
            AttributeValue::L(values) => {
                Value::Array(values.into_iter().map(Self::into_json).collect())
            }
            AttributeValue::M(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect(),
            ),
        }
    }

    /// Short type tag used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "NULL",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::N(_) => "N",
            AttributeValue::S(_) => "S",
            AttributeValue::B(_) => "B",
            AttributeValue::L(_) => "L",
            AttributeValue::M(_) => "M",
        }
    }

    /// Storage type this value can be keyed as, if any.
    pub fn storage_type(&self) -> Option<StorageType> {
        match self {
            AttributeValue::S(_) => Some(StorageType::String),
            AttributeValue::N(_) | AttributeValue::Bool(_) => Some(StorageType::Number),
            AttributeValue::B(_) => Some(StorageType::Binary),
            _ => None,
        }
    }

    /// Null, or a string/binary/list/map of length zero.
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::S(s) => s.is_empty(),
            AttributeValue::B(b) => b.is_empty(),
            AttributeValue::L(l) => l.is_empty(),
            AttributeValue::M(m) => m.is_empty(),
            AttributeValue::Bool(_) | AttributeValue::N(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::S(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        AttributeValue::B(value)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(value: &[u8]) -> Self {
        AttributeValue::B(value.to_vec())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(AttributeValue::N)
            .unwrap_or(AttributeValue::Null)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    AttributeValue::N(Number::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
