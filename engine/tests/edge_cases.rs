//! Edge case tests for odm-engine
//!
//! These tests cover boundary conditions and unusual inputs that do not
//! need a store.

use odm_engine::record::{from_item, to_item};
use odm_engine::{
    derive_schema, dialect, equality_expression, AttributeValue, Error, FieldDef, Key, Record,
    SchemaBuilder, StorageType, TableSchema,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Reading {
    sensor: String,
    taken_at: u64,
    value: f64,
    delta: i64,
    raw: Vec<u8>,
    note: Option<String>,
}

impl Record for Reading {
    fn describe(schema: &mut SchemaBuilder) {
        schema.field::<String>("sensor").partition_key();
        schema.field::<u64>("taken_at").sort_key();
        schema.field::<f64>("value");
        schema.field::<i64>("delta");
        schema.field::<Vec<u8>>("raw");
        schema.field::<Option<String>>("note").omit_empty();
    }
}

fn reading(sensor: &str) -> Reading {
    Reading {
        sensor: sensor.into(),
        taken_at: 1,
        ..Reading::default()
    }
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn unicode_keys_round_trip() {
    let schema = derive_schema::<Reading>();
    let names = vec![
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
    ];

    for name in names {
        let item = to_item(&reading(name), &schema, "memory").unwrap();
        assert_eq!(item.get("sensor"), Some(&AttributeValue::from(name)));
        let back: Reading = from_item(item, &schema, "memory").unwrap();
        assert_eq!(back.sensor, name);
    }
}

#[test]
fn empty_partition_value_is_invalid() {
    let schema = derive_schema::<Reading>();
    let err = to_item(&reading(""), &schema, "memory").unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)), "{err:?}");

    let err = Key::composite("", 1).to_item(&schema, "memory").unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)), "{err:?}");
}

#[test]
fn empty_optional_is_omitted() {
    let schema = derive_schema::<Reading>();
    let mut r = reading("s");
    r.note = Some(String::new());
    let item = to_item(&r, &schema, "memory").unwrap();
    assert!(!item.contains_key("note"));
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn integer_boundaries() {
    let schema = derive_schema::<Reading>();
    for delta in [i64::MIN, -1, 0, 1, i64::MAX] {
        let r = Reading {
            delta,
            taken_at: u64::MAX,
            ..reading("s")
        };
        let item = to_item(&r, &schema, "memory").unwrap();
        let back: Reading = from_item(item, &schema, "memory").unwrap();
        assert_eq!(back, r);
    }
}

#[test]
fn floats_survive() {
    let schema = derive_schema::<Reading>();
    let r = Reading {
        value: -0.000_123_5,
        ..reading("s")
    };
    let item = to_item(&r, &schema, "memory").unwrap();
    let back: Reading = from_item(item, &schema, "memory").unwrap();
    assert_eq!(back.value, r.value);
}

#[test]
fn wrong_type_reports_field() {
    let schema = derive_schema::<Reading>();
    let doc = json!({"sensor": "s", "taken_at": 1, "value": "high"});
    let doc = doc.as_object().cloned().unwrap();
    let err = odm_engine::record::document_to_item(&doc, &schema, "memory").unwrap_err();
    match err {
        Error::TypeMismatch { field, got, .. } => {
            assert_eq!(field, "value");
            assert_eq!(got, "String");
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ============================================================================
// Expressions and Registry
// ============================================================================

#[test]
fn equality_expression_from_map() {
    let fields = json!({"author": "Jack", "age": 3});
    let (expression, values) = equality_expression(fields.as_object().unwrap());
    assert_eq!(expression, "age = :age AND author = :author");
    assert_eq!(values.get(":age"), Some(&AttributeValue::from(3)));
    assert_eq!(values.get(":author"), Some(&AttributeValue::from("Jack")));

    let (expression, values) = equality_expression(&Default::default());
    assert!(expression.is_empty());
    assert!(values.is_empty());
}

#[test]
fn unknown_dialect_is_configuration() {
    let err = dialect::open("no-such-dialect", "")
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err:?}");
}

// ============================================================================
// Schema Ordering
// ============================================================================

fn storage_type() -> impl Strategy<Value = StorageType> {
    prop_oneof![
        Just(StorageType::String),
        Just(StorageType::Number),
        Just(StorageType::Binary),
    ]
}

proptest! {
    #[test]
    fn fields_ordered_partition_sort_then_by_name(
        names in proptest::collection::btree_set("[a-z]{1,8}", 2..12),
        with_sort in any::<bool>(),
        kind in storage_type(),
        seed in any::<u64>(),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let partition = names[0].clone();
        let sort = with_sort.then(|| names[1].clone());

        let mut fields: Vec<FieldDef> = names
            .iter()
            .map(|name| {
                if *name == partition {
                    FieldDef::partition(name.as_str(), kind)
                } else if Some(name) == sort.as_ref() {
                    FieldDef::sort(name.as_str(), kind)
                } else {
                    FieldDef::new(name.as_str(), kind)
                }
            })
            .collect();
        // shuffle deterministically
        let len = fields.len();
        fields.rotate_left((seed % len as u64) as usize);

        let schema = TableSchema::new("t", fields);
        prop_assert!(schema.validate().is_ok());
        prop_assert_eq!(&schema.fields[0].logical_name, &partition);

        let rest_start = if let Some(sort) = &sort {
            prop_assert_eq!(&schema.fields[1].logical_name, sort);
            2
        } else {
            1
        };
        let rest: Vec<&String> = schema.fields[rest_start..].iter().map(|f| &f.logical_name).collect();
        let mut sorted = rest.clone();
        sorted.sort();
        prop_assert_eq!(rest, sorted);
    }
}
