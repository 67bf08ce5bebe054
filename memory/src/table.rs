//! Ordered per-table storage.
//!
//! Items live under their partition value, ordered by sort value. Numbers
//! order numerically, strings and binary lexicographically.

use crate::expr::{eval, CompareOp, Condition, EvalContext, Operand};
use crate::DIALECT;
use odm_engine::driver::{DriverError, DriverResult};
use odm_engine::{AttributeValue, FieldDef, Item, StorageType, TableSchema};
use serde_json::Number;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A key attribute value with the store's ordering.
#[derive(Debug, Clone)]
pub enum KeyValue {
    Number(Number),
    String(String),
    Binary(Vec<u8>),
}

impl KeyValue {
    fn rank(&self) -> u8 {
        match self {
            KeyValue::Number(_) => 0,
            KeyValue::String(_) => 1,
            KeyValue::Binary(_) => 2,
        }
    }

    /// Convert a key attribute, checking it against the declared type.
    pub fn from_attribute(field: &FieldDef, value: &AttributeValue) -> DriverResult<Self> {
        match (field.storage_type, value) {
            (StorageType::Number, AttributeValue::N(n)) => Ok(KeyValue::Number(n.clone())),
            (StorageType::String, AttributeValue::S(s)) if !s.is_empty() => {
                Ok(KeyValue::String(s.clone()))
            }
            (StorageType::Binary, AttributeValue::B(b)) if !b.is_empty() => {
                Ok(KeyValue::Binary(b.clone()))
            }
            _ => Err(DriverError::Validation(format!(
                "key attribute '{}' must be a non-empty {}, got {}",
                field.storage_name(DIALECT),
                field.storage_type,
                value.type_name()
            ))),
        }
    }

    pub fn to_attribute(&self) -> AttributeValue {
        match self {
            KeyValue::Number(n) => AttributeValue::N(n.clone()),
            KeyValue::String(s) => AttributeValue::S(s.clone()),
            KeyValue::Binary(b) => AttributeValue::B(b.clone()),
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Number(a), KeyValue::Number(b)) => eval::compare_numbers(a, b),
            (KeyValue::String(a), KeyValue::String(b)) => a.cmp(b),
            (KeyValue::Binary(a), KeyValue::Binary(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

/// Primary key of a stored item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrimaryKey {
    pub partition: KeyValue,
    pub sort: Option<KeyValue>,
}

/// Restriction on the sort key of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SortCondition {
    Compare(CompareOp, KeyValue),
    Between(KeyValue, KeyValue),
    BeginsWith(AttributeValue),
}

impl SortCondition {
    fn matches(&self, sort: &KeyValue) -> bool {
        match self {
            SortCondition::Compare(op, value) => {
                let ord = sort.cmp(value);
                match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::Ne => ord != Ordering::Equal,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Ge => ord != Ordering::Less,
                }
            }
            SortCondition::Between(low, high) => sort >= low && sort <= high,
            SortCondition::BeginsWith(prefix) => match (sort, prefix) {
                (KeyValue::String(s), AttributeValue::S(p)) => s.starts_with(p.as_str()),
                (KeyValue::Binary(b), AttributeValue::B(p)) => b.starts_with(p),
                _ => false,
            },
        }
    }
}

/// Partition equality plus optional sort restriction.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub partition: KeyValue,
    pub sort: Option<SortCondition>,
}

/// One table of the in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: TableSchema,
    partitions: BTreeMap<KeyValue, BTreeMap<Option<KeyValue>, Item>>,
}

impl MemoryTable {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            partitions: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    fn key_fields(&self) -> DriverResult<(&FieldDef, Option<&FieldDef>)> {
        self.schema
            .key_fields()
            .map_err(|err| DriverError::Validation(err.to_string()))
    }

    /// Primary key of a full item.
    pub fn key_of(&self, item: &Item) -> DriverResult<PrimaryKey> {
        let (partition_field, sort_field) = self.key_fields()?;
        let partition = key_attribute(item, partition_field)?;
        let sort = sort_field
            .map(|field| key_attribute(item, field))
            .transpose()?;
        Ok(PrimaryKey { partition, sort })
    }

    /// Primary key of a key-only item, as sent with gets and deletes.
    pub fn key_from_request(&self, key: &Item) -> DriverResult<PrimaryKey> {
        let parsed = self.key_of(key)?;
        let expected = 1 + usize::from(parsed.sort.is_some());
        if key.len() != expected {
            return Err(DriverError::Validation(format!(
                "key for table '{}' must hold exactly the key attributes",
                self.schema.table_name
            )));
        }
        Ok(parsed)
    }

    /// Key attributes of `key` as an item.
    pub fn key_item(&self, key: &PrimaryKey) -> DriverResult<Item> {
        let (partition_field, sort_field) = self.key_fields()?;
        let mut item = Item::new();
        item.insert(
            partition_field.storage_name(DIALECT).to_string(),
            key.partition.to_attribute(),
        );
        if let (Some(field), Some(sort)) = (sort_field, &key.sort) {
            item.insert(field.storage_name(DIALECT).to_string(), sort.to_attribute());
        }
        Ok(item)
    }

    pub fn get(&self, key: &PrimaryKey) -> Option<&Item> {
        self.partitions
            .get(&key.partition)
            .and_then(|items| items.get(&key.sort))
    }

    pub fn put(&mut self, key: PrimaryKey, item: Item) -> Option<Item> {
        self.partitions
            .entry(key.partition)
            .or_default()
            .insert(key.sort, item)
    }

    pub fn remove(&mut self, key: &PrimaryKey) -> Option<Item> {
        let items = self.partitions.get_mut(&key.partition)?;
        let removed = items.remove(&key.sort);
        if items.is_empty() {
            self.partitions.remove(&key.partition);
        }
        removed
    }

    /// Items of one partition matching `condition`, in sort order, starting
    /// after `start`. Returns at most `limit` items and whether more remain.
    pub fn query(
        &self,
        condition: &KeyCondition,
        descending: bool,
        start: Option<&Option<KeyValue>>,
        limit: Option<usize>,
    ) -> (Vec<Item>, bool) {
        let Some(items) = self.partitions.get(&condition.partition) else {
            return (Vec::new(), false);
        };

        type Entries<'t> = Box<dyn Iterator<Item = (&'t Option<KeyValue>, &'t Item)> + 't>;
        let range: Entries<'_> = match (start, descending) {
            (None, false) => Box::new(items.iter()),
            (None, true) => Box::new(items.iter().rev()),
            (Some(start), false) => {
                Box::new(items.range((Bound::Excluded(start), Bound::Unbounded)))
            }
            (Some(start), true) => {
                Box::new(items.range((Bound::Unbounded, Bound::Excluded(start))).rev())
            }
        };

        let mut matching = range
            .filter(|(sort, _)| match (&condition.sort, sort) {
                (None, _) => true,
                (Some(cond), Some(sort)) => cond.matches(sort),
                (Some(_), None) => false,
            })
            .map(|(_, item)| item);

        let limit = limit.unwrap_or(usize::MAX);
        let page: Vec<Item> = matching.by_ref().take(limit).cloned().collect();
        let more = matching.next().is_some();
        (page, more)
    }

    /// Turn a parsed key condition into a partition value and sort
    /// restriction.
    pub fn key_condition(
        &self,
        condition: &Condition,
        ctx: &EvalContext<'_>,
    ) -> DriverResult<KeyCondition> {
        let (partition_field, sort_field) = self.key_fields()?;

        let mut clauses = Vec::new();
        flatten_and(condition, &mut clauses);

        let mut partition = None;
        let mut sort = None;
        for clause in clauses {
            if let Some(value) = equality_on(clause, partition_field, ctx)? {
                if partition.replace(value).is_some() {
                    return Err(invalid_key_condition("partition key compared twice"));
                }
                continue;
            }
            let Some(field) = sort_field else {
                return Err(invalid_key_condition("table has no sort key"));
            };
            let restriction = sort_restriction(clause, field, ctx)?;
            if sort.replace(restriction).is_some() {
                return Err(invalid_key_condition("more than one sort key condition"));
            }
        }

        let partition = partition
            .ok_or_else(|| invalid_key_condition("no equality condition on the partition key"))?;
        Ok(KeyCondition { partition, sort })
    }
}

fn key_attribute(item: &Item, field: &FieldDef) -> DriverResult<KeyValue> {
    let name = field.storage_name(DIALECT);
    let value = item
        .get(name)
        .ok_or_else(|| DriverError::Validation(format!("missing key attribute '{}'", name)))?;
    KeyValue::from_attribute(field, value)
}

fn invalid_key_condition(reason: &str) -> DriverError {
    DriverError::Validation(format!("invalid key condition: {}", reason))
}

fn flatten_and<'c>(condition: &'c Condition, out: &mut Vec<&'c Condition>) {
    match condition {
        Condition::And(left, right) => {
            flatten_and(left, out);
            flatten_and(right, out);
        }
        other => out.push(other),
    }
}

fn names_field(operand: &Operand, field: &FieldDef, ctx: &EvalContext<'_>) -> DriverResult<bool> {
    match operand {
        Operand::Path(path) => Ok(ctx.resolve_name(path)? == field.storage_name(DIALECT)),
        _ => Ok(false),
    }
}

fn placeholder_value(
    operand: &Operand,
    field: &FieldDef,
    ctx: &EvalContext<'_>,
) -> DriverResult<KeyValue> {
    match operand {
        Operand::Value(placeholder) => KeyValue::from_attribute(field, ctx.value(placeholder)?),
        _ => Err(invalid_key_condition("key attributes compare against :values only")),
    }
}

/// `field = :v` in either order.
fn equality_on(
    clause: &Condition,
    field: &FieldDef,
    ctx: &EvalContext<'_>,
) -> DriverResult<Option<KeyValue>> {
    let Condition::Compare {
        left,
        op: CompareOp::Eq,
        right,
    } = clause
    else {
        return Ok(None);
    };
    if names_field(left, field, ctx)? {
        placeholder_value(right, field, ctx).map(Some)
    } else if names_field(right, field, ctx)? {
        placeholder_value(left, field, ctx).map(Some)
    } else {
        Ok(None)
    }
}

fn sort_restriction(
    clause: &Condition,
    field: &FieldDef,
    ctx: &EvalContext<'_>,
) -> DriverResult<SortCondition> {
    match clause {
        Condition::Compare { left, op, right } if *op != CompareOp::Ne => {
            if names_field(left, field, ctx)? {
                Ok(SortCondition::Compare(*op, placeholder_value(right, field, ctx)?))
            } else if names_field(right, field, ctx)? {
                Ok(SortCondition::Compare(flip(*op), placeholder_value(left, field, ctx)?))
            } else {
                Err(invalid_key_condition("condition on a non-key attribute"))
            }
        }
        Condition::Between { value, low, high } if names_field(value, field, ctx)? => Ok(
            SortCondition::Between(placeholder_value(low, field, ctx)?, placeholder_value(high, field, ctx)?),
        ),
        Condition::BeginsWith(subject, prefix) if names_field(subject, field, ctx)? => {
            match prefix {
                Operand::Value(placeholder) => {
                    Ok(SortCondition::BeginsWith(ctx.value(placeholder)?.clone()))
                }
                _ => Err(invalid_key_condition("begins_with needs a :value prefix")),
            }
        }
        _ => Err(invalid_key_condition("unsupported sort key condition")),
    }
}

fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        other => other,
    }
}
