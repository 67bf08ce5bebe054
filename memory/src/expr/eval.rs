//! Expression evaluation against one item.

use super::ast::{CompareOp, Condition, Operand, SetOperand, SetValue, Update, UpdateAction};
use super::parser::{ExpressionError, ExpressionResult};
use odm_engine::{AttributeValue, Item};
use serde_json::Number;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// An item plus the placeholder substitutions of one request.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub item: &'a Item,
    pub names: &'a BTreeMap<String, String>,
    pub values: &'a BTreeMap<String, AttributeValue>,
}

impl<'a> EvalContext<'a> {
    /// Attribute name behind a path, resolving `#placeholders`.
    pub fn resolve_name<'p>(&self, path: &'p str) -> ExpressionResult<&'p str>
    where
        'a: 'p,
    {
        if path.starts_with('#') {
            self.names
                .get(path)
                .map(String::as_str)
                .ok_or_else(|| ExpressionError::UnresolvedName(path.to_string()))
        } else {
            Ok(path)
        }
    }

    pub fn value(&self, placeholder: &str) -> ExpressionResult<&'a AttributeValue> {
        self.values
            .get(placeholder)
            .ok_or_else(|| ExpressionError::UnresolvedValue(placeholder.to_string()))
    }

    fn attribute(&self, path: &str) -> ExpressionResult<Option<&'a AttributeValue>> {
        let name = self.resolve_name(path)?;
        Ok(self.item.get(name))
    }

    fn operand(&self, operand: &Operand) -> ExpressionResult<Option<AttributeValue>> {
        match operand {
            Operand::Path(path) => Ok(self.attribute(path)?.cloned()),
            Operand::Value(placeholder) => Ok(Some(self.value(placeholder)?.clone())),
            Operand::Size(path) => Ok(self.attribute(path)?.and_then(size_of).map(AttributeValue::from)),
        }
    }

    /// Evaluate a condition. Missing attributes make comparisons false.
    pub fn evaluate(&self, condition: &Condition) -> ExpressionResult<bool> {
        match condition {
            Condition::Compare { left, op, right } => {
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                Ok(match (left, right) {
                    (Some(l), Some(r)) => compare_op(&l, *op, &r),
                    _ => *op == CompareOp::Ne,
                })
            }
            Condition::Between { value, low, high } => {
                let (Some(v), Some(lo), Some(hi)) =
                    (self.operand(value)?, self.operand(low)?, self.operand(high)?)
                else {
                    return Ok(false);
                };
                Ok(matches!(
                    compare(&v, &lo),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(compare(&v, &hi), Some(Ordering::Less | Ordering::Equal)))
            }
            Condition::In { value, list } => {
                let Some(v) = self.operand(value)? else {
                    return Ok(false);
                };
                for candidate in list {
                    if let Some(c) = self.operand(candidate)? {
                        if values_equal(&v, &c) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Condition::AttributeExists(path) => Ok(self.attribute(path)?.is_some()),
            Condition::AttributeNotExists(path) => Ok(self.attribute(path)?.is_none()),
            Condition::BeginsWith(subject, prefix) => {
                Ok(match (self.operand(subject)?, self.operand(prefix)?) {
                    (Some(AttributeValue::S(s)), Some(AttributeValue::S(p))) => s.starts_with(&p),
                    (Some(AttributeValue::B(b)), Some(AttributeValue::B(p))) => b.starts_with(&p),
                    _ => false,
                })
            }
            Condition::Contains(subject, needle) => {
                Ok(match (self.operand(subject)?, self.operand(needle)?) {
                    (Some(AttributeValue::S(s)), Some(AttributeValue::S(n))) => s.contains(&n),
                    (Some(AttributeValue::L(list)), Some(n)) => {
                        list.iter().any(|element| values_equal(element, &n))
                    }
                    _ => false,
                })
            }
            Condition::And(left, right) => Ok(self.evaluate(left)? && self.evaluate(right)?),
            Condition::Or(left, right) => Ok(self.evaluate(left)? || self.evaluate(right)?),
            Condition::Not(inner) => Ok(!self.evaluate(inner)?),
        }
    }

    /// Apply an update and return the new item. Every operand reads the item
    /// as it was before the update.
    pub fn apply_update(&self, update: &Update) -> ExpressionResult<Item> {
        let mut next = self.item.clone();

        for action in &update.actions {
            match action {
                UpdateAction::Set { path, value } => {
                    let name = self.resolve_name(path)?.to_string();
                    let value = self.set_value(value)?;
                    next.insert(name, value);
                }
                UpdateAction::Remove { path } => {
                    next.remove(self.resolve_name(path)?);
                }
                UpdateAction::Add { path, value } => {
                    let name = self.resolve_name(path)?;
                    let delta = match self.operand(value)? {
                        Some(AttributeValue::N(n)) => n,
                        _ => {
                            return Err(ExpressionError::InvalidOperand(format!(
                                "ADD to {} needs a number",
                                name
                            )))
                        }
                    };
                    let sum = match self.item.get(name) {
                        None => delta,
                        Some(AttributeValue::N(current)) => arithmetic(current, &delta, false)?,
                        Some(other) => {
                            return Err(ExpressionError::InvalidOperand(format!(
                                "ADD to {} which holds {}",
                                name,
                                other.type_name()
                            )))
                        }
                    };
                    next.insert(name.to_string(), AttributeValue::N(sum));
                }
            }
        }

        Ok(next)
    }

    fn set_value(&self, value: &SetValue) -> ExpressionResult<AttributeValue> {
        match value {
            SetValue::Single(operand) => self.set_operand(operand),
            SetValue::Plus(left, right) | SetValue::Minus(left, right) => {
                let subtract = matches!(value, SetValue::Minus(..));
                match (self.set_operand(left)?, self.set_operand(right)?) {
                    (AttributeValue::N(l), AttributeValue::N(r)) => {
                        Ok(AttributeValue::N(arithmetic(&l, &r, subtract)?))
                    }
                    (l, r) => Err(ExpressionError::InvalidOperand(format!(
                        "arithmetic on {} and {}",
                        l.type_name(),
                        r.type_name()
                    ))),
                }
            }
        }
    }

    fn set_operand(&self, operand: &SetOperand) -> ExpressionResult<AttributeValue> {
        match operand {
            SetOperand::Operand(operand) => self.operand(operand)?.ok_or_else(|| {
                ExpressionError::InvalidOperand(format!(
                    "update refers to missing attribute {:?}",
                    operand
                ))
            }),
            SetOperand::IfNotExists(path, fallback) => match self.attribute(path)? {
                Some(current) => Ok(current.clone()),
                None => self.operand(fallback)?.ok_or_else(|| {
                    ExpressionError::InvalidOperand(format!("missing fallback {:?}", fallback))
                }),
            },
            SetOperand::ListAppend(first, second) => {
                match (self.set_operand(first)?, self.set_operand(second)?) {
                    (AttributeValue::L(mut a), AttributeValue::L(b)) => {
                        a.extend(b);
                        Ok(AttributeValue::L(a))
                    }
                    (a, b) => Err(ExpressionError::InvalidOperand(format!(
                        "list_append on {} and {}",
                        a.type_name(),
                        b.type_name()
                    ))),
                }
            }
        }
    }

    /// Keep only the named attributes.
    pub fn project(&self, paths: &[String]) -> ExpressionResult<Item> {
        let mut projected = Item::new();
        for path in paths {
            let name = self.resolve_name(path)?;
            if let Some(value) = self.item.get(name) {
                projected.insert(name.to_string(), value.clone());
            }
        }
        Ok(projected)
    }
}

fn size_of(value: &AttributeValue) -> Option<u64> {
    let len = match value {
        AttributeValue::S(s) => s.chars().count(),
        AttributeValue::B(b) => b.len(),
        AttributeValue::L(l) => l.len(),
        AttributeValue::M(m) => m.len(),
        _ => return None,
    };
    u64::try_from(len).ok()
}

fn compare_op(left: &AttributeValue, op: CompareOp, right: &AttributeValue) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt => compare(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => compare(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
pub(crate) fn values_equal(left: &AttributeValue, right: &AttributeValue) -> bool {
    match (left, right) {
        (AttributeValue::N(l), AttributeValue::N(r)) => compare_numbers(l, r) == Ordering::Equal,
        _ => left == right,
    }
}

/// Ordering between values of the same scalar type; `None` otherwise.
pub(crate) fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::N(l), AttributeValue::N(r)) => Some(compare_numbers(l, r)),
        (AttributeValue::S(l), AttributeValue::S(r)) => Some(l.cmp(r)),
        (AttributeValue::B(l), AttributeValue::B(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

pub(crate) fn compare_numbers(left: &Number, right: &Number) -> Ordering {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        return l.cmp(&r);
    }
    if let (Some(l), Some(r)) = (left.as_u64(), right.as_u64()) {
        return l.cmp(&r);
    }
    let l = left.as_f64().unwrap_or(f64::NAN);
    let r = right.as_f64().unwrap_or(f64::NAN);
    l.total_cmp(&r)
}

fn arithmetic(left: &Number, right: &Number, subtract: bool) -> ExpressionResult<Number> {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        let result = if subtract {
            l.checked_sub(r)
        } else {
            l.checked_add(r)
        };
        if let Some(n) = result {
            return Ok(Number::from(n));
        }
    }
    let l = left.as_f64().unwrap_or(f64::NAN);
    let r = right.as_f64().unwrap_or(f64::NAN);
    let result = if subtract { l - r } else { l + r };
    Number::from_f64(result)
        .ok_or_else(|| ExpressionError::InvalidOperand("arithmetic overflowed".to_string()))
}
