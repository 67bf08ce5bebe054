//! Expression parameters.
//!
//! Expressions (conditions, updates, key conditions, projections) are opaque
//! strings here. Only their `#name` and `:value` placeholders are bound and
//! forwarded to the driver.

use crate::{AttributeValue, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name and value substitutions handed to the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionAttributes {
    /// `#placeholder` -> attribute name
    pub names: BTreeMap<String, String>,
    /// `:placeholder` -> value
    pub values: BTreeMap<String, AttributeValue>,
}

impl ExpressionAttributes {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.values.is_empty()
    }
}

/// Translate placeholder maps into driver substitutions. Empty maps give
/// empty substitution sets.
pub fn bind(
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
) -> ExpressionAttributes {
    ExpressionAttributes {
        names: names.clone(),
        values: values.clone(),
    }
}

/// `{"a": 1, "b": "x"}` -> `"a = :a AND b = :b"` plus the `:a`/`:b` values.
pub fn equality_expression(fields: &Document) -> (String, BTreeMap<String, AttributeValue>) {
    let mut clauses = Vec::with_capacity(fields.len());
    let mut values = BTreeMap::new();
    for (name, value) in fields {
        clauses.push(format!("{} = :{}", name, name));
        values.insert(format!(":{}", name), AttributeValue::from_json(value.clone()));
    }
    (clauses.join(" AND "), values)
}

/// A write precondition.
///
/// An empty expression makes the whole spec inert: its parameters are not
/// sent with puts, deletes or checks. Updates always forward parameters
/// because the update expression may use them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSpec {
    pub expression: Option<String>,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, AttributeValue>,
}

impl ConditionSpec {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::default()
        }
    }

    /// Parameters only, for update expressions without a precondition.
    pub fn params() -> Self {
        Self::default()
    }

    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.values.insert(placeholder.into(), value.into());
        self
    }

    /// The expression, if non-empty.
    pub fn condition(&self) -> Option<&str> {
        self.expression.as_deref().filter(|e| !e.trim().is_empty())
    }

    pub fn attributes(&self) -> ExpressionAttributes {
        bind(&self.names, &self.values)
    }

    /// True if parameters are set but there is no expression to use them.
    pub(crate) fn is_inert(&self) -> bool {
        self.condition().is_none() && !(self.names.is_empty() && self.values.is_empty())
    }

    /// Expression and substitutions for a put, delete or check. Inert
    /// parameters are dropped.
    pub(crate) fn write_parts(&self) -> (Option<String>, ExpressionAttributes) {
        match self.condition() {
            Some(expr) => (Some(expr.to_string()), self.attributes()),
            None => (None, ExpressionAttributes::default()),
        }
    }

    /// Expression and substitutions for an update. Parameters are always
    /// forwarded.
    pub(crate) fn update_parts(&self) -> (Option<String>, ExpressionAttributes) {
        (self.condition().map(str::to_string), self.attributes())
    }
}

/// Options for a single-item read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub consistent: bool,
    pub projection: Option<String>,
    pub names: BTreeMap<String, String>,
}

impl GetOptions {
    pub fn consistent() -> Self {
        Self {
            consistent: true,
            ..Self::default()
        }
    }

    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }
}

/// A query against one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    /// Key condition; empty selects the scan path
    pub key_condition: String,
    pub filter: Option<String>,
    pub projection: Option<String>,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, AttributeValue>,
    pub consistent: bool,
    pub limit: Option<usize>,
    pub index_name: Option<String>,
    /// Sort key descending; ascending by default
    pub descending: bool,
}

impl QuerySpec {
    pub fn new(key_condition: impl Into<String>) -> Self {
        Self {
            key_condition: key_condition.into(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.values.insert(placeholder.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn consistent(mut self) -> Self {
        self.consistent = true;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}
