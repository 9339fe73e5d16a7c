//! Single-field query filters.

use crate::record::Record;
use crate::store::StoreError;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison operator for a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl WhereOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhereOp::Eq => "==",
            WhereOp::NotEq => "!=",
            WhereOp::Lt => "<",
            WhereOp::Lte => "<=",
            WhereOp::Gt => ">",
            WhereOp::Gte => ">=",
            WhereOp::ArrayContains => "array-contains",
            WhereOp::ArrayContainsAny => "array-contains-any",
            WhereOp::In => "in",
            WhereOp::NotIn => "not-in",
        }
    }

    /// Evaluate the operator for a field value against the query value.
    ///
    /// A missing field never matches, not even for `!=` or `not-in`.
    pub fn matches(&self, field: Option<&Value>, value: &Value) -> bool {
        let Some(field) = field else {
            return false;
        };
        match self {
            WhereOp::Eq => field == value,
            WhereOp::NotEq => field != value,
            WhereOp::Lt => compare(field, value) == Some(Ordering::Less),
            WhereOp::Lte => matches!(
                compare(field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            WhereOp::Gt => compare(field, value) == Some(Ordering::Greater),
            WhereOp::Gte => matches!(
                compare(field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            WhereOp::ArrayContains => field
                .as_array()
                .is_some_and(|items| items.contains(value)),
            WhereOp::ArrayContainsAny => match (field.as_array(), value.as_array()) {
                (Some(items), Some(wanted)) => wanted.iter().any(|w| items.contains(w)),
                _ => false,
            },
            WhereOp::In => value
                .as_array()
                .is_some_and(|candidates| candidates.contains(field)),
            WhereOp::NotIn => value
                .as_array()
                .is_some_and(|candidates| !candidates.contains(field)),
        }
    }
}

impl fmt::Display for WhereOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WhereOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim() {
            "==" => WhereOp::Eq,
            "!=" => WhereOp::NotEq,
            "<" => WhereOp::Lt,
            "<=" => WhereOp::Lte,
            ">" => WhereOp::Gt,
            ">=" => WhereOp::Gte,
            "array-contains" => WhereOp::ArrayContains,
            "array-contains-any" => WhereOp::ArrayContainsAny,
            "in" => WhereOp::In,
            "not-in" => WhereOp::NotIn,
            other => return Err(StoreError::InvalidQuery(format!("unknown operator `{other}`"))),
        };
        Ok(op)
    }
}

/// A `field op value` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: WhereOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: WhereOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.op.matches(record.get(&self.field), &self.value)
    }
}

/// Order two JSON scalars of the same type.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
