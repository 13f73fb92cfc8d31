//! Predicates over encoded documents.
//!
//! A [`Predicate`] is evaluated against a document's canonical tree. Field
//! access goes through a [`FieldPath`], a dotted path such as
//! `ChildObject.Hello` that walks nested maps (and arrays, for numeric
//! segments).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ciborium::value::Value;

use crate::error::{CoreError, Result};

/// A dotted path into a document tree.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(CoreError::InvalidPath("path is empty".into()));
        }
        let segments: Vec<String> = path.split('.').map(String::from).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::InvalidPath(format!("empty segment in '{}'", path)));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve the path against a tree. `None` if any segment is missing.
    ///
    /// Tags are transparent: a tagged node resolves through its content.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match untag(current) {
                Value::Map(entries) => entries
                    .iter()
                    .find(|(k, _)| matches!(k, Value::Text(t) if t == segment))
                    .map(|(_, v)| v)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn untag(mut value: &Value) -> &Value {
    while let Value::Tag(_, inner) = value {
        value = inner.as_ref();
    }
    value
}

impl FromStr for FieldPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({})", self)
    }
}

/// Comparison operator for [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A filter over encoded documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Compare the value at `path` with `value`.
    Compare {
        path: FieldPath,
        op: CompareOp,
        value: Value,
    },
    /// The sequence at `path` has an element equal to `value`, or the text
    /// at `path` contains `value` as a substring.
    Contains { path: FieldPath, value: Value },
    /// `path` resolves to something, including null.
    Exists(FieldPath),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(path: FieldPath, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            path,
            op,
            value: value.into(),
        }
    }

    pub fn eq(path: FieldPath, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Eq, value)
    }

    pub fn ne(path: FieldPath, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Ne, value)
    }

    pub fn contains(path: FieldPath, value: impl Into<Value>) -> Self {
        Predicate::Contains {
            path,
            value: value.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut all) => {
                all.push(other);
                Predicate::And(all)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut any) => {
                any.push(other);
                Predicate::Or(any)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluate the predicate against a document tree.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Predicate::Compare { path, op, value } => match path.resolve(doc) {
                Some(found) => {
                    let ord = compare_values(found, value);
                    match op {
                        CompareOp::Eq => ord == Some(Ordering::Equal),
                        CompareOp::Ne => ord != Some(Ordering::Equal),
                        CompareOp::Gt => ord == Some(Ordering::Greater),
                        CompareOp::Ge => {
                            matches!(ord, Some(Ordering::Greater | Ordering::Equal))
                        }
                        CompareOp::Lt => ord == Some(Ordering::Less),
                        CompareOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    }
                }
                None => *op == CompareOp::Ne,
            },
            Predicate::Contains { path, value } => match path.resolve(doc) {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| compare_values(item, value) == Some(Ordering::Equal)),
                Some(Value::Text(text)) => match value {
                    Value::Text(needle) => text.contains(needle.as_str()),
                    _ => false,
                },
                _ => false,
            },
            Predicate::Exists(path) => path.resolve(doc).is_some(),
            Predicate::And(all) => all.iter().all(|p| p.matches(doc)),
            Predicate::Or(any) => any.iter().any(|p| p.matches(doc)),
            Predicate::Not(inner) => !inner.matches(doc),
        }
    }
}

/// Order two tree values.
///
/// Integers and floats compare numerically with each other. Other kinds
/// only compare with their own kind; maps and arrays only compare for
/// equality. `None` means the values are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => {
            let x: i128 = (*x).into();
            let y: i128 = (*y).into();
            Some(x.cmp(&y))
        }
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Float(y)) => {
            let x: i128 = (*x).into();
            (x as f64).partial_cmp(y)
        }
        (Value::Float(x), Value::Integer(y)) => {
            let y: i128 = (*y).into();
            x.partial_cmp(&(y as f64))
        }
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Tag(tx, x), Value::Tag(ty, y)) if tx == ty => compare_values(x, y),
        (Value::Array(_), Value::Array(_)) | (Value::Map(_), Value::Map(_)) => {
            if a == b {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
        _ => None,
    }
}
