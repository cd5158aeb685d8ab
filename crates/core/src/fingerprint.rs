//! Fingerprints: structural trees of typed values
//!
//! A fingerprint distinguishes datasets that represent the same logical
//! benchmark configuration. It is built from a JSON object (usually the
//! values of a test's fingerprint labels) by mapping:
//!
//! - scalars to [`FingerprintValue::Leaf`] nodes (numbers always as `f64`)
//! - objects to [`FingerprintValue::Branch`] nodes, children in key order
//! - arrays to branches whose children carry an empty name
//! - empty objects and arrays to a `Null` leaf
//!
//! Two fingerprints are equal when their trees are deeply, structurally
//! equal. A leaf never equals a branch, whatever their names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Scalar held by a fingerprint leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// String value
    String(String),
    /// Numeric value (always double precision)
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// Null value
    Null,
}

impl ScalarValue {
    /// Convert back to JSON
    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::String(s) => Value::String(s.clone()),
            ScalarValue::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(Value::Null, Value::Number),
            ScalarValue::Bool(b) => Value::Bool(*b),
            ScalarValue::Null => Value::Null,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => write!(f, "{}", s),
            ScalarValue::Number(n) => write!(f, "{}", n),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Null => write!(f, "null"),
        }
    }
}

/// A named node of a fingerprint tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FingerprintValue {
    /// Typed scalar
    Leaf {
        /// Member name
        name: String,
        /// Scalar value
        value: ScalarValue,
    },
    /// Non-empty ordered list of children
    Branch {
        /// Member name
        name: String,
        /// Children, in source order
        children: Vec<FingerprintValue>,
    },
}

impl FingerprintValue {
    /// Build a node from a named JSON value
    pub fn from_json(name: impl Into<String>, value: &Value) -> Self {
        let name = name.into();
        match value {
            Value::Null => FingerprintValue::leaf(name, ScalarValue::Null),
            Value::Bool(b) => FingerprintValue::leaf(name, ScalarValue::Bool(*b)),
            Value::Number(n) => match n.as_f64() {
                Some(f) => FingerprintValue::leaf(name, ScalarValue::Number(f)),
                None => FingerprintValue::leaf(name, ScalarValue::Null),
            },
            Value::String(s) => FingerprintValue::leaf(name, ScalarValue::String(s.clone())),
            Value::Object(obj) if obj.is_empty() => FingerprintValue::leaf(name, ScalarValue::Null),
            Value::Array(arr) if arr.is_empty() => FingerprintValue::leaf(name, ScalarValue::Null),
            Value::Object(obj) => FingerprintValue::Branch {
                name,
                children: obj
                    .iter()
                    .map(|(k, v)| FingerprintValue::from_json(k.as_str(), v))
                    .collect(),
            },
            Value::Array(arr) => FingerprintValue::Branch {
                name,
                children: arr
                    .iter()
                    .map(|v| FingerprintValue::from_json("", v))
                    .collect(),
            },
        }
    }

    fn leaf(name: String, value: ScalarValue) -> Self {
        FingerprintValue::Leaf { name, value }
    }

    /// Member name
    pub fn name(&self) -> &str {
        match self {
            FingerprintValue::Leaf { name, .. } | FingerprintValue::Branch { name, .. } => name,
        }
    }

    /// Scalar value of a leaf
    pub fn value(&self) -> Option<&ScalarValue> {
        match self {
            FingerprintValue::Leaf { value, .. } => Some(value),
            FingerprintValue::Branch { .. } => None,
        }
    }

    /// Children of a branch; empty for a leaf
    pub fn children(&self) -> &[FingerprintValue] {
        match self {
            FingerprintValue::Leaf { .. } => &[],
            FingerprintValue::Branch { children, .. } => children,
        }
    }

    /// True for leaves
    pub fn is_leaf(&self) -> bool {
        matches!(self, FingerprintValue::Leaf { .. })
    }

    /// Convert back to JSON (the value only, without the name)
    pub fn to_json(&self) -> Value {
        match self {
            FingerprintValue::Leaf { value, .. } => value.to_json(),
            FingerprintValue::Branch { children, .. } => {
                if children.iter().all(|c| c.name().is_empty()) {
                    Value::Array(children.iter().map(FingerprintValue::to_json).collect())
                } else {
                    Value::Object(
                        children
                            .iter()
                            .map(|c| (c.name().to_string(), c.to_json()))
                            .collect::<Map<String, Value>>(),
                    )
                }
            }
        }
    }
}

impl fmt::Display for FingerprintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name().is_empty() {
            write!(f, "{}: ", self.name())?;
        }
        match self {
            FingerprintValue::Leaf { value, .. } => write!(f, "{}", value),
            FingerprintValue::Branch { children, .. } => {
                write!(f, "{{")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The fingerprint of one document: its top-level values in key order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprints {
    /// Top-level values
    pub values: Vec<FingerprintValue>,
}

impl Fingerprints {
    /// Fingerprint of one JSON document
    ///
    /// An object yields one value per member. `null` yields an empty
    /// fingerprint; any other value yields a single value with an empty name.
    pub fn from_json(doc: &Value) -> Self {
        let values = match doc {
            Value::Null => Vec::new(),
            Value::Object(obj) => obj
                .iter()
                .map(|(k, v)| FingerprintValue::from_json(k.as_str(), v))
                .collect(),
            other => vec![FingerprintValue::from_json("", other)],
        };
        Fingerprints { values }
    }

    /// Fingerprints of several documents, in input order
    pub fn parse(docs: &[Value]) -> Vec<Fingerprints> {
        docs.iter().map(Fingerprints::from_json).collect()
    }

    /// Convert back to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|v| (v.name().to_string(), v.to_json()))
                .collect::<Map<String, Value>>(),
        )
    }

    /// True when there are no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Fingerprints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}
