//! Extractor evaluation over schema-matched documents
//!
//! A run payload is split into document units: the root value, or each
//! element when the root is an array. Within a unit, the unit itself and
//! each of its first-level members may declare a schema through `$schema`;
//! every such declaration is a [`SchemaDocument`].

use datamill_core::schema::declared_schema;
use datamill_core::{Extractor, PathExpr, PathParseError};
use serde_json::Value;

/// A document declaring a schema, found inside a document unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchemaDocument<'a> {
    /// Declared schema URI
    pub uri: &'a str,
    /// The declaring document
    pub doc: &'a Value,
}

/// Document units of a payload, in document order
pub fn document_units(payload: &Value) -> Vec<&Value> {
    match payload {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Schema-declaring documents of one unit: the unit first, then its members in key order
pub fn schema_documents(unit: &Value) -> Vec<SchemaDocument<'_>> {
    let mut found = Vec::new();
    if let Some(uri) = declared_schema(unit) {
        found.push(SchemaDocument { uri, doc: unit });
    }
    if let Value::Object(members) = unit {
        for value in members.values() {
            if let Some(uri) = declared_schema(value) {
                found.push(SchemaDocument { uri, doc: value });
            }
        }
    }
    found
}

/// First document in the payload declaring `uri`
pub fn find_schema_document<'a>(payload: &'a Value, uri: &str) -> Option<&'a Value> {
    document_units(payload)
        .into_iter()
        .flat_map(schema_documents)
        .find(|d| d.uri == uri)
        .map(|d| d.doc)
}

/// Value produced by one extractor
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// First match of a single-value extractor
    Value(Value),
    /// Every match of an array extractor, possibly none
    Many(Vec<Value>),
    /// A single-value extractor matched nothing
    Missing,
}

impl Extracted {
    /// Nothing was matched
    pub fn is_empty(&self) -> bool {
        match self {
            Extracted::Value(_) => false,
            Extracted::Many(values) => values.is_empty(),
            Extracted::Missing => true,
        }
    }

    /// JSON form: missing becomes null, array matches become an array
    pub fn into_json(self) -> Value {
        match self {
            Extracted::Value(v) => v,
            Extracted::Many(values) => Value::Array(values),
            Extracted::Missing => Value::Null,
        }
    }
}

/// Evaluate one extractor against a document
pub fn evaluate(doc: &Value, extractor: &Extractor) -> Result<Extracted, PathParseError> {
    let path: PathExpr = extractor.parse_path()?;
    Ok(evaluate_path(doc, &path, extractor.array))
}

/// Evaluate a parsed path in single or array mode
pub fn evaluate_path(doc: &Value, path: &PathExpr, array: bool) -> Extracted {
    if array {
        Extracted::Many(path.query(doc).into_iter().cloned().collect())
    } else {
        path.first(doc).cloned().map_or(Extracted::Missing, Extracted::Value)
    }
}

/// Named extractor outputs of one document
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments {
    /// `(extractor name, value)` in extractor order
    pub values: Vec<(String, Extracted)>,
    /// Name of a required extractor that matched nothing
    pub missing_required: Option<String>,
}

/// Evaluate every extractor of an owner (transformer or label)
pub fn gather(doc: &Value, extractors: &[Extractor]) -> Result<Arguments, PathParseError> {
    let mut values = Vec::with_capacity(extractors.len());
    let mut missing_required = None;
    for extractor in extractors {
        let extracted = evaluate(doc, extractor)?;
        if extractor.required && missing_required.is_none() && extracted.is_empty() {
            missing_required = Some(extractor.name.clone());
        }
        values.push((extractor.name.clone(), extracted));
    }
    Ok(Arguments {
        values,
        missing_required,
    })
}
