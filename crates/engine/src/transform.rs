//! Transformer engine
//!
//! Turns a run payload into the fragment lists of its datasets. This module
//! is pure: it neither stores datasets nor writes the persistent log; it
//! returns the fragments together with the log notes the caller records.
//!
//! Per document unit, every schema-declaring document whose schema is known
//! contributes:
//! - the document itself when the test binds no transformer for the schema
//! - otherwise one contribution per bound transformer
//!
//! A contribution is a single fragment or, when a function returns an
//! array, an expanded list of fragments. Single fragments are copied into
//! every dataset of the unit; expanded lists are distributed index-wise.

use crate::extract::{document_units, gather, schema_documents, Extracted};
use datamill_core::schema::function_input;
use datamill_core::{FunctionError, LogLevel, PathParseError, Transformer, SCHEMA_KEY};
use serde_json::{Map, Value};
use thiserror::Error;

/// Output of one transformer for one document
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    /// One fragment
    Single(Value),
    /// One fragment per dataset, by index
    Expanded(Vec<Value>),
}

/// Why a transformer produced nothing
#[derive(Debug, Error)]
pub enum TransformError {
    /// A required extractor matched nothing; the schema does not apply
    #[error("required extractor '{0}' matched nothing")]
    MissingRequired(String),
    /// An extractor path does not parse
    #[error("invalid extractor path: {0}")]
    Path(#[from] PathParseError),
    /// The transformation function failed
    #[error("{0}")]
    Function(#[from] FunctionError),
}

/// A persistent log entry to be recorded by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Severity
    pub level: LogLevel,
    /// Message
    pub message: String,
}

impl Note {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Note {
            level,
            message: message.into(),
        }
    }
}

/// Fragment lists of every dataset of a run, in ordinal order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPlan {
    /// One entry per dataset
    pub datasets: Vec<Vec<Value>>,
    /// Log notes produced while planning
    pub notes: Vec<Note>,
}

fn stamp_target(mut fragment: Value, target: Option<&str>) -> Value {
    if let (Some(uri), Value::Object(obj)) = (target, &mut fragment) {
        obj.insert(SCHEMA_KEY.to_string(), Value::String(uri.to_string()));
    }
    fragment
}

fn identity(args: Vec<(String, Extracted)>) -> Option<Value> {
    if !args.is_empty()
        && args
            .iter()
            .all(|(_, v)| matches!(v, Extracted::Many(items) if items.is_empty()))
    {
        return None;
    }
    Some(Value::Object(
        args.into_iter()
            .map(|(name, v)| (name, v.into_json()))
            .collect::<Map<String, Value>>(),
    ))
}

/// Apply one transformer to a schema document
///
/// `Ok(None)` means the transformer legitimately produced nothing: an empty
/// array match with the identity function, or a function returning null.
pub fn apply(doc: &Value, transformer: &Transformer) -> Result<Option<Contribution>, TransformError> {
    let args = gather(doc, &transformer.extractors)?;
    if let Some(name) = args.missing_required {
        return Err(TransformError::MissingRequired(name));
    }
    let target = transformer.target_schema_uri.as_deref();

    let output = match &transformer.function {
        None if transformer.extractors.is_empty() => Some(doc.clone()),
        None => identity(args.values),
        Some(function) => {
            let input = if transformer.extractors.is_empty() {
                doc.clone()
            } else {
                function_input(
                    args.values
                        .into_iter()
                        .map(|(name, v)| (name, v.into_json()))
                        .collect(),
                )
            };
            match function.call(&input)? {
                Value::Null => None,
                Value::Array(items) => {
                    return Ok(Some(Contribution::Expanded(
                        items.into_iter().map(|f| stamp_target(f, target)).collect(),
                    )))
                }
                other => Some(other),
            }
        }
    };
    Ok(output.map(|f| Contribution::Single(stamp_target(f, target))))
}

/// Combine the contributions of one document unit into dataset fragment lists
fn combine(contributions: Vec<Contribution>, unit: usize, notes: &mut Vec<Note>) -> Vec<Vec<Value>> {
    let lengths: Vec<usize> = contributions
        .iter()
        .filter_map(|c| match c {
            Contribution::Expanded(items) => Some(items.len()),
            Contribution::Single(_) => None,
        })
        .collect();
    let has_single = contributions
        .iter()
        .any(|c| matches!(c, Contribution::Single(_)));

    let count = match lengths.iter().max() {
        Some(&0) | None if has_single => 1,
        Some(&max) => max,
        None => 0,
    };
    if lengths.windows(2).any(|w| w[0] != w[1]) {
        notes.push(Note::new(
            LogLevel::Warning,
            format!(
                "Document {} expanded into fragment lists of different lengths {:?}; producing {} datasets",
                unit, lengths, count
            ),
        ));
    }

    (0..count)
        .map(|i| {
            contributions
                .iter()
                .filter_map(|c| match c {
                    Contribution::Single(f) => Some(f.clone()),
                    Contribution::Expanded(items) => items.get(i).cloned(),
                })
                .collect()
        })
        .collect()
}

/// Plan the datasets of a payload
///
/// `lookup` returns the transformers the test binds for a schema URI, or
/// `None` when the schema is not registered.
pub fn plan_run<F>(payload: &Value, lookup: F) -> RunPlan
where
    F: Fn(&str) -> Option<Vec<Transformer>>,
{
    let mut plan = RunPlan::default();

    for (unit_index, unit) in document_units(payload).into_iter().enumerate() {
        let mut contributions = Vec::new();

        for schema_doc in schema_documents(unit) {
            let Some(transformers) = lookup(schema_doc.uri) else {
                continue;
            };
            if transformers.is_empty() {
                contributions.push(Contribution::Single(schema_doc.doc.clone()));
                continue;
            }

            let mut produced = Vec::new();
            let mut skipped = None;
            for transformer in &transformers {
                match apply(schema_doc.doc, transformer) {
                    Ok(Some(c)) => produced.push(c),
                    Ok(None) => {}
                    Err(TransformError::MissingRequired(extractor)) => {
                        skipped = Some((transformer.name.clone(), extractor));
                        break;
                    }
                    Err(e) => plan.notes.push(Note::new(
                        LogLevel::Error,
                        format!(
                            "Transformer '{}' failed on document {} of schema {}: {}",
                            transformer.name, unit_index, schema_doc.uri, e
                        ),
                    )),
                }
            }

            match skipped {
                Some((transformer, extractor)) => plan.notes.push(Note::new(
                    LogLevel::Debug,
                    format!(
                        "Schema {} skipped for document {}: required extractor '{}' of transformer '{}' matched nothing",
                        schema_doc.uri, unit_index, extractor, transformer
                    ),
                )),
                None => contributions.extend(produced),
            }
        }

        let datasets = combine(contributions, unit_index, &mut plan.notes);
        plan.datasets.extend(datasets);
    }
    plan
}
