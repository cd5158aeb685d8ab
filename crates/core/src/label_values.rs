//! Label value projection and filtering
//!
//! Computed label values of a dataset form a JSON object
//! `{labelName: value}`. A [`LabelValuesQuery`] selects rows with a filter,
//! orders them, projects each row's values through include/exclude lists
//! and finally paginates.
//!
//! # Filter semantics
//!
//! The filter maps label names to expected values. A row passes when every
//! label in the filter passes (AND across labels):
//!
//! - a label the row does not have never passes
//! - single-value mode compares the stored value with the expected value
//!   using type-aware equality (numbers compare as `f64`)
//! - multi-select mode (`multi_filter`) treats an array of expected values
//!   as alternatives (OR); only candidates of the same JSON type as the
//!   stored value take part in the comparison

use crate::error::{Error, Result};
use crate::pagination::{Pagination, SortDirection};
use crate::types::{DatasetId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Label values of one dataset as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedLabelValues {
    /// Label name to computed value, in label order
    pub values: Map<String, Value>,
    /// Source run
    pub run_id: RunId,
    /// Dataset
    pub dataset_id: DatasetId,
    /// Run start
    pub start: DateTime<Utc>,
    /// Run stop
    pub stop: DateTime<Utc>,
}

/// Raw label value row: values object, run, dataset, start, stop
pub type LabelValueRow = (Value, RunId, DatasetId, DateTime<Utc>, DateTime<Utc>);

impl ExportedLabelValues {
    /// Convert raw rows, preserving key order and null values
    ///
    /// A row whose values are not an object yields an empty values map.
    pub fn parse(rows: &[LabelValueRow]) -> Vec<ExportedLabelValues> {
        rows.iter()
            .map(|(values, run_id, dataset_id, start, stop)| ExportedLabelValues {
                values: values.as_object().cloned().unwrap_or_default(),
                run_id: *run_id,
                dataset_id: *dataset_id,
                start: *start,
                stop: *stop,
            })
            .collect()
    }
}

/// Type-aware scalar equality
///
/// Values of different JSON types are never equal. Numbers compare as
/// `f64`, so `10` equals `10.0`.
pub fn scalar_eq(actual: &Value, candidate: &Value) -> bool {
    match (actual, candidate) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| scalar_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| scalar_eq(v, other)))
        }
        _ => false,
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Label filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelFilter {
    /// Label name to expected value (or candidate list in multi-select mode)
    pub conditions: Map<String, Value>,
    /// Treat arrays of expected values as alternatives
    pub multi: bool,
}

impl LabelFilter {
    /// Empty filter (matches all)
    pub fn new() -> Self {
        LabelFilter::default()
    }

    /// Parse a filter from its JSON text form, e.g. `{"labelBar":["uno",30]}`
    pub fn from_json_str(raw: &str, multi: bool) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(LabelFilter {
                conditions: Map::new(),
                multi,
            });
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(conditions)) => Ok(LabelFilter { conditions, multi }),
            Ok(other) => Err(Error::invalid_input(format!(
                "filter must be a JSON object, got {}",
                crate::json::json_type_name(&other)
            ))),
            Err(e) => Err(Error::invalid_input(format!("filter is not valid JSON: {}", e))),
        }
    }

    /// Add a condition
    pub fn eq(mut self, label: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.conditions.insert(label.into(), expected.into());
        self
    }

    /// True when there are no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check whether a row's label values pass every condition
    pub fn matches(&self, values: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|(label, expected)| {
            let Some(actual) = values.get(label) else {
                return false;
            };
            match expected {
                Value::Array(candidates) if self.multi => candidates
                    .iter()
                    .filter(|c| same_type(actual, c))
                    .any(|c| scalar_eq(actual, c)),
                single => scalar_eq(actual, single),
            }
        })
    }
}

/// Label value query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelValuesQuery {
    /// Only these labels appear in results (all when empty)
    pub include: Vec<String>,
    /// These labels never appear in results
    pub exclude: Vec<String>,
    /// Row filter
    pub filter: LabelFilter,
    /// Label to order rows by; dataset id when absent
    pub sort: Option<String>,
    /// Order direction
    pub direction: SortDirection,
    /// Paging, applied after filtering
    pub pagination: Pagination,
}

/// Split repeated and comma-separated list parameters into names
pub fn split_list_param<'a, I>(params: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    params
        .into_iter()
        .flat_map(|p| p.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl LabelValuesQuery {
    /// Query returning every row with every label
    pub fn new() -> Self {
        LabelValuesQuery::default()
    }

    /// Add include names (comma-separated allowed; may be repeated)
    pub fn include(mut self, param: &str) -> Self {
        self.include.extend(split_list_param([param]));
        self
    }

    /// Add exclude names (comma-separated allowed; may be repeated)
    pub fn exclude(mut self, param: &str) -> Self {
        self.exclude.extend(split_list_param([param]));
        self
    }

    /// Set the filter
    pub fn filter(mut self, filter: LabelFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Order by a label
    pub fn sort_by(mut self, label: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(label.into());
        self.direction = direction;
        self
    }

    /// Set paging
    pub fn paginate(mut self, limit: usize, page: usize) -> Self {
        self.pagination = Pagination::new(limit, page);
        self
    }

    /// Apply include and exclude to one row's values; exclude always wins
    ///
    /// Included names that are also excluded are dropped from the include
    /// list first, so an include list emptied that way selects every label.
    pub fn project(&self, values: &Map<String, Value>) -> Map<String, Value> {
        let excluded = |name: &str| self.exclude.iter().any(|e| e == name);
        let include: Vec<&String> = self.include.iter().filter(|i| !excluded(i)).collect();
        values
            .iter()
            .filter(|(name, _)| include.is_empty() || include.iter().any(|i| *i == *name))
            .filter(|(name, _)| !excluded(name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Order two rows by the sort label; missing and null values go last
    pub fn compare(&self, a: &ExportedLabelValues, b: &ExportedLabelValues) -> Ordering {
        let directed = |ord: Ordering| match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        let by_id = directed(a.dataset_id.cmp(&b.dataset_id));
        let Some(label) = &self.sort else {
            return by_id;
        };
        let va = a.values.get(label).filter(|v| !v.is_null());
        let vb = b.values.get(label).filter(|v| !v.is_null());
        match (va, vb) {
            (None, None) => by_id,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => directed(compare_json(x, y)).then(by_id),
        }
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type first, then by value
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(p, q)| compare_json(p, q))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
