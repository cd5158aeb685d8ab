//! Schema-bound extraction definitions
//!
//! A [`Schema`] is identified by URI; a document conforms to it when the
//! document carries that URI under the [`SCHEMA_KEY`] member. Transformers
//! and labels both belong to a schema and are both built from
//! [`Extractor`]s plus an optional [`JsonFunction`].

use crate::error::FunctionError;
use crate::json::PathExpr;
use crate::types::{LabelId, SchemaId, TransformerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Member through which a JSON document declares the schema it conforms to
pub const SCHEMA_KEY: &str = "$schema";

/// Schema URI declared by a document, if any
pub fn declared_schema(doc: &Value) -> Option<&str> {
    doc.as_object()
        .and_then(|obj| obj.get(SCHEMA_KEY))
        .and_then(Value::as_str)
}

/// A URI-identified document contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema id
    pub id: SchemaId,
    /// Unique URI, e.g. `urn:acme:benchmark:1.0`
    pub uri: String,
    /// Display name
    pub name: String,
}

/// A named path-expression rule pulling one value out of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extractor {
    /// Argument name under which the extracted value is passed on
    pub name: String,
    /// Path expression source text
    pub jsonpath: String,
    /// Collect every match into an array instead of taking the first one
    #[serde(default)]
    pub array: bool,
    /// When set, a document where this path resolves to nothing does not
    /// match the owning schema at all
    #[serde(default)]
    pub required: bool,
}

impl Extractor {
    /// Create an extractor taking the first match
    pub fn new(name: impl Into<String>, jsonpath: impl Into<String>, array: bool) -> Self {
        Extractor {
            name: name.into(),
            jsonpath: jsonpath.into(),
            array,
            required: false,
        }
    }

    /// Mark this extractor as required for schema matching
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Parse the path expression
    pub fn parse_path(&self) -> Result<PathExpr, crate::json::PathParseError> {
        self.jsonpath.parse()
    }
}

/// A function mapping extracted arguments to output JSON
///
/// The input is the single extracted value when the owner has exactly one
/// extractor, and an object keyed by extractor name otherwise.
pub trait JsonFunction: Send + Sync {
    /// Apply the function
    fn call(&self, input: &Value) -> Result<Value, FunctionError>;
}

impl<F> JsonFunction for F
where
    F: Fn(&Value) -> Result<Value, FunctionError> + Send + Sync,
{
    fn call(&self, input: &Value) -> Result<Value, FunctionError> {
        self(input)
    }
}

/// Shared handle to a function
pub type SharedFunction = Arc<dyn JsonFunction>;

/// Build the function input from named extractor values
///
/// A single argument is passed as-is; several are passed as an object in
/// extractor order.
pub fn function_input(mut args: Vec<(String, Value)>) -> Value {
    if args.len() == 1 {
        return args.pop().map(|(_, v)| v).unwrap_or(Value::Null);
    }
    Value::Object(args.into_iter().collect::<Map<String, Value>>())
}

/// A schema-bound function composing extractor outputs into dataset fragments
#[derive(Clone)]
pub struct Transformer {
    /// Transformer id
    pub id: TransformerId,
    /// Display name
    pub name: String,
    /// URI of the schema whose documents this transformer reads
    pub schema_uri: String,
    /// Schema URI stamped on every object fragment produced
    pub target_schema_uri: Option<String>,
    /// Extractors, evaluated in order
    pub extractors: Vec<Extractor>,
    /// Transformation; identity when absent
    pub function: Option<SharedFunction>,
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schema_uri", &self.schema_uri)
            .field("target_schema_uri", &self.target_schema_uri)
            .field("extractors", &self.extractors)
            .field("function", &self.function.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Definition of a transformer before registration
#[derive(Clone, Default)]
pub struct TransformerDef {
    /// Display name
    pub name: String,
    /// Schema read by the transformer
    pub schema_uri: String,
    /// Schema stamped on produced fragments
    pub target_schema_uri: Option<String>,
    /// Extractors
    pub extractors: Vec<Extractor>,
    /// Transformation; identity when absent
    pub function: Option<SharedFunction>,
}

impl TransformerDef {
    /// Identity transformer over the given extractors
    pub fn new(name: impl Into<String>, schema_uri: impl Into<String>) -> Self {
        TransformerDef {
            name: name.into(),
            schema_uri: schema_uri.into(),
            ..Default::default()
        }
    }

    /// Add an extractor
    pub fn extractor(mut self, extractor: Extractor) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Set the target schema
    pub fn target(mut self, uri: impl Into<String>) -> Self {
        self.target_schema_uri = Some(uri.into());
        self
    }

    /// Set the transformation function
    pub fn function(mut self, f: impl JsonFunction + 'static) -> Self {
        self.function = Some(Arc::new(f));
        self
    }
}

/// A named, schema-scoped computed value exposed for querying
#[derive(Clone)]
pub struct Label {
    /// Label id
    pub id: LabelId,
    /// Label name, unique within its schema
    pub name: String,
    /// Owning schema
    pub schema_uri: String,
    /// Extractors, evaluated in order
    pub extractors: Vec<Extractor>,
    /// Combination function; identity when absent
    pub function: Option<SharedFunction>,
    /// Offered as a filter in dataset listings
    pub filtering: bool,
    /// Offered as a metric
    pub metrics: bool,
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Label")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schema_uri", &self.schema_uri)
            .field("extractors", &self.extractors)
            .field("function", &self.function.as_ref().map(|_| "<fn>"))
            .field("filtering", &self.filtering)
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// Definition of a label before registration
#[derive(Clone)]
pub struct LabelDef {
    /// Label name
    pub name: String,
    /// Extractors
    pub extractors: Vec<Extractor>,
    /// Combination function
    pub function: Option<SharedFunction>,
    /// Offered as a filter
    pub filtering: bool,
    /// Offered as a metric
    pub metrics: bool,
}

impl LabelDef {
    /// Identity label over one extractor
    pub fn new(name: impl Into<String>, extractor: Extractor) -> Self {
        LabelDef {
            name: name.into(),
            extractors: vec![extractor],
            function: None,
            filtering: true,
            metrics: true,
        }
    }

    /// Add another extractor
    pub fn extractor(mut self, extractor: Extractor) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Set the combination function
    pub fn function(mut self, f: impl JsonFunction + 'static) -> Self {
        self.function = Some(Arc::new(f));
        self
    }
}
