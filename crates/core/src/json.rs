//! JSON limits and the path-expression dialect used by extractors
//!
//! This module defines:
//! - Document limits applied to every uploaded run payload
//! - PathExpr: a parsed path expression (small typed AST)
//! - PathStep: individual step of a path expression
//! - An interpreter evaluating a PathExpr over a `serde_json::Value`
//!
//! # Document Size Limits
//!
//! | Limit | Value | Constant |
//! |-------|-------|----------|
//! | Max document size | 16 MB | [`MAX_DOCUMENT_SIZE`] |
//! | Max nesting depth | 100 levels | [`MAX_NESTING_DEPTH`] |
//! | Max path length | 256 steps | [`MAX_PATH_LENGTH`] |
//! | Max array size | 1M elements | [`MAX_ARRAY_SIZE`] |
//!
//! # Path Syntax
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `$` | Document root (optional) | `$` |
//! | `.key` | Object member | `$.user` |
//! | `."key"` | Quoted member, any characters | `$."build-id"` |
//! | `['key']`, `["key"]` | Bracketed member | `$['Max RSS']` |
//! | `[n]` | Array element | `$.items[0]` |
//! | `[n to m]` | Inclusive element range | `$.items[1 to 3]` |
//! | `[*]` | Every array element | `$.items[*].name` |
//! | `.*` | Every object member | `$.params.*` |
//! | `..key` | Member at any depth | `$..throughput` |
//! | `..*` | Every descendant | `$..*` |
//!
//! Evaluation is lax: a member step applied to an array applies to each
//! element of the array, and an index step applied to a non-array treats
//! the value as a single-element array.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Document Size Limits
// =============================================================================

/// Maximum document size in bytes (16 MB)
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Maximum nesting depth in a JSON document (100 levels)
///
/// Bounds the recursion of path evaluation and fingerprint composition.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Maximum number of steps in a path expression
pub const MAX_PATH_LENGTH: usize = 256;

/// Maximum array size in elements (1 million elements)
pub const MAX_ARRAY_SIZE: usize = 1_000_000;

/// Error type for document limit violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// Document exceeds maximum size
    #[error("document size {size} exceeds maximum of {max} bytes")]
    DocumentTooLarge {
        /// Actual document size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Document nesting exceeds maximum depth
    #[error("document nesting depth {depth} exceeds maximum of {max} levels")]
    NestingTooDeep {
        /// Actual nesting depth
        depth: usize,
        /// Maximum allowed depth
        max: usize,
    },

    /// Path exceeds maximum length
    #[error("path length {length} exceeds maximum of {max} steps")]
    PathTooLong {
        /// Actual path length
        length: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Array exceeds maximum size
    #[error("array size {size} exceeds maximum of {max} elements")]
    ArrayTooLarge {
        /// Actual array size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },
}

/// Calculate the maximum nesting depth of a JSON value
///
/// Returns 0 for scalars and counts nested objects/arrays.
pub fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => 0,
        Value::Array(arr) => 1 + arr.iter().map(nesting_depth).max().unwrap_or(0),
        Value::Object(obj) => 1 + obj.values().map(nesting_depth).max().unwrap_or(0),
    }
}

/// Find the largest array anywhere in a JSON value
pub fn max_array_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => 0,
        Value::Array(arr) => {
            let nested_max = arr.iter().map(max_array_size).max().unwrap_or(0);
            arr.len().max(nested_max)
        }
        Value::Object(obj) => obj.values().map(max_array_size).max().unwrap_or(0),
    }
}

/// Validate a parsed document against all limits
///
/// `encoded_len` is the byte length of the document as uploaded; it is
/// checked against `max_size` before the structural limits.
pub fn validate_document(value: &Value, encoded_len: usize, max_size: usize) -> Result<(), LimitError> {
    if encoded_len > max_size {
        return Err(LimitError::DocumentTooLarge {
            size: encoded_len,
            max: max_size,
        });
    }
    let depth = nesting_depth(value);
    if depth > MAX_NESTING_DEPTH {
        return Err(LimitError::NestingTooDeep {
            depth,
            max: MAX_NESTING_DEPTH,
        });
    }
    let size = max_array_size(value);
    if size > MAX_ARRAY_SIZE {
        return Err(LimitError::ArrayTooLarge {
            size,
            max: MAX_ARRAY_SIZE,
        });
    }
    Ok(())
}

/// Human-readable JSON type name, used in messages and filter matching
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// PathExpr and PathStep
// =============================================================================

/// Error type for path expression parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathParseError {
    /// Path expression is empty
    #[error("empty path expression")]
    Empty,
    /// Empty key in path
    #[error("empty key in path at position {0}")]
    EmptyKey(usize),
    /// Unclosed bracket
    #[error("unclosed bracket starting at position {0}")]
    UnclosedBracket(usize),
    /// Unterminated quoted key
    #[error("unterminated quoted key starting at position {0}")]
    UnterminatedQuote(usize),
    /// Invalid array index or range
    #[error("invalid array index at position {0}: {1}")]
    InvalidIndex(usize, String),
    /// Unexpected character
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    /// Too many steps
    #[error(transparent)]
    Limit(#[from] LimitError),
}

/// A step in a path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Object member: `.foo`, `."foo-bar"`, `['foo']`
    Key(String),
    /// Every object member: `.*`
    AnyKey,
    /// Array element: `[0]`
    Index(usize),
    /// Inclusive element range: `[1 to 3]`
    Range {
        /// First element
        from: usize,
        /// Last element (inclusive)
        to: usize,
    },
    /// Every array element: `[*]`
    AnyIndex,
    /// Member at any depth: `..foo`
    Descendant(String),
    /// Every descendant: `..*`
    AnyDescendant,
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(k) if is_plain_key(k) => write!(f, ".{}", k),
            PathStep::Key(k) => write!(f, ".{}", quote(k)),
            PathStep::AnyKey => write!(f, ".*"),
            PathStep::Index(i) => write!(f, "[{}]", i),
            PathStep::Range { from, to } => write!(f, "[{} to {}]", from, to),
            PathStep::AnyIndex => write!(f, "[*]"),
            PathStep::Descendant(k) if is_plain_key(k) => write!(f, "..{}", k),
            PathStep::Descendant(k) => write!(f, "..{}", quote(k)),
            PathStep::AnyDescendant => write!(f, "..*"),
        }
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_plain_key(k: &str) -> bool {
    !k.is_empty() && k.chars().all(is_key_char)
}

fn quote(k: &str) -> String {
    let mut out = String::with_capacity(k.len() + 2);
    out.push('"');
    for c in k.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// A parsed path expression
///
/// # Examples
///
/// ```
/// use datamill_core::json::PathExpr;
/// use serde_json::json;
///
/// let doc = json!({"build-id": 1047, "results": [{"rps": 10}, {"rps": 20}]});
///
/// let id: PathExpr = "$.\"build-id\"".parse().unwrap();
/// assert_eq!(id.first(&doc), Some(&json!(1047)));
///
/// let rps: PathExpr = "$.results[*].rps".parse().unwrap();
/// assert_eq!(rps.query_array(&doc), json!([10, 20]));
///
/// let missing: PathExpr = "$.nope".parse().unwrap();
/// assert_eq!(missing.first(&doc), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathExpr {
    steps: Vec<PathStep>,
}

impl PathExpr {
    /// The root expression (`$`), selecting the whole document
    pub fn root() -> Self {
        PathExpr { steps: Vec::new() }
    }

    /// Append a member step (builder pattern)
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.steps.push(PathStep::Key(key.into()));
        self
    }

    /// Append an index step (builder pattern)
    pub fn index(mut self, idx: usize) -> Self {
        self.steps.push(PathStep::Index(idx));
        self
    }

    /// The steps of this expression
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// True for the root expression
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// True if the expression can select more than one value
    pub fn is_multi(&self) -> bool {
        self.steps.iter().any(|s| {
            matches!(
                s,
                PathStep::AnyKey
                    | PathStep::AnyIndex
                    | PathStep::Range { .. }
                    | PathStep::Descendant(_)
                    | PathStep::AnyDescendant
            )
        })
    }

    /// Evaluate the expression, returning every match in document order
    pub fn query<'a>(&self, doc: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![doc];
        for step in &self.steps {
            let mut next = Vec::new();
            for value in current {
                apply_step(step, value, &mut next);
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }

    /// First match, or `None` when the path resolves to nothing
    pub fn first<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.query(doc).into_iter().next()
    }

    /// All matches collected into a JSON array (empty array when none)
    pub fn query_array(&self, doc: &Value) -> Value {
        Value::Array(self.query(doc).into_iter().cloned().collect())
    }
}

fn apply_step<'a>(step: &PathStep, value: &'a Value, out: &mut Vec<&'a Value>) {
    match step {
        PathStep::Key(key) => match value {
            Value::Object(obj) => out.extend(obj.get(key)),
            Value::Array(arr) => {
                for item in arr {
                    if let Value::Object(obj) = item {
                        out.extend(obj.get(key));
                    }
                }
            }
            _ => {}
        },
        PathStep::AnyKey => match value {
            Value::Object(obj) => out.extend(obj.values()),
            Value::Array(arr) => {
                for item in arr {
                    if let Value::Object(obj) = item {
                        out.extend(obj.values());
                    }
                }
            }
            _ => {}
        },
        PathStep::Index(idx) => match value {
            Value::Array(arr) => out.extend(arr.get(*idx)),
            other if *idx == 0 => out.push(other),
            _ => {}
        },
        PathStep::Range { from, to } => match value {
            Value::Array(arr) => {
                if *from < arr.len() {
                    let end = (*to).min(arr.len() - 1);
                    if *from <= end {
                        out.extend(&arr[*from..=end]);
                    }
                }
            }
            other if *from == 0 => out.push(other),
            _ => {}
        },
        PathStep::AnyIndex => match value {
            Value::Array(arr) => out.extend(arr.iter()),
            other => out.push(other),
        },
        PathStep::Descendant(key) => collect_descendant_key(value, key, out),
        PathStep::AnyDescendant => collect_descendants(value, out),
    }
}

fn collect_descendant_key<'a>(value: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(obj) => {
            for (k, v) in obj {
                if k == key {
                    out.push(v);
                }
                collect_descendant_key(v, key, out);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                collect_descendant_key(v, key, out);
            }
        }
        _ => {}
    }
}

fn collect_descendants<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(obj) => {
            for v in obj.values() {
                out.push(v);
                collect_descendants(v, out);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                out.push(v);
                collect_descendants(v, out);
            }
        }
        _ => {}
    }
}

impl FromStr for PathExpr {
    type Err = PathParseError;

    /// Parse a path expression
    ///
    /// The leading `$` is optional; `foo.bar` and `$.foo.bar` are equivalent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PathParseError::Empty);
        }

        let chars: Vec<char> = trimmed.chars().collect();
        let mut steps = Vec::new();
        let mut i = 0;

        if chars[0] == '$' && (chars.len() == 1 || chars[1] == '.' || chars[1] == '[') {
            i = 1;
        } else if chars[0] != '.' && chars[0] != '[' {
            // Bare leading key: `foo.bar`
            let (key, next) = read_plain_key(&chars, 0)?;
            steps.push(PathStep::Key(key));
            i = next;
        }

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    if i >= chars.len() {
                        return Err(PathParseError::EmptyKey(i));
                    }
                    let recursive = chars[i] == '.';
                    if recursive {
                        i += 1;
                        if i >= chars.len() {
                            return Err(PathParseError::EmptyKey(i));
                        }
                    }
                    match chars[i] {
                        '*' => {
                            i += 1;
                            steps.push(if recursive {
                                PathStep::AnyDescendant
                            } else {
                                PathStep::AnyKey
                            });
                        }
                        '"' | '\'' => {
                            let (key, next) = read_quoted(&chars, i)?;
                            i = next;
                            steps.push(member_step(key, recursive));
                        }
                        _ => {
                            let (key, next) = read_plain_key(&chars, i)?;
                            i = next;
                            steps.push(member_step(key, recursive));
                        }
                    }
                }
                '[' => {
                    let (step, next) = read_bracket(&chars, i)?;
                    steps.push(step);
                    i = next;
                }
                c if c.is_whitespace() => i += 1,
                c => return Err(PathParseError::UnexpectedChar(c, i)),
            }
        }

        if steps.len() > MAX_PATH_LENGTH {
            return Err(LimitError::PathTooLong {
                length: steps.len(),
                max: MAX_PATH_LENGTH,
            }
            .into());
        }
        Ok(PathExpr { steps })
    }
}

fn member_step(key: String, recursive: bool) -> PathStep {
    if recursive {
        PathStep::Descendant(key)
    } else {
        PathStep::Key(key)
    }
}

fn read_plain_key(chars: &[char], start: usize) -> Result<(String, usize), PathParseError> {
    let mut i = start;
    while i < chars.len() && (is_key_char(chars[i]) || chars[i] == '-') {
        i += 1;
    }
    if i == start {
        return match chars.get(start) {
            Some(&c) => Err(PathParseError::UnexpectedChar(c, start)),
            None => Err(PathParseError::EmptyKey(start)),
        };
    }
    Ok((chars[start..i].iter().collect(), i))
}

fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize), PathParseError> {
    let delim = chars[start];
    let mut i = start + 1;
    let mut key = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                key.push(chars[i + 1]);
                i += 2;
            }
            c if c == delim => return Ok((key, i + 1)),
            c => {
                key.push(c);
                i += 1;
            }
        }
    }
    Err(PathParseError::UnterminatedQuote(start))
}

fn read_bracket(chars: &[char], start: usize) -> Result<(PathStep, usize), PathParseError> {
    let mut i = start + 1;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    if i >= chars.len() {
        return Err(PathParseError::UnclosedBracket(start));
    }

    if chars[i] == '"' || chars[i] == '\'' {
        let (key, next) = read_quoted(chars, i)?;
        let close = skip_to_close(chars, next, start)?;
        return Ok((PathStep::Key(key), close));
    }

    let mut end = i;
    while end < chars.len() && chars[end] != ']' {
        end += 1;
    }
    if end >= chars.len() {
        return Err(PathParseError::UnclosedBracket(start));
    }
    let body: String = chars[i..end].iter().collect();
    let body = body.trim();

    let step = if body == "*" {
        PathStep::AnyIndex
    } else if let Some((from, to)) = body.split_once(" to ") {
        let from = parse_index(from.trim(), i)?;
        let to = parse_index(to.trim(), i)?;
        if from > to {
            return Err(PathParseError::InvalidIndex(i, body.to_string()));
        }
        PathStep::Range { from, to }
    } else {
        PathStep::Index(parse_index(body, i)?)
    };
    Ok((step, end + 1))
}

fn parse_index(s: &str, pos: usize) -> Result<usize, PathParseError> {
    s.parse::<usize>()
        .map_err(|_| PathParseError::InvalidIndex(pos, s.to_string()))
}

fn skip_to_close(chars: &[char], mut i: usize, start: usize) -> Result<usize, PathParseError> {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    match chars.get(i) {
        Some(']') => Ok(i + 1),
        Some(&c) => Err(PathParseError::UnexpectedChar(c, i)),
        None => Err(PathParseError::UnclosedBracket(start)),
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}
