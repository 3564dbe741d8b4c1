//! Dynamic document model
//!
//! Everything the engine stores or returns is a [`Value`]: a
//! schema-less, dynamically typed datum. A [`Document`] maps string
//! field names to values and is the unit of storage inside a
//! collection. Cross-type ordering and collation-aware string
//! comparison live here because the primary index, ORDER BY and every
//! WHERE comparison all share them.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VellumError};

pub mod json;

/// String comparison rule for the whole store.
///
/// Stored in the file header; changing it requires a rebuild because
/// the primary index keys are normalized under it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collation {
    /// Byte-wise comparison, case sensitive.
    #[default]
    Binary,
    /// Unicode-lowercase folding before comparison.
    NoCase,
}

impl Collation {
    pub fn name(&self) -> &'static str {
        match self {
            Collation::Binary => "binary",
            Collation::NoCase => "nocase",
        }
    }

    pub fn from_name(name: &str) -> Option<Collation> {
        match name {
            "binary" => Some(Collation::Binary),
            "nocase" => Some(Collation::NoCase),
            _ => None,
        }
    }

    /// Normalize a string for comparison under this collation.
    pub fn fold<'a>(&self, s: &'a str) -> Cow<'a, str> {
        match self {
            Collation::Binary => Cow::Borrowed(s),
            Collation::NoCase => {
                if s.chars().any(|c| c.is_uppercase()) {
                    Cow::Owned(s.to_lowercase())
                } else {
                    Cow::Borrowed(s)
                }
            }
        }
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Binary => a.cmp(b),
            Collation::NoCase => self.fold(a).cmp(&self.fold(b)),
        }
    }

    pub fn eq(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

impl std::fmt::Display for Collation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Value::Document(_))
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::DateTime(_) => 4,
            Value::Array(_) => 5,
            Value::Document(_) => 6,
        }
    }

    /// Total ordering across all value types.
    ///
    /// Types order by rank (null < bool < numbers < string < datetime
    /// < array < document); Int and Double compare numerically within
    /// the shared number rank, with NaN sorting above every other
    /// number. Strings honor the collation.
    pub fn cmp_with(&self, other: &Value, collation: Collation) -> Ordering {
        let (ra, rb) = (self.type_rank(), other.type_rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Double(b)) => cmp_f64(*a as f64, *b),
            (Value::Double(a), Value::Int(b)) => cmp_f64(*a, *b as f64),
            (Value::Double(a), Value::Double(b)) => cmp_f64(*a, *b),
            (Value::String(a), Value::String(b)) => collation.compare(a, b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.cmp_with(y, collation);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Document(a), Value::Document(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = ka.cmp(kb);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    let ord = va.cmp_with(vb, collation);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            // Ranks matched above, so the variants match too.
            _ => Ordering::Equal,
        }
    }

    pub fn eq_with(&self, other: &Value, collation: Collation) -> bool {
        self.cmp_with(other, collation) == Ordering::Equal
    }

    fn set_steps(&mut self, steps: &[PathStep], value: Value) -> Result<()> {
        match steps {
            [] => {
                *self = value;
                Ok(())
            }
            [PathStep::Field(_), ..] => match self {
                Value::Document(doc) => doc.set_steps(steps, value),
                other => Err(VellumError::eval(format!(
                    "cannot set a field through a {} value",
                    other.type_name()
                ))),
            },
            [PathStep::Index(i), rest @ ..] => match self {
                Value::Array(items) => {
                    let slot = items.get_mut(*i).ok_or_else(|| {
                        VellumError::eval(format!("array index {i} out of bounds"))
                    })?;
                    slot.set_steps(rest, value)
                }
                other => Err(VellumError::eval(format!(
                    "cannot index a {} value with [{i}]",
                    other.type_name()
                ))),
            },
        }
    }

    fn get_step(&self, step: &PathStep) -> Option<&Value> {
        match (self, step) {
            (Value::Document(doc), PathStep::Field(name)) => doc.get(name),
            (Value::Array(items), PathStep::Index(i)) => items.get(*i),
            _ => None,
        }
    }
}

/// NaN sorts above all other numbers and equal to itself.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    match a.partial_cmp(&b) {
        Some(ord) => ord,
        None => a.is_nan().cmp(&b.is_nan()),
    }
}

impl std::fmt::Display for Value {
    /// Human-readable form: scalars render bare (strings without
    /// quotes), arrays and documents render as compact JSON. This is
    /// the formatting the tab projection and the CLI table view use.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Array(_) | Value::Document(_) => {
                write!(f, "{}", json::to_json(self))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

/// Reserved primary-key field name.
pub const ID_FIELD: &str = "_id";

/// One step in a dotted path: a field name or an array index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathStep {
    Field(String),
    Index(usize),
}

/// A schema-less record: ordered field-name to value mapping.
///
/// Field names sort byte-wise, which conveniently places `_id` ahead
/// of conventional lowercase field names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Primary key of the document, if assigned.
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_FIELD)
    }

    /// Resolve a parsed path against this document.
    pub fn get_steps(&self, steps: &[PathStep]) -> Option<&Value> {
        let (first, rest) = steps.split_first()?;
        let mut current = match first {
            PathStep::Field(name) => self.get(name)?,
            PathStep::Index(_) => return None,
        };
        for step in rest {
            current = current.get_step(step)?;
        }
        Some(current)
    }

    /// Resolve a dotted path such as `address.city` or `tags[0]`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let steps = parse_path(path).ok()?;
        self.get_steps(&steps)
    }

    /// Assign through a parsed path, creating intermediate documents
    /// for missing fields. Array elements must already exist.
    pub fn set_steps(&mut self, steps: &[PathStep], value: Value) -> Result<()> {
        match steps {
            [] => Err(VellumError::eval("cannot assign to the document root")),
            [PathStep::Field(name)] => {
                self.fields.insert(name.clone(), value);
                Ok(())
            }
            [PathStep::Field(name), rest @ ..] => {
                let slot = self
                    .fields
                    .entry(name.clone())
                    .or_insert_with(|| Value::Document(Document::new()));
                slot.set_steps(rest, value)
            }
            [PathStep::Index(i), ..] => Err(VellumError::eval(format!(
                "cannot index a document with [{i}]"
            ))),
        }
    }

    /// Assign through a dotted path string.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let steps = parse_path(path)?;
        self.set_steps(&steps, value.into())
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Document { fields: iter.into_iter().collect() }
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", json::document_to_json(self))
    }
}

/// Parse a dotted path string into steps.
///
/// Accepts an optional leading `$.`, field names, and `[n]` index
/// suffixes: `$.items[2].name`, `address.city`, `tags[0]`.
pub fn parse_path(raw: &str) -> Result<Vec<PathStep>> {
    let raw = raw.strip_prefix("$.").unwrap_or(raw);
    let raw = if raw == "$" { "" } else { raw };
    let mut steps = Vec::new();
    let mut chars = raw.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c == '.' {
            chars.next();
            continue;
        }
        if c == '[' {
            chars.next();
            let mut digits = String::new();
            for (_, d) in chars.by_ref() {
                if d == ']' {
                    break;
                }
                digits.push(d);
            }
            let index: usize = digits
                .parse()
                .map_err(|_| VellumError::eval(format!("invalid array index in path '{raw}'")))?;
            steps.push(PathStep::Index(index));
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            let mut end = start;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            steps.push(PathStep::Field(raw[start..end].to_string()));
            continue;
        }
        return Err(VellumError::eval(format!(
            "unexpected character {c:?} in path '{raw}'"
        )));
    }

    Ok(steps)
}
