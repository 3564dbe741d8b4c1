//! JSON bridge for values and documents
//!
//! JSON carries no datetime type, so datetimes cross the boundary in
//! the extended form `{"$date": "<rfc3339>"}` and are folded back on
//! the way in. Export, import and the query-tab result projection all
//! go through this module.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::document::{Document, Value};
use crate::errors::{Result, VellumError};

/// Key of the extended-JSON datetime wrapper.
const DATE_KEY: &str = "$date";

/// Convert a value into its JSON representation.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Double(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::DateTime(dt) => {
            let mut wrapper = serde_json::Map::with_capacity(1);
            wrapper.insert(
                DATE_KEY.to_string(),
                serde_json::Value::String(dt.to_rfc3339()),
            );
            serde_json::Value::Object(wrapper)
        }
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Document(doc) => document_to_json(doc),
    }
}

pub fn document_to_json(doc: &Document) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> =
        doc.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
    serde_json::Value::Object(map)
}

/// Convert a JSON value back into a dynamic value.
///
/// Objects of the exact shape `{"$date": "<rfc3339>"}` become
/// datetimes; integers that fit i64 become `Int`, everything else
/// numeric becomes `Double`.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => {
            if map.len() == 1 {
                if let Some(serde_json::Value::String(raw)) = map.get(DATE_KEY) {
                    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                        return Value::DateTime(dt.with_timezone(&Utc));
                    }
                }
            }
            Value::Document(map.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

/// Render a slice of documents as a pretty-printed JSON array, the
/// format `$file(...)` targets and `export` produce.
pub fn documents_to_json_pretty(docs: &[Document]) -> Result<String> {
    let array = serde_json::Value::Array(docs.iter().map(document_to_json).collect());
    Ok(serde_json::to_string_pretty(&array)?)
}

/// Decode raw import bytes into text, honoring a UTF-8 or UTF-16 BOM.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    let (encoding, bom_len) = match encoding_rs::Encoding::for_bom(bytes) {
        Some((encoding, len)) => (encoding, len),
        None => (encoding_rs::UTF_8, 0),
    };
    let (text, had_errors) = {
        let (cow, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        (cow.into_owned(), had_errors)
    };
    if had_errors {
        return Err(VellumError::format(format!(
            "import data is not valid {}",
            encoding.name()
        )));
    }
    Ok(text)
}

/// Parse import text into documents.
///
/// Accepts a JSON array of objects (the export format) or a single
/// object.
pub fn parse_documents(bytes: &[u8]) -> Result<Vec<Document>> {
    let text = decode_text(bytes)?;
    let json: serde_json::Value = serde_json::from_str(text.trim())?;
    match json {
        serde_json::Value::Array(items) => {
            let mut docs = Vec::with_capacity(items.len());
            for item in items {
                match from_json(item) {
                    Value::Document(doc) => docs.push(doc),
                    other => {
                        return Err(VellumError::format(format!(
                            "import array may only contain objects, found {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(docs)
        }
        item @ serde_json::Value::Object(_) => match from_json(item) {
            Value::Document(doc) => Ok(vec![doc]),
            // A lone {"$date": ...} folds to a datetime, not a document.
            other => Err(VellumError::format(format!(
                "import data must be an object, found {}",
                other.type_name()
            ))),
        },
        other => Err(VellumError::format(format!(
            "import data must be a JSON array or object, found {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(from_json(json))
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        document_to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        match from_json(json) {
            Value::Document(doc) => Ok(doc),
            other => Err(D::Error::custom(format!(
                "expected a JSON object, found {}",
                other.type_name()
            ))),
        }
    }
}
