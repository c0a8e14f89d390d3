//! Mapping between JSON and the Firestore REST value encoding

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::types::Record;

/// A Firestore `Value` as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    /// int64, transmitted as a decimal string
    IntegerValue(String),
    /// A number, or one of "NaN", "Infinity", "-Infinity"
    DoubleValue(Json),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

pub type Fields = BTreeMap<String, Value>;

/// Encode a JSON value for storage
pub fn encode(value: &Json) -> Value {
    match value {
        Json::Null => Value::NullValue(()),
        Json::Bool(b) => Value::BooleanValue(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::IntegerValue(i.to_string()),
            None => Value::DoubleValue(Json::from(n.as_f64().unwrap_or_default())),
        },
        Json::String(s) => Value::StringValue(s.clone()),
        Json::Array(items) => Value::ArrayValue(ArrayValue {
            values: items.iter().map(encode).collect(),
        }),
        Json::Object(map) => Value::MapValue(MapValue {
            fields: encode_fields(map),
        }),
    }
}

pub fn encode_fields(record: &Record) -> Fields {
    record.iter().map(|(k, v)| (k.clone(), encode(v))).collect()
}

/// Decode a stored value back into JSON
pub fn decode(value: Value) -> Result<Json> {
    Ok(match value {
        Value::NullValue(()) => Json::Null,
        Value::BooleanValue(b) => Json::Bool(b),
        Value::IntegerValue(s) => {
            let i: i64 = s
                .parse()
                .map_err(|_| Error::Store(format!("Invalid integer value: {}", s)))?;
            Json::from(i)
        }
        // Non-finite doubles have no JSON form
        Value::DoubleValue(d) => d.as_f64().map(Json::from).unwrap_or(Json::Null),
        Value::TimestampValue(s)
        | Value::StringValue(s)
        | Value::BytesValue(s)
        | Value::ReferenceValue(s) => Json::String(s),
        Value::GeoPointValue(p) => serde_json::json!({
            "latitude": p.latitude,
            "longitude": p.longitude,
        }),
        Value::ArrayValue(a) => Json::Array(
            a.values
                .into_iter()
                .map(decode)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::MapValue(m) => Json::Object(decode_fields(m.fields)?),
    })
}

pub fn decode_fields(fields: Fields) -> Result<Record> {
    fields
        .into_iter()
        .map(|(k, v)| Ok((k, decode(v)?)))
        .collect()
}

/// Field paths touched by a merge of `record`.
///
/// Nested objects contribute their leaves so sibling fields already stored
/// under the same parent survive. Empty objects count as leaves.
pub fn merge_field_paths(record: &Record) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(record, &mut Vec::new(), &mut paths);
    paths.sort();
    paths
}

fn collect_paths(map: &Record, prefix: &mut Vec<String>, out: &mut Vec<String>) {
    for (key, value) in map {
        prefix.push(quote_segment(key));
        match value {
            Json::Object(inner) if !inner.is_empty() => collect_paths(inner, prefix, out),
            _ => out.push(prefix.join(".")),
        }
        prefix.pop();
    }
}

/// Quote a field name unless it is a plain identifier
fn quote_segment(segment: &str) -> String {
    let mut chars = segment.chars();
    let simple = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());

    if simple {
        segment.to_string()
    } else {
        let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
        format!("`{}`", escaped)
    }
}
