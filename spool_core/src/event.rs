//! Decoded input records.
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Number, Value};

/// Name of the ingestion timestamp when an event is serialized.
pub const INGESTED_AT_KEY: &str = "ingested_at";

/// A dynamically typed field value.
///
/// Numbers keep their original textual representation, so large integers
/// never go through a floating point intermediate.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// An absolute instant derived from a millisecond epoch.
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

/// One decoded input line.
///
/// Events are immutable once built and are moved, never shared, from the
/// reader to the queue and from the queue to exactly one worker.
#[derive(Debug)]
pub struct Event {
    raw_line: String,
    fields: IndexMap<String, FieldValue>,
    ingested_at: DateTime<Utc>,
}

impl Event {
    pub(crate) fn new(
        raw_line: String,
        fields: IndexMap<String, FieldValue>,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            raw_line,
            fields,
            ingested_at,
        }
    }

    /// The original input line.
    pub fn raw_line(&self) -> &str {
        &self.raw_line
    }

    /// Payload fields, in input order.
    pub fn fields(&self) -> &IndexMap<String, FieldValue> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// When the reader decoded this line.
    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    /// Serializes the event to a single json line.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl FieldValue {
    /// Short name of the value's type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Number(_) => "number",
            FieldValue::String(_) => "string",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Array(_) => "array",
            FieldValue::Object(_) => "object",
        }
    }

    /// Converts the value back to json. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => Value::String(format_timestamp(ts)),
            FieldValue::Array(items) => Value::Array(items.clone()),
            FieldValue::Object(map) => Value::Object(map.clone()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => FieldValue::Array(items),
            Value::Object(map) => FieldValue::Object(map),
        }
    }
}

/// Formats a timestamp as RFC 3339 with millisecond precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Number(n) => n.serialize(serializer),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
            FieldValue::Array(items) => items.serialize(serializer),
            FieldValue::Object(map) => map.serialize(serializer),
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (key, value) in self.fields.iter() {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(INGESTED_AT_KEY, &format_timestamp(&self.ingested_at))?;
        map.end()
    }
}
