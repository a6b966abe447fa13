//! Statically declared mapping from events to sink rows.
//!
//! The table is built once at startup. Each entry names a target column,
//! where its value comes from, and the type the value must have.
use std::{collections::HashSet, fmt, str::FromStr};

use serde_json::{Map, Value};

use crate::{
    error::RowError,
    event::{Event, FieldValue, format_timestamp},
};

/// Type of a row column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Timestamp,
    String,
    Integer,
    Float,
    Boolean,
    /// Any json value, stored as is.
    Json,
}

/// Where a column takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// A payload field with the given key.
    Payload(String),
    /// The original input line.
    RawLine,
    /// The time the reader decoded the line.
    IngestedAt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    pub source: FieldSource,
    pub field_type: FieldType,
    pub required: bool,
}

/// The column table used to turn events into rows.
#[derive(Debug, Clone)]
pub struct RowSchema {
    fields: Vec<FieldMapping>,
    payload_keys: HashSet<String>,
}

impl FieldMapping {
    pub fn new(name: impl Into<String>, source: FieldSource, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            source,
            field_type,
            required: false,
        }
    }

    /// A column filled from the payload field with the same name.
    pub fn payload(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self::new(name.clone(), FieldSource::Payload(name), field_type)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl RowSchema {
    pub fn new(fields: Vec<FieldMapping>) -> Self {
        let payload_keys = fields
            .iter()
            .filter_map(|f| match &f.source {
                FieldSource::Payload(key) => Some(key.clone()),
                _ => None,
            })
            .collect();

        Self {
            fields,
            payload_keys,
        }
    }

    /// The event log table layout.
    ///
    /// `time`, `type` and `seq` come from the payload, `created_at` is the
    /// ingestion time and `payload` keeps the whole input line.
    pub fn event_log() -> Self {
        Self::new(vec![
            FieldMapping::payload("time", FieldType::Timestamp),
            FieldMapping::new("created_at", FieldSource::IngestedAt, FieldType::Timestamp),
            FieldMapping::payload("type", FieldType::String),
            FieldMapping::payload("seq", FieldType::Integer),
            FieldMapping::new("payload", FieldSource::RawLine, FieldType::String),
        ])
    }

    /// Adds a column at the end of the table.
    pub fn with_field(self, field: FieldMapping) -> Self {
        let mut fields = self.fields;
        fields.retain(|f| f.name != field.name);
        fields.push(field);
        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    /// Maps an event to a row.
    ///
    /// When `strict` is set, payload fields that no column reads are an
    /// error. Otherwise they are ignored.
    pub fn to_row(&self, event: &Event, strict: bool) -> Result<Map<String, Value>, RowError> {
        if strict {
            if let Some(field) = event
                .fields()
                .keys()
                .find(|key| !self.payload_keys.contains(*key))
            {
                return Err(RowError::UnknownField {
                    field: field.clone(),
                });
            }
        }

        let mut row = Map::with_capacity(self.fields.len());

        for mapping in self.fields.iter() {
            let value = match &mapping.source {
                FieldSource::Payload(key) => event.get(key).cloned(),
                FieldSource::RawLine => Some(FieldValue::String(event.raw_line().to_string())),
                FieldSource::IngestedAt => Some(FieldValue::Timestamp(event.ingested_at())),
            };

            let value = match value {
                None | Some(FieldValue::Null) if mapping.required => {
                    return Err(RowError::MissingField {
                        field: mapping.name.clone(),
                    });
                }
                None | Some(FieldValue::Null) => Value::Null,
                Some(value) => convert(&mapping.name, mapping.field_type, value)?,
            };

            row.insert(mapping.name.clone(), value);
        }

        Ok(row)
    }
}

impl Default for RowSchema {
    fn default() -> Self {
        Self::event_log()
    }
}

fn convert(name: &str, field_type: FieldType, value: FieldValue) -> Result<Value, RowError> {
    let mismatch = |value: &FieldValue| RowError::TypeMismatch {
        field: name.to_string(),
        expected: field_type.as_str(),
        found: value.kind(),
    };

    match (field_type, value) {
        (FieldType::Timestamp, FieldValue::Timestamp(ts)) => Ok(Value::String(format_timestamp(&ts))),
        (FieldType::String, FieldValue::String(s)) => Ok(Value::String(s)),
        (FieldType::Integer, FieldValue::Number(n)) if n.is_i64() || n.is_u64() => {
            Ok(Value::Number(n))
        }
        (FieldType::Float, FieldValue::Number(n)) => Ok(Value::Number(n)),
        (FieldType::Boolean, FieldValue::Bool(b)) => Ok(Value::Bool(b)),
        (FieldType::Json, value) => Ok(value.to_json()),
        (_, value) => Err(mismatch(&value)),
    }
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Timestamp => "timestamp",
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Json => "json",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timestamp" => Ok(FieldType::Timestamp),
            "string" => Ok(FieldType::String),
            "integer" | "int" => Ok(FieldType::Integer),
            "float" => Ok(FieldType::Float),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "json" => Ok(FieldType::Json),
            other => Err(format!("unknown field type {other}")),
        }
    }
}

/// Parses a `name:type` column definition read from the payload.
impl FromStr for FieldMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, field_type)) = s.split_once(':') else {
            return Err(format!("expected name:type, got {s}"));
        };

        if name.is_empty() {
            return Err("column name is empty".to_string());
        }

        Ok(FieldMapping::payload(name, field_type.parse()?))
    }
}
