use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use snafu::ResultExt;

use crate::{
    error::{DecodeError, InvalidJsonSnafu, NotAnObjectSnafu},
    event::{Event, FieldValue},
};

/// Key holding the event's millisecond epoch timestamp.
pub const DEFAULT_TIME_KEY: &str = "time";

/// Suffixes of redundant length fields dropped during decoding.
pub const DEFAULT_DENYLIST_SUFFIXES: &[&str] = &["_len"];

/// Turns one input line into an [`Event`].
///
/// Decoding is a pure function of the line and the ingestion timestamp.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    time_key: String,
    denylist_suffixes: Vec<String>,
}

impl EventDecoder {
    pub fn new(time_key: impl Into<String>, denylist_suffixes: Vec<String>) -> Self {
        Self {
            time_key: time_key.into(),
            denylist_suffixes,
        }
    }

    pub fn decode(&self, line: &str, ingested_at: DateTime<Utc>) -> Result<Event, DecodeError> {
        let value: Value = serde_json::from_str(line).context(InvalidJsonSnafu {})?;

        let payload = match value {
            Value::Object(payload) => payload,
            other => {
                return NotAnObjectSnafu {
                    found: json_kind(&other),
                }
                .fail();
            }
        };

        let fields = self.normalize(payload);

        Ok(Event::new(line.to_string(), fields, ingested_at))
    }

    fn normalize(&self, payload: Map<String, Value>) -> IndexMap<String, FieldValue> {
        let mut fields = IndexMap::with_capacity(payload.len());

        for (key, value) in payload {
            if self.is_denylisted(&key) {
                continue;
            }

            let value = if key == self.time_key {
                millis_to_timestamp(&value)
                    .map(FieldValue::Timestamp)
                    .unwrap_or_else(|| value.into())
            } else {
                value.into()
            };

            fields.insert(key, value);
        }

        fields
    }

    fn is_denylisted(&self, key: &str) -> bool {
        self.denylist_suffixes
            .iter()
            .any(|suffix| key.ends_with(suffix.as_str()))
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(
            DEFAULT_TIME_KEY,
            DEFAULT_DENYLIST_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

/// Integer millisecond epochs become an instant, anything else is left alone.
fn millis_to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let millis = value.as_i64()?;
    DateTime::from_timestamp_millis(millis)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_time_is_converted_to_instant() {
        let decoder = EventDecoder::default();
        let event = decoder
            .decode(r#"{"time":1700000000050,"type":"y","seq":2}"#, now())
            .unwrap();

        let expected = Utc.timestamp_opt(1_700_000_000, 50_000_000).unwrap();
        assert_eq!(event.get("time"), Some(&FieldValue::Timestamp(expected)));
        assert_eq!(
            event.get("type"),
            Some(&FieldValue::String("y".to_string()))
        );
        assert_eq!(event.ingested_at(), now());
    }

    #[test]
    fn test_non_integer_time_passes_through() {
        let decoder = EventDecoder::default();
        let event = decoder.decode(r#"{"time":"yesterday"}"#, now()).unwrap();
        assert_eq!(
            event.get("time"),
            Some(&FieldValue::String("yesterday".to_string()))
        );
    }

    #[test]
    fn test_large_integers_are_not_rounded() {
        let decoder = EventDecoder::default();
        let event = decoder
            .decode(r#"{"conn_id":9007199254740993,"big":123456789012345678901234567890}"#, now())
            .unwrap();

        let Some(FieldValue::Number(conn_id)) = event.get("conn_id") else {
            panic!("conn_id is not a number");
        };
        assert_eq!(conn_id.as_u64(), Some(9_007_199_254_740_993));

        let Some(FieldValue::Number(big)) = event.get("big") else {
            panic!("big is not a number");
        };
        assert_eq!(big.to_string(), "123456789012345678901234567890");
    }

    #[test]
    fn test_denylisted_suffix_is_dropped() {
        let decoder = EventDecoder::default();
        let event = decoder
            .decode(r#"{"type":"send","bytes_len":12,"bytes":"abc"}"#, now())
            .unwrap();

        let keys: Vec<_> = event.fields().keys().cloned().collect();
        assert_eq!(keys, vec!["type".to_string(), "bytes".to_string()]);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let decoder = EventDecoder::default();
        let line = r#"{"time":1700000000000,"type":"x","seq":1,"nested":{"a":[1,2]}}"#;
        let first = decoder.decode(line, now()).unwrap();
        let second = decoder.decode(line, Utc::now()).unwrap();

        assert_eq!(first.fields(), second.fields());
        assert_eq!(first.raw_line(), second.raw_line());
    }

    #[test]
    fn test_truncated_line_is_rejected() {
        let decoder = EventDecoder::default();
        let err = decoder.decode(r#"{"time":"#, now()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson { .. }));
    }

    #[test]
    fn test_non_object_is_rejected() {
        let decoder = EventDecoder::default();
        let err = decoder.decode("[1,2,3]", now()).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject { found: "array" }));
    }
}
