//! Events accepted by the Samsara ingestion API
//!
//! An event is an open JSON object. Three keys are mandatory:
//!
//! ```text
//! sourceId   string              who produced the event
//! timestamp  integer >= 0        epoch milliseconds
//! eventName  string              what happened
//! ```
//!
//! Every other key is passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const SOURCE_ID: &str = "sourceId";
pub const TIMESTAMP: &str = "timestamp";
pub const EVENT_NAME: &str = "eventName";

/// Single event as sent to the ingestion API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Create an event carrying only `eventName`
    pub fn new(event_name: impl Into<String>) -> Self {
        Self::default().with(EVENT_NAME, event_name.into())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn event_name(&self) -> Option<&str> {
        self.get(EVENT_NAME).and_then(Value::as_str)
    }

    pub fn source_id(&self) -> Option<&str> {
        self.get(SOURCE_ID).and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.get(TIMESTAMP).and_then(Value::as_u64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Copy of this event with `sourceId` and `timestamp` filled in where absent.
    ///
    /// A key holding JSON `null` counts as absent. Values already present
    /// win over the defaults.
    pub fn enriched(&self, default_source_id: Option<&str>, now_ms: i64) -> Event {
        let mut event = self.clone();
        if is_absent(event.get(SOURCE_ID)) {
            if let Some(source_id) = default_source_id {
                event.insert(SOURCE_ID, source_id);
            }
        }
        if is_absent(event.get(TIMESTAMP)) {
            event.insert(TIMESTAMP, now_ms);
        }
        event
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Event {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::InvalidEvent(format!(
                "event must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check one event against the schema, reporting every violated constraint
pub fn validate_event(event: &Event) -> Result<()> {
    let mut violations = Vec::new();

    for key in [SOURCE_ID, EVENT_NAME] {
        match event.get(key) {
            Some(Value::String(_)) => {}
            Some(other) => violations.push(format!(
                "field '{}' must be a string, got {}",
                key,
                json_type(other)
            )),
            None => violations.push(format!("field '{}' is required", key)),
        }
    }

    match event.get(TIMESTAMP) {
        Some(Value::Number(n)) if n.is_u64() => {}
        Some(Value::Number(n)) if n.is_i64() => {
            violations.push(format!("field '{}' must be >= 0", TIMESTAMP))
        }
        Some(other) => violations.push(format!(
            "field '{}' must be an integer, got {}",
            TIMESTAMP,
            json_type(other)
        )),
        None => violations.push(format!("field '{}' is required", TIMESTAMP)),
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidEvent(violations.join("; ")))
    }
}

/// Validate a batch, failing on the first invalid member
pub fn validate_events(events: &[Event]) -> Result<()> {
    for (index, event) in events.iter().enumerate() {
        validate_event(event).map_err(|e| match e {
            Error::InvalidEvent(msg) => Error::InvalidEvent(format!("event #{}: {}", index, msg)),
            other => other,
        })?;
    }
    Ok(())
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_event() -> Event {
        Event::new("app_started")
            .with(SOURCE_ID, "svc-1")
            .with(TIMESTAMP, 1_700_000_000_000u64)
    }

    #[test]
    fn test_valid_event_passes() {
        assert!(validate_event(&valid_event()).is_ok());
    }

    #[test]
    fn test_extra_fields_are_allowed_and_preserved() {
        let event = valid_event().with("color", "red").with("nested", json!({"a": [1, 2]}));
        assert!(validate_event(&event).is_ok());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["color"], "red");
        assert_eq!(value["nested"]["a"][1], 2);
    }

    #[test]
    fn test_missing_event_name_fails() {
        let event = Event::default()
            .with(SOURCE_ID, "svc-1")
            .with(TIMESTAMP, 1u64);
        let err = validate_event(&event).unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(ref m) if m.contains("eventName")));
    }

    #[test]
    fn test_reports_every_violation() {
        let event = Event::default()
            .with(SOURCE_ID, 7)
            .with(TIMESTAMP, -5);
        let msg = validate_event(&event).unwrap_err().to_string();
        assert!(msg.contains("'sourceId' must be a string"));
        assert!(msg.contains("'timestamp' must be >= 0"));
        assert!(msg.contains("'eventName' is required"));
    }

    #[test]
    fn test_timestamp_must_be_integer() {
        let event = valid_event().with(TIMESTAMP, 12.5);
        assert!(validate_event(&event).is_err());

        let event = valid_event().with(TIMESTAMP, "1700000000000");
        assert!(validate_event(&event).is_err());

        let event = valid_event().with(TIMESTAMP, 0);
        assert!(validate_event(&event).is_ok());
    }

    #[test]
    fn test_validate_events_names_offending_index() {
        let events = vec![valid_event(), valid_event(), Event::new("no_source")];
        let msg = validate_events(&events).unwrap_err().to_string();
        assert!(msg.contains("event #2"), "{msg}");

        assert!(validate_events(&[]).is_ok());
    }

    #[test]
    fn test_enrichment_fills_absent_fields() {
        let event = Event::new("clicked").with(TIMESTAMP, Value::Null);
        let enriched = event.enriched(Some("svc-9"), 42);

        assert_eq!(enriched.source_id(), Some("svc-9"));
        assert_eq!(enriched.timestamp(), Some(42));
        // input left untouched
        assert!(event.source_id().is_none());
    }

    #[test]
    fn test_enrichment_keeps_producer_values() {
        let event = valid_event();
        let enriched = event.enriched(Some("other"), 42);
        assert_eq!(enriched, event);
    }

    #[test]
    fn test_enrichment_without_default_source() {
        let enriched = Event::new("clicked").enriched(None, 42);
        assert!(enriched.get(SOURCE_ID).is_none());
        assert!(validate_event(&enriched).is_err());
    }

    #[test]
    fn test_try_from_value() {
        let event = Event::try_from(json!({"eventName": "x"})).unwrap();
        assert_eq!(event.event_name(), Some("x"));

        let err = Event::try_from(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }
}
