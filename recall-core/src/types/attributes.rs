use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form attribute map carried by statements.
///
/// Stored as an opaque JSON object at the adapter boundary; the pipeline
/// only ever reads it through the typed accessors below. Unknown keys are
/// preserved untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementAttributes(pub Map<String, Value>);

impl StatementAttributes {
    /// Create an empty attribute map
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// When the stated fact occurred, if the source provided a parseable
    /// ISO-8601 instant. Unparseable values are treated as absent.
    #[must_use]
    pub fn event_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.0.get("event_date")?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    /// ISO-8601 duration string, verbatim
    #[must_use]
    pub fn duration(&self) -> Option<&str> {
        self.0.get("duration")?.as_str()
    }

    /// Free-text temporal qualifier ("every Monday", "since 2020")
    #[must_use]
    pub fn temporal_context(&self) -> Option<&str> {
        self.0.get("temporal_context")?.as_str()
    }

    /// Extraction confidence in `[0, 1]`
    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        self.0.get("confidence")?.as_f64()
    }

    /// Source label recorded at extraction time
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.0.get("source")?.as_str()
    }

    /// Insert or replace a raw attribute value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Whether the map carries no attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for StatementAttributes {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> StatementAttributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn event_date_parses_rfc3339() {
        let a = attrs(json!({"event_date": "2024-03-01T12:00:00Z"}));
        let dt = a.event_date().unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn unparseable_event_date_is_none() {
        let a = attrs(json!({"event_date": "last summer"}));
        assert!(a.event_date().is_none());

        let a = attrs(json!({"event_date": 20240301}));
        assert!(a.event_date().is_none());
    }

    #[test]
    fn typed_accessors_read_known_keys() {
        let a = attrs(json!({
            "duration": "P3D",
            "temporal_context": "every Monday",
            "confidence": 0.92,
            "source": "chat",
            "custom": {"nested": true}
        }));
        assert_eq!(a.duration(), Some("P3D"));
        assert_eq!(a.temporal_context(), Some("every Monday"));
        assert_eq!(a.confidence(), Some(0.92));
        assert_eq!(a.source(), Some("chat"));
        // Unknown keys survive round-trips
        let back = serde_json::to_value(&a).unwrap();
        assert_eq!(back["custom"]["nested"], json!(true));
    }
}
