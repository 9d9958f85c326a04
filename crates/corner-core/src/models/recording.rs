//! Recording model

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{MediaKind, Tag};

/// Opaque identifier assigned by the catalog store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordingId(String);

impl RecordingId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// Serial primary keys come back as numbers, uuid keys as strings.
impl<'de> Deserialize<'de> for RecordingId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(value) => Ok(Self(value)),
            serde_json::Value::Number(value) => Ok(Self(value.to_string())),
            other => Err(de::Error::custom(format!(
                "expected string or number id, got {other}"
            ))),
        }
    }
}

/// A stored journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: RecordingId,
    pub user_id: String,
    /// Audio or video
    #[serde(rename = "file_type")]
    pub kind: MediaKind,
    /// Public locator of the stored object
    pub file_url: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Recording {
    /// Calendar day of the recording as seen from `offset`
    pub fn local_date(&self, offset: &FixedOffset) -> NaiveDate {
        self.created_at.with_timezone(offset).date_naive()
    }

    /// Check tag membership by label
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags
            .iter()
            .any(|label| label.trim().eq_ignore_ascii_case(tag.label()))
    }
}

// Tags arrive as a JSON array, as a string holding a JSON array, or as null.
fn deserialize_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => Ok(labels_from_array(items)),
        Some(serde_json::Value::String(encoded)) => {
            let encoded = encoded.trim();
            if encoded.is_empty() {
                return Ok(Vec::new());
            }
            match serde_json::from_str::<serde_json::Value>(encoded) {
                Ok(serde_json::Value::Array(items)) => Ok(labels_from_array(items)),
                Ok(serde_json::Value::Null) => Ok(Vec::new()),
                _ => Err(de::Error::custom("tags string is not a JSON array")),
            }
        }
        Some(other) => Err(de::Error::custom(format!(
            "unexpected tags value {other}"
        ))),
    }
}

fn labels_from_array(items: Vec<serde_json::Value>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::String(label) if !label.trim().is_empty() => Some(label),
            _ => None,
        })
        .collect()
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
}

/// Parse an RFC 3339 timestamp, treating values without an offset as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(tags: &str) -> String {
        format!(
            r#"{{"id":7,"user_id":"user_1","file_type":"audio","file_url":"https://cdn.example.com/user_1/a.webm","note":null,"tags":{tags},"created_at":"2024-01-01T23:30:00+00:00"}}"#
        )
    }

    #[test]
    fn decodes_tags_in_every_stored_shape() {
        let from_array: Recording = serde_json::from_str(&row(r#"["Happy","Work"]"#)).unwrap();
        let from_string: Recording =
            serde_json::from_str(&row(r#""[\"Happy\",\"Work\"]""#)).unwrap();
        let from_null: Recording = serde_json::from_str(&row("null")).unwrap();

        assert_eq!(from_array.tags, vec!["Happy", "Work"]);
        assert_eq!(from_string.tags, from_array.tags);
        assert!(from_null.tags.is_empty());
        assert_eq!(from_array.id, RecordingId::new("7"));
    }

    #[test]
    fn local_date_uses_viewer_offset() {
        let recording: Recording = serde_json::from_str(&row("[]")).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();

        assert_eq!(
            recording.local_date(&utc),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(
            recording.local_date(&tokyo),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn parse_timestamp_accepts_naive_values() {
        let parsed = parse_timestamp("2024-03-05T10:15:00.123456").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T10:15:00.123456+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn has_tag_matches_labels() {
        let recording: Recording = serde_json::from_str(&row(r#"["trigger warning"]"#)).unwrap();
        assert!(recording.has_tag(Tag::TriggerWarning));
        assert!(!recording.has_tag(Tag::Happy));
    }
}
