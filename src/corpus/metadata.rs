//! Per-document metadata and its encoding at the storage boundary
//!
//! Metadata is an open mapping from string keys to a small tagged union.
//! Stores persist it as a JSON object; older corpora carried list-valued
//! fields (authors, keywords) as JSON-encoded strings, which `decode_metadata`
//! turns back into lists.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Ordered so encoded metadata is stable across runs
pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A single metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetadataValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert an arbitrary JSON value. `null` has no representation and
    /// yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(MetadataValue::Text(b.to_string())),
            Value::Number(n) => n.as_f64().map(MetadataValue::Number),
            Value::String(s) => Some(decode_string(s)),
            Value::Array(items) => Some(MetadataValue::List(
                items.iter().filter_map(list_item).collect(),
            )),
            Value::Object(_) => Some(MetadataValue::Text(value.to_string())),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => write!(f, "{}", s),
            MetadataValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

/// A string holding a JSON array of strings is a list that was flattened on
/// its way into a store.
fn decode_string(s: &str) -> MetadataValue {
    let trimmed = s.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return MetadataValue::List(items);
        }
    }
    MetadataValue::Text(s.to_string())
}

fn list_item(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Build metadata from a JSON object, dropping null values
pub fn metadata_from_json(map: &serde_json::Map<String, Value>) -> Metadata {
    map.iter()
        .filter_map(|(key, value)| MetadataValue::from_json(value).map(|v| (key.clone(), v)))
        .collect()
}

/// Encode metadata for storage
pub fn encode_metadata(metadata: &Metadata) -> Result<String, MetadataError> {
    Ok(serde_json::to_string(metadata)?)
}

/// Decode metadata read back from storage
pub fn decode_metadata(encoded: &str) -> Result<Metadata, MetadataError> {
    let value: Value = serde_json::from_str(encoded)?;
    match &value {
        Value::Object(map) => Ok(metadata_from_json(map)),
        Value::Null => Err(MetadataError::NotAnObject("null")),
        Value::Bool(_) => Err(MetadataError::NotAnObject("a boolean")),
        Value::Number(_) => Err(MetadataError::NotAnObject("a number")),
        Value::String(_) => Err(MetadataError::NotAnObject("a string")),
        Value::Array(_) => Err(MetadataError::NotAnObject("an array")),
    }
}

/// Fill keys missing from `base` with values from `other`.
///
/// Keys already present in `base` are never overwritten, so merging strategy
/// contributions in configured order gives the first strategy precedence.
pub fn merge_first_wins(base: &mut Metadata, other: &Metadata) {
    for (key, value) in other {
        base.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_encoded_lists() {
        let encoded = r#"{"title":"ECLSS telemetry","authors":"[\"A. Smith\", \"B. Jones\"]","paper_id":1035}"#;
        let metadata = decode_metadata(encoded).unwrap();

        assert_eq!(
            metadata["authors"].as_list().unwrap(),
            &["A. Smith".to_string(), "B. Jones".to_string()]
        );
        assert_eq!(metadata["title"].as_str(), Some("ECLSS telemetry"));
        assert_eq!(metadata["paper_id"].as_f64(), Some(1035.0));
    }

    #[test]
    fn test_bracketed_text_stays_text() {
        let metadata = decode_metadata(r#"{"note":"[draft] not a list"}"#).unwrap();
        assert_eq!(metadata["note"].as_str(), Some("[draft] not a list"));
    }

    #[test]
    fn test_encode_decode_preserves_values() {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), "Martian soil".into());
        metadata.insert("year".into(), 2024.0.into());
        metadata.insert(
            "keywords".into(),
            vec!["regolith".to_string(), "perchlorate".to_string()].into(),
        );

        let decoded = decode_metadata(&encode_metadata(&metadata).unwrap()).unwrap();
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            decode_metadata("[1, 2]"),
            Err(MetadataError::NotAnObject(_))
        ));
        assert!(matches!(decode_metadata("{"), Err(MetadataError::Json(_))));
    }

    #[test]
    fn test_nulls_dropped() {
        let metadata = decode_metadata(r#"{"doi":null,"source":"ices"}"#).unwrap();
        assert!(!metadata.contains_key("doi"));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn test_merge_first_wins() {
        let mut first = Metadata::new();
        first.insert("title".into(), "from dense".into());

        let mut second = Metadata::new();
        second.insert("title".into(), "from sparse".into());
        second.insert("url".into(), "https://example.org/1".into());

        merge_first_wins(&mut first, &second);

        assert_eq!(first["title"].as_str(), Some("from dense"));
        assert_eq!(first["url"].as_str(), Some("https://example.org/1"));
    }

    #[test]
    fn test_display_integral_numbers() {
        assert_eq!(MetadataValue::Number(2024.0).to_string(), "2024");
        assert_eq!(MetadataValue::Number(0.5).to_string(), "0.5");
    }
}
