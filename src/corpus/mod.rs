//! Corpus entries and the JSONL ingestion boundary
//!
//! A corpus entry is one logical document. Its `document_id` is assigned once
//! here and is the only key joining the dense and sparse representations.

mod metadata;

pub use metadata::{
    decode_metadata, encode_metadata, merge_first_wins, metadata_from_json, Metadata,
    MetadataError, MetadataValue,
};

use crate::error::{PaperfuseError, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::Path;
use uuid::Uuid;

/// One document of the corpus
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    pub document_id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl CorpusEntry {
    pub fn new(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A corpus file row
#[derive(Debug, Deserialize)]
struct CorpusRecord {
    #[serde(default)]
    document_id: Option<String>,
    text: String,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CorpusRecord {
    fn into_entry(self) -> CorpusEntry {
        let document_id = match self.document_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        CorpusEntry {
            document_id,
            text: self.text,
            metadata: self
                .metadata
                .as_ref()
                .map(metadata_from_json)
                .unwrap_or_default(),
        }
    }
}

/// Read a JSONL corpus file, one document per line.
///
/// Rows without a `document_id` are given a fresh UUID. Blank lines are skipped.
pub fn read_corpus(path: &Path) -> Result<Vec<CorpusEntry>> {
    let file = std::fs::File::open(path).map_err(|e| PaperfuseError::Io {
        source: e,
        context: format!("Failed to open corpus file: {:?}", path),
    })?;

    let mut entries = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PaperfuseError::Io {
            source: e,
            context: format!("Failed to read line {} of {:?}", line_no + 1, path),
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let record: CorpusRecord =
            serde_json::from_str(&line).map_err(|e| PaperfuseError::Json {
                source: e,
                context: format!("Invalid corpus row at line {}", line_no + 1),
            })?;

        entries.push(record.into_entry());
    }

    tracing::info!("Read {} corpus entries from {:?}", entries.len(), path);

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_corpus() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"document_id":"ices-1","text":"Water recovery in ECLSS","metadata":{"title":"Water","year":2021}}"#,
                "\n\n",
                r#"{"text":"Radiation shielding for habitats"}"#,
                "\n"
            ),
        )
        .unwrap();

        let entries = read_corpus(&path).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].document_id, "ices-1");
        assert_eq!(entries[0].metadata["year"].as_f64(), Some(2021.0));
        assert!(Uuid::parse_str(&entries[1].document_id).is_ok());
        assert!(entries[1].metadata.is_empty());
    }

    #[test]
    fn test_read_corpus_reports_bad_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.jsonl");
        std::fs::write(&path, "{\"text\":\"ok\"}\nnot json\n").unwrap();

        let err = read_corpus(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
