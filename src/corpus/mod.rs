//! Corpus store: the fixed, pre-labeled set of verses loaded once at startup.
//!
//! Records are read from a JSON array. Every field is required; a record that
//! omits one fails the whole load rather than surfacing later at query time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus file '{path}' could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus file '{path}' is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate passage id '{0}'")]
    DuplicateId(String),
    #[error("corpus file '{0}' contains no passages")]
    Empty(PathBuf),
}

/// One verse with its structured metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub chapter: i64,
    pub verse: i64,
    pub themes: Vec<String>,
    #[serde(rename = "modern_commentary", alias = "commentary")]
    pub commentary: String,
    #[serde(rename = "translation_sivananda", alias = "primary_translation")]
    pub primary_translation: String,
    #[serde(rename = "translation_telugu", alias = "secondary_translation")]
    pub secondary_translation: String,
    #[serde(rename = "sanskrit", alias = "original_text")]
    pub original_text: String,
}

impl Passage {
    /// The searchable string embedded for this passage.
    pub fn searchable_text(&self) -> String {
        format!(
            "Themes: {}. Commentary: {}",
            self.themes.join(", "),
            self.commentary
        )
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Float(f) => f.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct Corpus {
    source: PathBuf,
    passages: Vec<Passage>,
}

impl Corpus {
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let contents = fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let passages: Vec<Passage> =
            serde_json::from_str(&contents).map_err(|source| CorpusError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if passages.is_empty() {
            return Err(CorpusError::Empty(path.to_path_buf()));
        }

        let corpus = Self::from_passages(path.to_path_buf(), passages)?;
        tracing::info!(
            "Loaded {} passages from {}",
            corpus.len(),
            path.display()
        );
        Ok(corpus)
    }

    pub fn from_passages(source: PathBuf, passages: Vec<Passage>) -> Result<Self, CorpusError> {
        let mut seen = HashSet::with_capacity(passages.len());
        for passage in &passages {
            if !seen.insert(passage.id.as_str()) {
                return Err(CorpusError::DuplicateId(passage.id.clone()));
            }
        }
        Ok(Self { source, passages })
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Hex SHA-256 of the passages in order; changes whenever any record does.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for passage in &self.passages {
            // Passage only holds strings and integers, so serialization cannot fail.
            let encoded = serde_json::to_vec(passage).unwrap_or_default();
            hasher.update(&encoded);
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
