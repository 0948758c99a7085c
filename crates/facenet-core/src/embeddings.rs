//! Embedding sets exported by the recognition model.
//!
//! The model runs outside this crate; it writes a JSON array of
//! `{ "file": ..., "embedding": { "values": [...], "model_version": ... } }`
//! records. Records are matched to dataset files by identity directory and
//! file name, so exports made on another machine still line up.

use crate::types::Embedding;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("cannot read embeddings {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse embeddings {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("embedding for {file} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        file: String,
        expected: usize,
        actual: usize,
    },
}

/// One exported embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub file: PathBuf,
    pub embedding: Embedding,
}

/// Embeddings stacked row-wise, one row per entry of `files`.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    pub files: Vec<PathBuf>,
    pub matrix: Array2<f32>,
    /// Requested files with no embedding in the set.
    pub missing: Vec<PathBuf>,
}

/// Embeddings keyed by `<identity>/<file name>`.
#[derive(Debug, Default, Clone)]
pub struct EmbeddingSet {
    by_key: HashMap<String, Embedding>,
}

impl EmbeddingSet {
    pub fn from_records(records: impl IntoIterator<Item = EmbeddingRecord>) -> Self {
        let by_key = records
            .into_iter()
            .map(|r| (identity_key(&r.file), r.embedding))
            .collect();
        Self { by_key }
    }

    pub fn from_json_str(src: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<EmbeddingRecord> = serde_json::from_str(src)?;
        Ok(Self::from_records(records))
    }

    pub fn load(path: &Path) -> Result<Self, EmbeddingError> {
        let src = std::fs::read_to_string(path).map_err(|source| EmbeddingError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::from_json_str(&src).map_err(|source| EmbeddingError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), embeddings = set.len(), "embeddings loaded");
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, file: &Path) -> Option<&Embedding> {
        self.by_key.get(&identity_key(file))
    }

    /// Stack the embeddings of `files` in order.
    ///
    /// Files without an embedding are skipped and listed in `missing`.
    /// Every embedding must have the dimension of the first one found.
    pub fn matrix_for(&self, files: &[PathBuf]) -> Result<EmbeddingMatrix, EmbeddingError> {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        let mut values = Vec::new();
        let mut dim = None;

        for file in files {
            let Some(embedding) = self.get(file) else {
                tracing::warn!(file = %file.display(), "no embedding for file; skipped");
                missing.push(file.clone());
                continue;
            };

            let expected = *dim.get_or_insert(embedding.dim());
            if embedding.dim() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    file: file.display().to_string(),
                    expected,
                    actual: embedding.dim(),
                });
            }
            values.extend_from_slice(&embedding.values);
            found.push(file.clone());
        }

        let shape = (found.len(), dim.unwrap_or(0));
        let matrix = Array2::from_shape_vec(shape, values).map_err(|_| {
            EmbeddingError::DimensionMismatch {
                file: String::new(),
                expected: shape.1,
                actual: 0,
            }
        })?;

        Ok(EmbeddingMatrix {
            files: found,
            matrix,
            missing,
        })
    }
}

/// `<identity dir>/<file name>` tail of a path.
fn identity_key(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().and_then(|p| p.file_name()) {
        Some(class) => format!("{}/{file}", class.to_string_lossy()),
        None => file,
    }
}
