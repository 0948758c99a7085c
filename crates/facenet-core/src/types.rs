use serde::{Deserialize, Serialize};

/// Face embedding vector produced by an external recognition model.
///
/// Distance computations happen on stacked `ndarray` matrices (see
/// `outliers` and `validation`), not per embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model that produced this embedding (e.g., "20201008-183421").
    #[serde(default)]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}
