//! facenet-core — Dataset bookkeeping for face-embedding training and validation.
//!
//! Discovers per-identity image folders, filters them through a validity
//! store, computes positive/negative pair statistics and produces
//! train/test splits. Also hosts the embedding-side analyses that consume
//! those datasets: outlier detection and pair-based ROC validation.

pub mod config;
pub mod dataset;
pub mod embeddings;
pub mod oracle;
pub mod outliers;
pub mod pairs;
pub mod split;
pub mod types;
pub mod validation;

pub use config::DatasetConfig;
pub use dataset::{image_paths_and_labels, DBase, DatasetError, ImageClass};
pub use oracle::{oracle_key, MemoryOracle, SqliteOracle, ValidityOracle};
pub use split::SplitMode;
pub use types::Embedding;
