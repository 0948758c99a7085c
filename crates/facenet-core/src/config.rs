//! Dataset configuration.
//!
//! Loaded from the `[dataset]` table of a TOML file, then overridden by
//! `FACENET_*` environment variables. Every field has a documented default,
//! so an empty file (or no file) yields a usable configuration once `path`
//! is supplied.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings consumed by dataset discovery.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Root directory laid out as `<root>/<class_name>/<image_file>`.
    pub path: PathBuf,
    /// Keep only the first N classes in directory-name order.
    pub nrof_classes: Option<usize>,
    /// Randomly subsample each class down to at most N files.
    pub nrof_images: Option<usize>,
    /// Validity store consulted during discovery (SQLite file).
    pub h5file: Option<PathBuf>,
    /// File-name suffix filter, e.g. `".png"`. Empty matches every file.
    pub extension: String,
    /// Seed for subsampling and splitting.
    pub seed: u64,
}

/// Top-level layout of a config file. Unknown tables are ignored so the
/// same file can carry settings for other tools.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    dataset: DatasetConfig,
}

impl DatasetConfig {
    /// Configuration for `path` with every optional setting at its default.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parse the `[dataset]` table from TOML text.
    pub fn from_toml_str(src: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(src)?;
        Ok(file.dataset)
    }

    /// Load the `[dataset]` table from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `FACENET_*` environment overrides on top of `self`.
    ///
    /// Values that fail to parse leave the current setting untouched.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("FACENET_DATASET_PATH") {
            self.path = PathBuf::from(v);
        }
        if let Some(v) = env_parse::<usize>("FACENET_NROF_CLASSES") {
            self.nrof_classes = Some(v);
        }
        if let Some(v) = env_parse::<usize>("FACENET_NROF_IMAGES") {
            self.nrof_images = Some(v);
        }
        if let Ok(v) = std::env::var("FACENET_H5FILE") {
            self.h5file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("FACENET_EXTENSION") {
            self.extension = v;
        }
        self.seed = env_parse("FACENET_SEED").unwrap_or(self.seed);
        self
    }

    /// Dataset root with a leading `~` expanded.
    pub fn root(&self) -> PathBuf {
        expand_home(&self.path)
    }

    /// Validity store path with a leading `~` expanded.
    pub fn validity_store(&self) -> Option<PathBuf> {
        self.h5file.as_deref().map(expand_home)
    }
}

/// Expand a leading `~` component against `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(rest)
        }
        Err(_) => path.to_path_buf(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
