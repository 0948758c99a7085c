//! Identity dataset discovery.
//!
//! A dataset root holds one directory per identity:
//!
//! ```text
//! root/
//!   alice/  a.png b.png c.png
//!   bob/    d.png
//! ```
//!
//! Discovery order matters for reproducibility: classes are sorted by name
//! and capped first, then each class is filtered through the validity
//! oracle, and only then subsampled. A class cut by the cap never has its
//! files inspected.

use crate::config::DatasetConfig;
use crate::oracle::{OracleError, SqliteOracle, ValidityOracle};
use crate::pairs::{self, PairStats};
use crate::split::{self, SplitMode};
use ndarray::{Array2, Axis};
use rand::Rng;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("directory {0} does not exist")]
    NotFound(String),
    #[error("the number of images in the dataset is {0}")]
    EmptyDataset(usize),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("validity store: {0}")]
    Oracle(#[from] OracleError),
}

/// The files of one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageClass {
    pub name: String,
    pub files: Vec<PathBuf>,
    /// Ordinal assigned at discovery. Classes built by a split carry `None`.
    pub count: Option<usize>,
}

impl ImageClass {
    pub fn new(name: impl Into<String>, files: Vec<PathBuf>, count: Option<usize>) -> Self {
        Self {
            name: name.into(),
            files,
            count,
        }
    }

    pub fn nrof_images(&self) -> usize {
        self.files.len()
    }

    /// Unordered pairs within the class.
    pub fn nrof_pairs(&self) -> usize {
        pairs::nrof_pairs(self.nrof_images())
    }
}

impl fmt::Display for ImageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} images", self.name, self.nrof_images())
    }
}

/// Flatten classes into a path list and a parallel label vector.
///
/// Labels are positions in `classes`, not discovery ordinals.
pub fn image_paths_and_labels(classes: &[ImageClass]) -> (Vec<PathBuf>, Vec<usize>) {
    let mut paths = Vec::new();
    let mut labels = Vec::new();
    for (idx, cls) in classes.iter().enumerate() {
        paths.extend(cls.files.iter().cloned());
        labels.extend(std::iter::repeat(idx).take(cls.nrof_images()));
    }
    (paths, labels)
}

/// A discovered dataset. Read-only after construction.
#[derive(Debug, Clone)]
pub struct DBase {
    config: DatasetConfig,
    classes: Vec<ImageClass>,
}

impl DBase {
    /// Discover the dataset described by `config`.
    ///
    /// When `config.h5file` is set the store is opened as a [`SqliteOracle`]
    /// and must already exist.
    pub fn load<R: Rng + ?Sized>(
        config: &DatasetConfig,
        rng: &mut R,
    ) -> Result<Self, DatasetError> {
        match config.validity_store() {
            Some(store) => {
                let oracle = SqliteOracle::open_existing(&store)?;
                Self::load_with_oracle(config, Some(&oracle), rng)
            }
            None => Self::load_with_oracle(config, None, rng),
        }
    }

    /// Discover the dataset, filtering files through `oracle` if given.
    pub fn load_with_oracle<R: Rng + ?Sized>(
        config: &DatasetConfig,
        oracle: Option<&dyn ValidityOracle>,
        rng: &mut R,
    ) -> Result<Self, DatasetError> {
        let root = config.root();
        if !root.is_dir() {
            return Err(DatasetError::NotFound(root.display().to_string()));
        }

        let mut candidates = list_class_dirs(&root)?;
        if let Some(cap) = config.nrof_classes {
            candidates.truncate(cap);
        }

        let total = candidates.len();
        let mut classes = Vec::with_capacity(total);

        for (count, (name, dir)) in candidates.into_iter().enumerate() {
            let mut files = list_files(&dir, &config.extension)?;

            if let Some(oracle) = oracle {
                let mut kept = Vec::with_capacity(files.len());
                for file in files {
                    if oracle.is_valid(&file, true)? {
                        kept.push(file);
                    }
                }
                files = kept;
            }

            if let Some(cap) = config.nrof_images {
                if files.len() > cap {
                    files = sample_files(files, cap, rng);
                }
            }

            if files.is_empty() {
                tracing::debug!(count, total, class = %name, "class dropped: no files left");
                continue;
            }

            tracing::debug!(count, total, class = %name, images = files.len(), "class loaded");
            classes.push(ImageClass::new(name, files, Some(count)));
        }

        let dbase = Self {
            config: DatasetConfig {
                path: root,
                ..config.clone()
            },
            classes,
        };

        let nrof_images = dbase.nrof_images();
        if nrof_images < 1 {
            return Err(DatasetError::EmptyDataset(nrof_images));
        }

        tracing::info!(
            path = %dbase.config.path.display(),
            classes = dbase.nrof_classes(),
            images = nrof_images,
            "dataset loaded"
        );

        Ok(dbase)
    }

    /// Build a dataset from in-memory classes. Empty classes are dropped.
    #[cfg(test)]
    pub(crate) fn from_classes(
        config: DatasetConfig,
        classes: Vec<ImageClass>,
    ) -> Result<Self, DatasetError> {
        let classes: Vec<ImageClass> =
            classes.into_iter().filter(|c| !c.files.is_empty()).collect();
        let dbase = Self { config, classes };
        let nrof_images = dbase.nrof_images();
        if nrof_images < 1 {
            return Err(DatasetError::EmptyDataset(nrof_images));
        }
        Ok(dbase)
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn classes(&self) -> &[ImageClass] {
        &self.classes
    }

    /// Class index of every image, in class then file order.
    pub fn labels(&self) -> Vec<usize> {
        image_paths_and_labels(&self.classes).1
    }

    /// Every file path, parallel to [`labels`](Self::labels).
    pub fn files(&self) -> Vec<PathBuf> {
        self.classes.iter().flat_map(|c| c.files.iter().cloned()).collect()
    }

    pub fn nrof_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn nrof_images(&self) -> usize {
        self.classes.iter().map(ImageClass::nrof_images).sum()
    }

    pub fn min_nrof_images(&self) -> usize {
        self.classes.iter().map(ImageClass::nrof_images).min().unwrap_or(0)
    }

    pub fn max_nrof_images(&self) -> usize {
        self.classes.iter().map(ImageClass::nrof_images).max().unwrap_or(0)
    }

    pub fn pair_stats(&self) -> PairStats {
        PairStats::from_class_sizes(self.classes.iter().map(ImageClass::nrof_images))
    }

    pub fn nrof_pairs(&self) -> usize {
        pairs::nrof_pairs(self.nrof_images())
    }

    pub fn nrof_positive_pairs(&self) -> usize {
        self.classes.iter().map(ImageClass::nrof_pairs).sum()
    }

    pub fn nrof_negative_pairs(&self) -> usize {
        self.nrof_pairs() - self.nrof_positive_pairs()
    }

    /// Files of class `class_idx`, selected through the label vector.
    pub fn extract_data(&self, class_idx: usize) -> Vec<PathBuf> {
        let files = self.files();
        self.label_indices(class_idx)
            .into_iter()
            .map(|i| files[i].clone())
            .collect()
    }

    /// Rows of `embeddings` belonging to class `class_idx`.
    ///
    /// `embeddings` must hold one row per image in [`files`](Self::files) order.
    pub fn extract_embeddings(
        &self,
        class_idx: usize,
        embeddings: &Array2<f32>,
    ) -> Result<Array2<f32>, DatasetError> {
        if embeddings.nrows() != self.nrof_images() {
            return Err(DatasetError::InvalidArgument(format!(
                "expected {} embedding rows, got {}",
                self.nrof_images(),
                embeddings.nrows()
            )));
        }
        Ok(embeddings.select(Axis(0), &self.label_indices(class_idx)))
    }

    fn label_indices(&self, class_idx: usize) -> Vec<usize> {
        self.labels()
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class_idx)
            .map(|(i, _)| i)
            .collect()
    }

    /// Partition into train and test class lists.
    ///
    /// `ratio` is the share reserved for test. See [`SplitMode`] for how
    /// each mode partitions. A `ratio` that is `NaN` or above 1 is an
    /// [`DatasetError::InvalidArgument`]. `self` is never modified.
    pub fn split<R: Rng + ?Sized>(
        &self,
        ratio: f64,
        min_nrof_images_per_class: usize,
        mode: SplitMode,
        rng: &mut R,
    ) -> Result<(Vec<ImageClass>, Vec<ImageClass>), DatasetError> {
        split::split_classes(&self.classes, ratio, min_nrof_images_per_class, mode, rng)
    }
}

impl fmt::Display for DBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.pair_stats();
        let store = self
            .config
            .validity_store()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string());

        writeln!(f, "class DBase")?;
        writeln!(f, "Directory to load images {}", self.config.path.display())?;
        writeln!(f, "Validity store to filter images {store}")?;
        writeln!(f, "Number of classes {}", self.nrof_classes())?;
        writeln!(f, "Number of images {}", self.nrof_images())?;
        writeln!(f, "Number of pairs {}", stats.pairs)?;
        writeln!(
            f,
            "Number of positive pairs {} ({})",
            stats.positive,
            format_percent(stats.positive_percent())
        )?;
        writeln!(
            f,
            "Number of negative pairs {} ({})",
            stats.negative,
            format_percent(stats.negative_percent())
        )?;
        writeln!(f, "Minimal number of images in class {}", self.min_nrof_images())?;
        writeln!(f, "Maximal number of images in class {}", self.max_nrof_images())
    }
}

fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.6} %"),
        None => "undefined".to_string(),
    }
}

/// Immediate subdirectories of `root`, sorted by name.
fn list_class_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, DatasetError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
            dirs.push((name, path));
        }
    }
    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(dirs)
}

/// Regular files in `dir` whose name ends with `extension`, sorted.
fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, DatasetError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(extension))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Uniform sample of `amount` files without replacement. Kept files stay
/// in their original (sorted) order.
fn sample_files<R: Rng + ?Sized>(files: Vec<PathBuf>, amount: usize, rng: &mut R) -> Vec<PathBuf> {
    let mut picked = rand::seq::index::sample(rng, files.len(), amount).into_vec();
    picked.sort_unstable();
    let mut files: Vec<Option<PathBuf>> = files.into_iter().map(Some).collect();
    picked.into_iter().filter_map(|i| files[i].take()).collect()
}
