//! Pair-based verification metrics.
//!
//! Every unordered pair of images is scored by the squared Euclidean
//! distance between their embeddings. A pair is predicted "same identity"
//! when its distance is at most the threshold. Sweeping the threshold gives
//! the ROC curve.

use crate::dataset::DBase;
use crate::embeddings::{EmbeddingError, EmbeddingSet};
use crate::pairs::PairStats;
use ndarray::Array2;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("threshold grid is empty")]
    EmptyGrid,
    #[error("invalid threshold grid \"{0}\", expected start:stop:step")]
    BadGrid(String),
    #[error("threshold grid \"{0}\" has more than {max} points", max = MAX_GRID_POINTS)]
    GridTooLarge(String),
    #[error("{rows} embedding rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("{values} embedding values do not fill {rows} rows of {dim}")]
    ShapeMismatch { rows: usize, dim: usize, values: usize },
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Upper bound on the number of thresholds in a grid.
pub const MAX_GRID_POINTS: usize = 100_000;

/// Evenly spaced thresholds `start, start + step, ...` up to `stop` exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdGrid {
    pub start: f32,
    pub stop: f32,
    pub step: f32,
}

impl Default for ThresholdGrid {
    /// Covers the full [0, 4) range of unit-length embeddings.
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 4.0,
            step: 0.01,
        }
    }
}

impl ThresholdGrid {
    /// Number of points in the grid, uncapped.
    ///
    /// Non-finite bounds, a non-positive step or `stop <= start` give 0.
    pub fn len(&self) -> usize {
        let finite = self.start.is_finite() && self.stop.is_finite() && self.step.is_finite();
        if !finite || self.step <= 0.0 || self.stop <= self.start {
            return 0;
        }
        // tolerance keeps float drift from adding a point at `stop`
        let span = (f64::from(self.stop) - f64::from(self.start)) / f64::from(self.step);
        (span - 1e-3).ceil().max(0.0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Threshold values, at most [`MAX_GRID_POINTS`] of them.
    pub fn values(&self) -> Vec<f32> {
        let n = self.len().min(MAX_GRID_POINTS);
        (0..n).map(|i| self.start + i as f32 * self.step).collect()
    }
}

impl FromStr for ThresholdGrid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f32> = s
            .split(':')
            .map(|p| p.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| ValidationError::BadGrid(s.to_string()))?;
        let grid = match parts.as_slice() {
            &[start, stop, step] if parts.iter().all(|v| v.is_finite()) => {
                Self { start, stop, step }
            }
            _ => return Err(ValidationError::BadGrid(s.to_string())),
        };
        if grid.len() > MAX_GRID_POINTS {
            return Err(ValidationError::GridTooLarge(s.to_string()));
        }
        Ok(grid)
    }
}

/// Confusion counts at one threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    pub threshold: f32,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl RocPoint {
    /// True positive rate, `None` without positive pairs.
    pub fn tpr(&self) -> Option<f64> {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// False positive rate, `None` without negative pairs.
    pub fn fpr(&self) -> Option<f64> {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }

    pub fn accuracy(&self) -> Option<f64> {
        let total =
            self.true_positives + self.false_positives + self.true_negatives + self.false_negatives;
        ratio(self.true_positives + self.true_negatives, total)
    }
}

/// ROC curve over a threshold grid.
#[derive(Debug, Clone)]
pub struct RocReport {
    pub positive_pairs: usize,
    pub negative_pairs: usize,
    pub points: Vec<RocPoint>,
}

impl RocReport {
    /// Point with the highest accuracy; the lowest threshold wins ties.
    pub fn best(&self) -> Option<&RocPoint> {
        self.points
            .iter()
            .filter(|p| p.accuracy().is_some())
            .fold(None, |best: Option<&RocPoint>, p| match best {
                Some(b) if b.accuracy() >= p.accuracy() => Some(b),
                _ => Some(p),
            })
    }
}

/// Evaluate all pairs of `embeddings` rows labelled by `labels`.
pub fn evaluate(
    embeddings: &Array2<f32>,
    labels: &[usize],
    thresholds: &[f32],
) -> Result<RocReport, ValidationError> {
    if thresholds.is_empty() {
        return Err(ValidationError::EmptyGrid);
    }
    if embeddings.nrows() != labels.len() {
        return Err(ValidationError::LengthMismatch {
            rows: embeddings.nrows(),
            labels: labels.len(),
        });
    }

    let n = labels.len();
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let diff = &embeddings.row(i) - &embeddings.row(j);
            let d = diff.dot(&diff);
            if labels[i] == labels[j] {
                positive.push(d);
            } else {
                negative.push(d);
            }
        }
    }
    positive.sort_by(f32::total_cmp);
    negative.sort_by(f32::total_cmp);

    let points = thresholds
        .iter()
        .map(|&t| {
            let tp = positive.partition_point(|&d| d <= t);
            let fp = negative.partition_point(|&d| d <= t);
            RocPoint {
                threshold: t,
                true_positives: tp,
                false_negatives: positive.len() - tp,
                false_positives: fp,
                true_negatives: negative.len() - fp,
            }
        })
        .collect();

    Ok(RocReport {
        positive_pairs: positive.len(),
        negative_pairs: negative.len(),
        points,
    })
}

/// Evaluate `dbase` with embeddings from `set`, skipping images without one.
pub fn validate(
    dbase: &DBase,
    set: &EmbeddingSet,
    thresholds: &[f32],
) -> Result<RocReport, ValidationError> {
    let mut values = Vec::new();
    let mut labels = Vec::new();
    let mut dim = 0;

    for (label, cls) in dbase.classes().iter().enumerate() {
        let stacked = set.matrix_for(&cls.files)?;
        if stacked.matrix.nrows() == 0 {
            continue;
        }
        if dim != 0 && stacked.matrix.ncols() != dim {
            return Err(EmbeddingError::DimensionMismatch {
                file: stacked.files[0].display().to_string(),
                expected: dim,
                actual: stacked.matrix.ncols(),
            }
            .into());
        }
        dim = stacked.matrix.ncols();
        values.extend(stacked.matrix.iter().copied());
        labels.extend(std::iter::repeat(label).take(stacked.matrix.nrows()));
    }

    let rows = labels.len();
    let embeddings = stack_rows(values, rows, dim)?;

    let report = evaluate(&embeddings, &labels, thresholds)?;
    let expected = PairStats::from_labels(&labels);
    tracing::info!(
        images = rows,
        positive_pairs = expected.positive,
        negative_pairs = expected.negative,
        "pair validation finished"
    );
    Ok(report)
}

/// Reshape row-major `values` into a `rows x dim` matrix.
fn stack_rows(values: Vec<f32>, rows: usize, dim: usize) -> Result<Array2<f32>, ValidationError> {
    let len = values.len();
    Array2::from_shape_vec((rows, dim), values).map_err(|_| ValidationError::ShapeMismatch {
        rows,
        dim,
        values: len,
    })
}

fn ratio(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64)
    }
}
