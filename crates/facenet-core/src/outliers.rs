//! Outlier detection within identities.
//!
//! For each identity, the "mean face" is the image with the smallest
//! average distance to the others. Images farther than a threshold from
//! the mean face are reported, farthest first. Distances are computed on
//! unit-length embeddings as `2 * (1 - cos)`, i.e. squared Euclidean
//! distance, so they lie in [0, 4].

use crate::dataset::DBase;
use crate::embeddings::{EmbeddingError, EmbeddingSet};
use crate::oracle::{OracleError, SqliteOracle};
use ndarray::{Array2, Axis};
use std::path::PathBuf;

/// Result of scanning one embedding matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierScan {
    /// Row of the mean face.
    pub mean_index: usize,
    /// `(row, distance to mean face)`, farthest first.
    pub outliers: Vec<(usize, f32)>,
}

/// An image reported as not matching its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Outlier {
    pub class: String,
    /// Mean face of the identity.
    pub reference: PathBuf,
    pub file: PathBuf,
    pub distance: f32,
}

/// Scan one identity's embeddings (one row per image).
///
/// Returns `None` with fewer than two rows.
pub fn scan(embeddings: &Array2<f32>, threshold: f32) -> Option<OutlierScan> {
    let n = embeddings.nrows();
    if n < 2 {
        return None;
    }

    let mut unit = embeddings.to_owned();
    for mut row in unit.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }

    let mut dist = unit.dot(&unit.t()).mapv(|c| 2.0 * (1.0 - c));
    for i in 0..n {
        dist[[i, i]] = f32::NAN;
    }

    let mean_index = (0..n)
        .map(|j| (j, nan_mean(dist.column(j).iter().copied())))
        .filter(|(_, m)| !m.is_nan())
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(j, _)| j)?;

    let mut outliers = Vec::new();
    loop {
        let farthest = dist
            .row(mean_index)
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, d)| !d.is_nan())
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match farthest {
            Some((idx, d)) if d > threshold => {
                outliers.push((idx, d));
                dist[[mean_index, idx]] = f32::NAN;
            }
            _ => break,
        }
    }

    Some(OutlierScan {
        mean_index,
        outliers,
    })
}

/// Scan every identity of `dbase` using embeddings from `set`.
pub fn find_outliers(
    dbase: &DBase,
    set: &EmbeddingSet,
    threshold: f32,
) -> Result<Vec<Outlier>, EmbeddingError> {
    let mut found = Vec::new();

    for (count, cls) in dbase.classes().iter().enumerate() {
        let stacked = set.matrix_for(&cls.files)?;
        let Some(result) = scan(&stacked.matrix, threshold) else {
            continue;
        };

        tracing::debug!(
            count,
            total = dbase.nrof_classes(),
            class = %cls.name,
            outliers = result.outliers.len(),
            "class scanned"
        );

        let reference = &stacked.files[result.mean_index];
        found.extend(result.outliers.into_iter().map(|(idx, distance)| Outlier {
            class: cls.name.clone(),
            reference: reference.clone(),
            file: stacked.files[idx].clone(),
            distance,
        }));
    }

    tracing::info!(outliers = found.len(), threshold, "outlier scan finished");
    Ok(found)
}

/// Record every outlier as invalid so the next discovery skips it.
pub fn mark_invalid(outliers: &[Outlier], store: &SqliteOracle) -> Result<(), OracleError> {
    for outlier in outliers {
        store.set_valid(&outlier.file, false)?;
    }
    Ok(())
}

fn nan_mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { f32::NAN } else { sum / count as f32 }
}
