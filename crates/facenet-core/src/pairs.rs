//! Pair statistics over identity class sizes.
//!
//! A positive pair is two images of the same identity, a negative pair two
//! images of different identities. Only unordered pairs are counted.

/// Number of unordered pairs among `n` items.
pub fn nrof_pairs(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Pair counts for a population split into classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairStats {
    pub pairs: usize,
    pub positive: usize,
    pub negative: usize,
}

impl PairStats {
    /// Compute pair counts from per-class image counts.
    pub fn from_class_sizes(sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut total = 0;
        let mut positive = 0;
        for n in sizes {
            total += n;
            positive += nrof_pairs(n);
        }
        let pairs = nrof_pairs(total);
        Self {
            pairs,
            positive,
            negative: pairs - positive,
        }
    }

    /// Compute pair counts from a label vector (one class index per image).
    pub fn from_labels(labels: &[usize]) -> Self {
        let nrof_classes = labels.iter().max().map_or(0, |&m| m + 1);
        let mut sizes = vec![0usize; nrof_classes];
        for &label in labels {
            sizes[label] += 1;
        }
        Self::from_class_sizes(sizes)
    }

    /// Share of positive pairs in percent, `None` when there are no pairs.
    pub fn positive_percent(&self) -> Option<f64> {
        percent(self.positive, self.pairs)
    }

    /// Share of negative pairs in percent, `None` when there are no pairs.
    pub fn negative_percent(&self) -> Option<f64> {
        percent(self.negative, self.pairs)
    }
}

fn percent(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(100.0 * part as f64 / whole as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nrof_pairs() {
        assert_eq!(nrof_pairs(0), 0);
        assert_eq!(nrof_pairs(1), 0);
        assert_eq!(nrof_pairs(2), 1);
        assert_eq!(nrof_pairs(3), 3);
        assert_eq!(nrof_pairs(10), 45);
    }

    #[test]
    fn test_two_identities() {
        // alice has 3 images, bob 1
        let stats = PairStats::from_class_sizes([3, 1]);
        assert_eq!(stats.pairs, 6);
        assert_eq!(stats.positive, 3);
        assert_eq!(stats.negative, 3);
        assert_eq!(stats.positive + stats.negative, stats.pairs);
    }

    #[test]
    fn test_from_labels_matches_sizes() {
        let labels = [0, 0, 0, 1, 2, 2];
        assert_eq!(
            PairStats::from_labels(&labels),
            PairStats::from_class_sizes([3, 1, 2])
        );
    }

    #[test]
    fn test_percent() {
        let stats = PairStats::from_class_sizes([2, 2]);
        // 6 pairs total, 2 positive
        assert!((stats.positive_percent().unwrap() - 100.0 / 3.0).abs() < 1e-9);
        assert!((stats.negative_percent().unwrap() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_undefined_without_pairs() {
        let stats = PairStats::from_class_sizes([1]);
        assert_eq!(stats.pairs, 0);
        assert_eq!(stats.positive_percent(), None);
        assert_eq!(stats.negative_percent(), None);

        let empty = PairStats::from_labels(&[]);
        assert_eq!(empty.pairs, 0);
        assert_eq!(empty.positive_percent(), None);
    }
}
