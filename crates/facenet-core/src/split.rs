//! Train/test split strategies.

use crate::dataset::{DatasetError, ImageClass};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// How a dataset is partitioned into train and test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Whole identities go to either train or test.
    ///
    /// Class indices are shuffled and cut at `round(n * (1 - ratio))`.
    /// The last shuffled class lands in neither partition; training
    /// scripts were tuned against this behaviour.
    Classes,
    /// Every identity is split by its files. Identities that cannot
    /// provide `min_nrof_images_per_class` training files and at least one
    /// test file are left out of both partitions.
    Images,
}

impl FromStr for SplitMode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classes" => Ok(Self::Classes),
            "images" => Ok(Self::Images),
            other => Err(DatasetError::InvalidArgument(format!(
                "invalid train/test split mode \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classes => f.write_str("classes"),
            Self::Images => f.write_str("images"),
        }
    }
}

/// Split `classes` into freshly built train and test lists.
///
/// `ratio` is the fraction reserved for test; `ratio <= 0` returns every
/// class as train and an empty test list. `NaN` and values above 1 are
/// rejected with [`DatasetError::InvalidArgument`].
pub fn split_classes<R: Rng + ?Sized>(
    classes: &[ImageClass],
    ratio: f64,
    min_nrof_images_per_class: usize,
    mode: SplitMode,
    rng: &mut R,
) -> Result<(Vec<ImageClass>, Vec<ImageClass>), DatasetError> {
    if ratio.is_nan() || ratio > 1.0 {
        return Err(DatasetError::InvalidArgument(format!(
            "split ratio must be at most 1, got {ratio}"
        )));
    }
    if ratio <= 0.0 {
        return Ok((classes.to_vec(), Vec::new()));
    }

    let (train, test) = match mode {
        SplitMode::Classes => split_by_classes(classes, ratio, rng),
        SplitMode::Images => split_by_images(classes, ratio, min_nrof_images_per_class, rng),
    };

    tracing::debug!(
        %mode,
        ratio,
        train_classes = train.len(),
        test_classes = test.len(),
        "dataset split"
    );

    Ok((train, test))
}

fn split_by_classes<R: Rng + ?Sized>(
    classes: &[ImageClass],
    ratio: f64,
    rng: &mut R,
) -> (Vec<ImageClass>, Vec<ImageClass>) {
    let n = classes.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);

    let split = (round_half_even(n as f64 * (1.0 - ratio)).max(0.0) as usize).min(n);
    let test_end = n.saturating_sub(1).max(split);

    let rebuild =
        |&i: &usize| ImageClass::new(classes[i].name.clone(), classes[i].files.clone(), None);
    let train = indices[..split].iter().map(rebuild).collect();
    let test = indices[split..test_end].iter().map(rebuild).collect();
    (train, test)
}

fn split_by_images<R: Rng + ?Sized>(
    classes: &[ImageClass],
    ratio: f64,
    min_nrof_images_per_class: usize,
    rng: &mut R,
) -> (Vec<ImageClass>, Vec<ImageClass>) {
    let mut train = Vec::new();
    let mut test = Vec::new();

    for cls in classes {
        let mut paths = cls.files.clone();
        paths.shuffle(rng);

        let n = paths.len();
        let mut split = ((n as f64 * (1.0 - ratio)).floor().max(0.0) as usize).min(n);
        if split == n {
            split = n.saturating_sub(1);
        }

        if split >= min_nrof_images_per_class && n - split >= 1 {
            let held_out = paths.split_off(split);
            train.push(ImageClass::new(cls.name.clone(), paths, None));
            test.push(ImageClass::new(cls.name.clone(), held_out, None));
        }
    }

    (train, test)
}

/// Round to nearest, ties to even.
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn class(name: &str, n: usize) -> ImageClass {
        let files = (0..n).map(|i| PathBuf::from(format!("{name}/{i:03}.png"))).collect();
        ImageClass::new(name, files, Some(0))
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1)
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("images".parse::<SplitMode>().unwrap(), SplitMode::Images);
        assert_eq!("classes".parse::<SplitMode>().unwrap(), SplitMode::Classes);
        assert!(matches!(
            "pairs".parse::<SplitMode>(),
            Err(DatasetError::InvalidArgument(_))
        ));
        assert_eq!(SplitMode::Images.to_string(), "images");
    }

    #[test]
    fn test_zero_ratio_is_noop() {
        let classes = vec![class("a", 3), class("b", 1)];
        for mode in [SplitMode::Images, SplitMode::Classes] {
            let (train, test) = split_classes(&classes, 0.0, 2, mode, &mut rng()).unwrap();
            assert_eq!(train, classes);
            assert!(test.is_empty());
        }
    }

    #[test]
    fn test_images_ten_files() {
        let classes = vec![class("alice", 10)];
        let (train, test) =
            split_classes(&classes, 0.2, 2, SplitMode::Images, &mut rng()).unwrap();

        assert_eq!(train.len(), 1);
        assert_eq!(test.len(), 1);
        assert_eq!(train[0].nrof_images(), 8);
        assert_eq!(test[0].nrof_images(), 2);
        assert_eq!(train[0].name, "alice");
        assert_eq!(test[0].name, "alice");
        assert_eq!(train[0].count, None);

        let mut all: Vec<PathBuf> = train[0].files.iter().chain(&test[0].files).cloned().collect();
        all.sort();
        assert_eq!(all, classes[0].files);
    }

    #[test]
    fn test_images_forces_held_out_file() {
        // 1.0 - 1e-20 == 1.0, so the unclamped split would keep all four files
        let classes = vec![class("a", 4)];
        let (train, test) =
            split_classes(&classes, 1e-20, 1, SplitMode::Images, &mut rng()).unwrap();
        assert_eq!(train[0].nrof_images(), 3);
        assert_eq!(test[0].nrof_images(), 1);
    }

    #[test]
    fn test_images_drops_small_classes() {
        let classes = vec![class("big", 10), class("small", 2), class("single", 1)];
        let (train, test) =
            split_classes(&classes, 0.5, 2, SplitMode::Images, &mut rng()).unwrap();

        let names: Vec<&str> = train.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["big"]);
        assert_eq!(test.len(), 1);
        assert_eq!(test[0].name, "big");
    }

    #[test]
    fn test_images_does_not_touch_input() {
        let classes = vec![class("a", 6)];
        let before = classes.clone();
        let _ = split_classes(&classes, 0.5, 1, SplitMode::Images, &mut rng()).unwrap();
        assert_eq!(classes, before);
    }

    #[test]
    fn test_classes_mode_drops_last_shuffled() {
        let classes: Vec<ImageClass> = (0..10).map(|i| class(&format!("c{i}"), 2)).collect();
        let (train, test) =
            split_classes(&classes, 0.3, 1, SplitMode::Classes, &mut rng()).unwrap();

        assert_eq!(train.len(), 7);
        assert_eq!(test.len(), 2);

        let mut seen: Vec<&str> = train.iter().chain(&test).map(|c| c.name.as_str()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn test_classes_mode_is_seeded() {
        let classes: Vec<ImageClass> = (0..8).map(|i| class(&format!("c{i}"), 1)).collect();
        let run = |seed| {
            split_classes(&classes, 0.25, 1, SplitMode::Classes, &mut StdRng::seed_from_u64(seed))
                .unwrap()
        };
        let (a, b) = (run(9), run(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_classes_mode_full_ratio() {
        let classes: Vec<ImageClass> = (0..4).map(|i| class(&format!("c{i}"), 1)).collect();
        let (train, test) =
            split_classes(&classes, 1.0, 1, SplitMode::Classes, &mut rng()).unwrap();
        assert!(train.is_empty());
        assert_eq!(test.len(), 3);
    }

    #[test]
    fn test_rejects_ratio_out_of_range() {
        let classes = vec![class("a", 4)];
        for ratio in [f64::NAN, 1.5, f64::INFINITY] {
            for mode in [SplitMode::Images, SplitMode::Classes] {
                assert!(matches!(
                    split_classes(&classes, ratio, 1, mode, &mut rng()),
                    Err(DatasetError::InvalidArgument(_))
                ));
            }
        }
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(3.5), 4.0);
        assert_eq!(round_half_even(2.4), 2.0);
        assert_eq!(round_half_even(2.6), 3.0);
        assert_eq!(round_half_even(7.0), 7.0);
    }
}
