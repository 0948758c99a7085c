use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facenet_core::embeddings::EmbeddingSet;
use facenet_core::validation::{self, ThresholdGrid};
use facenet_core::{outliers, DBase, DatasetConfig, ImageClass, SplitMode, SqliteOracle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};

mod config;

use config::DatasetArgs;

#[derive(Parser)]
#[command(name = "facenet", about = "Face dataset bookkeeping and embedding analyses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print dataset statistics
    Info {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// Split a dataset into train and test identities
    Split {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// Fraction reserved for test
        #[arg(long, default_value_t = 0.2)]
        ratio: f64,
        /// Minimum training images an identity needs (images mode)
        #[arg(long, default_value_t = 1)]
        min_images: usize,
        /// "images" or "classes"
        #[arg(long, default_value = "images")]
        mode: String,
        /// Write the split as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report images far from their identity's mean face
    Outliers {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// JSON embeddings exported by the model
        #[arg(short, long)]
        embeddings: PathBuf,
        /// Distance above which an image is an outlier (0..4)
        #[arg(short, long, default_value_t = 1.0)]
        threshold: f32,
        /// Record outliers as invalid in the validity store
        #[arg(long)]
        mark: bool,
    },
    /// ROC over all image pairs
    Validate {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// JSON embeddings exported by the model
        #[arg(short, long)]
        embeddings: PathBuf,
        /// Threshold grid as start:stop:step
        #[arg(long, default_value = "0:4:0.01")]
        thresholds: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { dataset } => {
            let cfg = dataset.resolve()?;
            let dbase = load(&cfg, &mut rng(&cfg))?;
            print!("{dbase}");
        }
        Commands::Split {
            dataset,
            ratio,
            min_images,
            mode,
            output,
        } => {
            let mode: SplitMode = mode.parse()?;
            let cfg = dataset.resolve()?;
            let mut rng = rng(&cfg);
            let dbase = load(&cfg, &mut rng)?;
            let (train, test) = dbase.split(ratio, min_images, mode, &mut rng)?;

            print_partition("train", &train);
            print_partition("test", &test);

            if let Some(output) = output {
                write_split(&output, &train, &test)?;
                println!("split written to {}", output.display());
            }
        }
        Commands::Outliers {
            dataset,
            embeddings,
            threshold,
            mark,
        } => {
            let cfg = dataset.resolve()?;
            let store = match (mark, cfg.validity_store()) {
                (true, Some(path)) => Some(
                    SqliteOracle::open(&path)
                        .with_context(|| format!("opening validity store {}", path.display()))?,
                ),
                (true, None) => bail!("--mark needs a validity store (--h5file)"),
                (false, _) => None,
            };

            let dbase = load(&cfg, &mut rng(&cfg))?;
            let set = EmbeddingSet::load(&embeddings)?;
            let found = outliers::find_outliers(&dbase, &set, threshold)?;

            for o in &found {
                println!(
                    "{}\t{:.4}\t{}\t(mean face {})",
                    o.class,
                    o.distance,
                    o.file.display(),
                    o.reference.display()
                );
            }
            println!("{} outliers above {threshold}", found.len());

            if let Some(store) = store {
                outliers::mark_invalid(&found, &store)?;
                println!("{} images marked invalid", found.len());
            }
        }
        Commands::Validate {
            dataset,
            embeddings,
            thresholds,
        } => {
            let grid: ThresholdGrid = thresholds.parse()?;
            let cfg = dataset.resolve()?;
            let dbase = load(&cfg, &mut rng(&cfg))?;
            let set = EmbeddingSet::load(&embeddings)?;
            let report = validation::validate(&dbase, &set, &grid.values())?;

            println!(
                "positive pairs {}, negative pairs {}",
                report.positive_pairs, report.negative_pairs
            );
            println!("threshold\ttpr\tfpr\taccuracy");
            for p in &report.points {
                println!(
                    "{:.4}\t{}\t{}\t{}",
                    p.threshold,
                    fmt_rate(p.tpr()),
                    fmt_rate(p.fpr()),
                    fmt_rate(p.accuracy())
                );
            }
            match report.best() {
                Some(best) => println!(
                    "best threshold {:.4} (accuracy {})",
                    best.threshold,
                    fmt_rate(best.accuracy())
                ),
                None => println!("best threshold undefined: no pairs"),
            }
        }
    }

    Ok(())
}

fn rng(cfg: &DatasetConfig) -> StdRng {
    StdRng::seed_from_u64(cfg.seed)
}

fn load(cfg: &DatasetConfig, rng: &mut StdRng) -> Result<DBase> {
    if cfg.path.as_os_str().is_empty() {
        bail!("no dataset path: use --path, FACENET_DATASET_PATH or a config file");
    }
    DBase::load(cfg, rng).with_context(|| format!("loading dataset {}", cfg.path.display()))
}

fn print_partition(label: &str, classes: &[ImageClass]) {
    let images: usize = classes.iter().map(ImageClass::nrof_images).sum();
    println!("{label}: {} classes, {images} images", classes.len());
    for cls in classes {
        tracing::debug!(partition = label, "{cls}");
    }
}

#[derive(Serialize)]
struct ClassListing<'a> {
    name: &'a str,
    files: &'a [PathBuf],
}

#[derive(Serialize)]
struct SplitListing<'a> {
    train: Vec<ClassListing<'a>>,
    test: Vec<ClassListing<'a>>,
}

fn listing(classes: &[ImageClass]) -> Vec<ClassListing<'_>> {
    classes
        .iter()
        .map(|c| ClassListing {
            name: &c.name,
            files: &c.files,
        })
        .collect()
}

fn write_split(path: &Path, train: &[ImageClass], test: &[ImageClass]) -> Result<()> {
    let body = serde_json::to_string_pretty(&SplitListing {
        train: listing(train),
        test: listing(test),
    })?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn fmt_rate(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{v:.4}"))
}
