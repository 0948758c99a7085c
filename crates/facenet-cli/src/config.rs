use clap::Args;
use facenet_core::config::ConfigError;
use facenet_core::DatasetConfig;
use std::path::PathBuf;

/// Dataset selection shared by every subcommand.
///
/// Precedence, lowest to highest: config file, `FACENET_*` environment
/// variables, command-line flags.
#[derive(Args, Debug, Default)]
pub struct DatasetArgs {
    /// TOML file with a `[dataset]` table
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Dataset root (one directory per identity)
    #[arg(short, long)]
    pub path: Option<PathBuf>,
    /// Keep only the first N identities
    #[arg(long)]
    pub nrof_classes: Option<usize>,
    /// Subsample each identity to at most N images
    #[arg(long)]
    pub nrof_images: Option<usize>,
    /// Validity store used to filter images
    #[arg(long)]
    pub h5file: Option<PathBuf>,
    /// Only files ending with this suffix (e.g. ".png")
    #[arg(long)]
    pub extension: Option<String>,
    /// Seed for subsampling and splitting
    #[arg(long)]
    pub seed: Option<u64>,
}

impl DatasetArgs {
    /// Merge config file, environment and flags into one configuration.
    pub fn resolve(&self) -> Result<DatasetConfig, ConfigError> {
        let base = match &self.config {
            Some(file) => DatasetConfig::from_file(file)?,
            None => DatasetConfig::default(),
        };
        Ok(self.apply_flags(base.with_env_overrides()))
    }

    fn apply_flags(&self, mut cfg: DatasetConfig) -> DatasetConfig {
        if let Some(path) = &self.path {
            cfg.path = path.clone();
        }
        if self.nrof_classes.is_some() {
            cfg.nrof_classes = self.nrof_classes;
        }
        if self.nrof_images.is_some() {
            cfg.nrof_images = self.nrof_images;
        }
        if let Some(store) = &self.h5file {
            cfg.h5file = Some(store.clone());
        }
        if let Some(ext) = &self.extension {
            cfg.extension = ext.clone();
        }
        cfg.seed = self.seed.unwrap_or(cfg.seed);
        cfg
    }
}
