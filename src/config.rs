use clap::{Parser, ValueEnum};
use log::warn;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PrepError, PrepResult};

/// Command-line arguments for building the unified infrared YOLO dataset.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Which source dataset to process
    #[arg(long = "dataset", value_enum, default_value = "all")]
    pub dataset: DatasetKind,

    /// Directory that every relative path in the configuration is resolved against
    #[arg(short = 'd', long = "data_root")]
    pub data_root: Option<String>,

    /// Optional YAML file overriding the default configuration
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Proportion of the images to use for training
    #[arg(long = "train_size", value_parser = validate_size)]
    pub train_size: Option<f64>,

    /// Proportion of the images to use for validation
    #[arg(long = "val_size", value_parser = validate_size)]
    pub val_size: Option<f64>,

    /// Seed for random shuffling
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Remove the output dataset tree before writing into it
    #[arg(long = "clean")]
    pub clean: bool,

    /// Write the per-dataset summaries to this JSON file
    #[arg(long = "summary_json")]
    pub summary_json: Option<String>,
}

impl Args {
    /// Build the immutable configuration: defaults, then the YAML file, then CLI flags.
    pub fn resolve_config(&self) -> PrepResult<PrepConfig> {
        let mut config = match &self.config {
            Some(path) => PrepConfig::from_yaml_file(Path::new(path))?,
            None => PrepConfig::default(),
        };
        if let Some(root) = &self.data_root {
            config.data_root = PathBuf::from(root);
        }
        if let Some(train) = self.train_size {
            config.train_ratio = train;
        }
        if let Some(val) = self.val_size {
            config.val_ratio = val;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum DatasetKind {
    Camel,
    Llvip,
    Hituav,
    All,
}

// Validate that the size is between 0.0 and 1.0
fn validate_size(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SIZE must be between 0.0 and 1.0".to_string()),
    }
}

/// Paths, class tables, image geometry and split policy for one run.
///
/// Every component receives this by reference; nothing reads ambient state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    pub data_root: PathBuf,
    pub camel_images_dir: PathBuf,
    pub camel_labels_dir: PathBuf,
    pub pool_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub llvip_dir: PathBuf,
    pub hituav_dir: PathBuf,
    /// Preferred image extension per Camel sequence.
    pub sequence_extensions: BTreeMap<u32, String>,
    /// Raw Camel class id to class name.
    pub class_names: BTreeMap<u32, String>,
    /// Raw Camel class id to training class id.
    pub class_remap: BTreeMap<u32, u32>,
    pub image_width: u32,
    pub image_height: u32,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub seed: u64,
}

impl Default for PrepConfig {
    fn default() -> Self {
        let sequence_extensions = (1..=21)
            .map(|seq| {
                let ext = if seq == 9 || seq == 10 { "png" } else { "jpg" };
                (seq, ext.to_string())
            })
            .collect();
        let class_names = [(1, "Person"), (2, "Bicycle"), (3, "Car")]
            .into_iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect();

        Self {
            data_root: PathBuf::from("."),
            camel_images_dir: PathBuf::from("Camel_data/images"),
            camel_labels_dir: PathBuf::from("Camel_data/labels"),
            pool_dir: PathBuf::from("Camel_data/all_images"),
            dataset_dir: PathBuf::from("datasets/infrared"),
            llvip_dir: PathBuf::from("LLVIP_data"),
            hituav_dir: PathBuf::from("HitUAV_data"),
            sequence_extensions,
            class_names,
            class_remap: BTreeMap::from([(1, 0), (3, 1)]),
            image_width: 336,
            image_height: 256,
            train_ratio: 0.8,
            val_ratio: 0.1,
            seed: 42,
        }
    }
}

impl PrepConfig {
    /// Load a configuration file; keys it leaves out keep their defaults.
    pub fn from_yaml_file(path: &Path) -> PrepResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|source| PrepError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A default configuration rooted at `root`, handy for tests and scripts.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: root.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PrepResult<()> {
        let in_unit = |r: f64| (0.0..=1.0).contains(&r);
        if !in_unit(self.train_ratio)
            || !in_unit(self.val_ratio)
            || self.train_ratio + self.val_ratio > 1.0 + f64::EPSILON
        {
            return Err(PrepError::InvalidRatios {
                train: self.train_ratio,
                val: self.val_ratio,
            });
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(PrepError::InvalidRow {
                reason: format!(
                    "image dimensions must be positive, got {}x{}",
                    self.image_width, self.image_height
                ),
            });
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }

    pub fn camel_images(&self) -> PathBuf {
        self.resolve(&self.camel_images_dir)
    }

    pub fn camel_labels(&self) -> PathBuf {
        self.resolve(&self.camel_labels_dir)
    }

    pub fn pool(&self) -> PathBuf {
        self.resolve(&self.pool_dir)
    }

    pub fn dataset(&self) -> PathBuf {
        self.resolve(&self.dataset_dir)
    }

    pub fn llvip(&self) -> PathBuf {
        self.resolve(&self.llvip_dir)
    }

    pub fn hituav(&self) -> PathBuf {
        self.resolve(&self.hituav_dir)
    }

    /// Preferred image extension for a Camel sequence, `jpg` when unlisted.
    pub fn sequence_extension(&self, sequence: u32) -> &str {
        self.sequence_extensions
            .get(&sequence)
            .map(String::as_str)
            .unwrap_or("jpg")
    }

    /// Training class id for a raw class id; ids outside the table pass through.
    pub fn remap_class(&self, raw: u32) -> u32 {
        self.class_remap.get(&raw).copied().unwrap_or(raw)
    }

    /// Class names indexed by training id, contiguous from zero.
    pub fn training_class_names(&self) -> Vec<String> {
        let mut by_id: BTreeMap<u32, String> = BTreeMap::new();
        for (&raw, name) in &self.class_names {
            let id = self.remap_class(raw);
            if let Some(existing) = by_id.get(&id) {
                warn!(
                    "Raw class {} ({}) maps onto training class {} already named {}",
                    raw, name, id, existing
                );
                continue;
            }
            by_id.insert(id, name.clone());
        }

        let Some(&max_id) = by_id.keys().next_back() else {
            return Vec::new();
        };
        (0..=max_id)
            .map(|id| {
                by_id
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_size() {
        assert!(validate_size("0.5").is_ok());
        assert!(validate_size("1.0").is_ok());
        assert!(validate_size("0.0").is_ok());
        assert!(validate_size("-0.1").is_err());
        assert!(validate_size("1.1").is_err());
        assert!(validate_size("abc").is_err());
    }

    #[test]
    fn test_default_tables() {
        let config = PrepConfig::default();
        assert_eq!(config.sequence_extension(9), "png");
        assert_eq!(config.sequence_extension(1), "jpg");
        assert_eq!(config.sequence_extension(99), "jpg");
        assert_eq!(config.remap_class(1), 0);
        assert_eq!(config.remap_class(3), 1);
        assert_eq!(config.remap_class(2), 2);
        assert_eq!(
            config.training_class_names(),
            vec!["Person".to_string(), "Car".to_string(), "Bicycle".to_string()]
        );
    }

    #[test]
    fn test_training_names_fill_gaps() {
        let mut config = PrepConfig::default();
        config.class_names = BTreeMap::from([(3, "Car".to_string())]);
        assert_eq!(
            config.training_class_names(),
            vec!["class_0".to_string(), "Car".to_string()]
        );
    }

    #[test]
    fn test_validate_ratios() {
        let mut config = PrepConfig::default();
        assert!(config.validate().is_ok());
        config.train_ratio = 0.95;
        assert!(matches!(
            config.validate(),
            Err(PrepError::InvalidRatios { .. })
        ));
    }

    #[test]
    fn test_yaml_override_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prep.yaml");
        fs::write(&path, "seed: 7\nimage_width: 640\n").unwrap();

        let config = PrepConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.image_width, 640);
        assert_eq!(config.image_height, 256);
        assert_eq!(config.train_ratio, 0.8);
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "infrared2yolo",
            "--dataset",
            "llvip",
            "--data_root",
            "/data",
            "--val_size",
            "0.2",
        ]);
        assert_eq!(args.dataset, DatasetKind::Llvip);

        let config = args.resolve_config().unwrap();
        assert_eq!(config.val_ratio, 0.2);
        assert_eq!(config.llvip(), PathBuf::from("/data/LLVIP_data"));
    }
}
