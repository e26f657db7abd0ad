//! Importers for datasets that already ship YOLO label files.
//!
//! LLVIP stores `<split>/images` and `<split>/labels`; HitUAV stores
//! `images/<split>` and `labels/<split>` next to a `dataset.yaml`. Both are
//! pooled across their original splits, re-shuffled, and copied into the
//! unified tree without touching the label contents.

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PrepConfig;
use crate::error::{PrepError, PrepResult};
use crate::splitter::split_items;
use crate::types::{DatasetSummary, DatasetTree, Split};
use crate::utils::{create_progress_bar, list_files_with_extensions};

const SOURCE_IMAGE_EXTENSIONS: &[&str] = &["jpg", "png"];
const LABEL_EXTENSIONS: &[&str] = &["txt"];

/// Where a source dataset keeps its per-split directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    /// `<root>/<split>/images`, `<root>/<split>/labels`
    SplitFirst,
    /// `<root>/images/<split>`, `<root>/labels/<split>`
    KindFirst,
}

impl SourceLayout {
    fn dir(&self, root: &Path, split: &str, kind: &str) -> PathBuf {
        match self {
            SourceLayout::SplitFirst => root.join(split).join(kind),
            SourceLayout::KindFirst => root.join(kind).join(split),
        }
    }

    pub fn images_dir(&self, root: &Path, split: &str) -> PathBuf {
        self.dir(root, split, "images")
    }

    pub fn labels_dir(&self, root: &Path, split: &str) -> PathBuf {
        self.dir(root, split, "labels")
    }
}

#[derive(Debug, Clone)]
pub struct YoloSource {
    pub name: String,
    pub root: PathBuf,
    pub layout: SourceLayout,
    pub splits: Vec<String>,
}

/// An image and its label file, matched by stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourcePair {
    pub stem: String,
    pub source_split: String,
    pub image: PathBuf,
    pub label: PathBuf,
}

/// Everything found while scanning a source dataset.
#[derive(Debug, Default, Clone)]
pub struct SourceScan {
    pub pairs: Vec<SourcePair>,
    pub image_counts: BTreeMap<String, usize>,
    pub label_counts: BTreeMap<String, usize>,
    pub missing_dirs: usize,
    pub unmatched_images: usize,
    pub unmatched_labels: usize,
    pub duplicate_stems: usize,
    pub duplicate_files: usize,
}

/// List a source directory; a missing one is a warning and yields nothing.
fn list_or_warn(dir: &Path, extensions: &[&str], kind: &str, scan: &mut SourceScan) -> PrepResult<Vec<PathBuf>> {
    match list_files_with_extensions(dir, extensions) {
        Ok(files) => Ok(files),
        Err(PrepError::MissingDirectory { path }) => {
            warn!("{} directory not found: {}", kind, path.display());
            scan.missing_dirs += 1;
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Index files by stem. Files are sorted by name, so `a.jpg` wins over `a.png`.
fn by_stem(files: Vec<PathBuf>, scan: &mut SourceScan) -> BTreeMap<String, PathBuf> {
    let mut index: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in files {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        if let Some(kept) = index.get(&stem) {
            warn!(
                "{} shares its stem with {}; skipping",
                path.display(),
                kept.display()
            );
            scan.duplicate_files += 1;
            continue;
        }
        index.insert(stem, path);
    }
    index
}

/// Collect image/label pairs across every split of a source.
pub fn scan_source(source: &YoloSource) -> PrepResult<SourceScan> {
    let mut scan = SourceScan::default();
    let mut seen: BTreeMap<String, String> = BTreeMap::new();

    for split in &source.splits {
        let images_dir = source.layout.images_dir(&source.root, split);
        let labels_dir = source.layout.labels_dir(&source.root, split);
        let image_files = list_or_warn(&images_dir, SOURCE_IMAGE_EXTENSIONS, "Image", &mut scan)?;
        let label_files = list_or_warn(&labels_dir, LABEL_EXTENSIONS, "Label", &mut scan)?;
        let images = by_stem(image_files, &mut scan);
        let mut labels = by_stem(label_files, &mut scan);

        scan.image_counts.insert(split.clone(), images.len());
        scan.label_counts.insert(split.clone(), labels.len());
        info!(
            "{} {}: found {} images and {} labels",
            source.name,
            split,
            images.len(),
            labels.len()
        );

        for (stem, image) in images {
            let Some(label) = labels.remove(&stem) else {
                warn!("No label for image {}; skipping", image.display());
                scan.unmatched_images += 1;
                continue;
            };
            if let Some(first) = seen.get(&stem) {
                warn!(
                    "{} {}: stem {} already taken from {}; skipping",
                    source.name, split, stem, first
                );
                scan.duplicate_stems += 1;
                continue;
            }
            seen.insert(stem.clone(), split.clone());
            scan.pairs.push(SourcePair {
                stem,
                source_split: split.clone(),
                image,
                label,
            });
        }

        for label in labels.into_values() {
            warn!("No image for label {}; skipping", label.display());
            scan.unmatched_labels += 1;
        }
    }

    Ok(scan)
}

/// Class names shipped with a dataset (`nc` plus `names` as a list or a map).
#[derive(Debug, Clone, Deserialize)]
pub struct ClassMetadata {
    pub nc: Option<usize>,
    #[serde(default)]
    pub names: ClassNames,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClassNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

impl Default for ClassNames {
    fn default() -> Self {
        ClassNames::Sequence(Vec::new())
    }
}

impl ClassMetadata {
    /// `(id, name)` pairs in id order.
    pub fn entries(&self) -> Vec<(usize, String)> {
        match &self.names {
            ClassNames::Sequence(names) => names.iter().cloned().enumerate().collect(),
            ClassNames::Mapping(map) => map.iter().map(|(id, name)| (*id, name.clone())).collect(),
        }
    }

    pub fn class_count(&self) -> usize {
        self.nc.unwrap_or_else(|| self.entries().len())
    }
}

pub fn read_class_metadata(path: &Path) -> PrepResult<ClassMetadata> {
    let content = fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;
    serde_yaml::from_str(&content).map_err(|source| PrepError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Re-splits a YOLO-formatted source dataset into the unified tree.
pub struct YoloImporter<'a> {
    config: &'a PrepConfig,
    source: YoloSource,
    tree: DatasetTree,
    metadata_file: Option<PathBuf>,
}

impl<'a> YoloImporter<'a> {
    pub fn new(config: &'a PrepConfig, source: YoloSource) -> Self {
        Self {
            config,
            source,
            tree: DatasetTree::new(config.dataset()),
            metadata_file: None,
        }
    }

    pub fn llvip(config: &'a PrepConfig) -> Self {
        Self::new(
            config,
            YoloSource {
                name: "LLVIP".to_string(),
                root: config.llvip(),
                layout: SourceLayout::SplitFirst,
                splits: vec!["train".to_string(), "test".to_string()],
            },
        )
    }

    pub fn hituav(config: &'a PrepConfig) -> Self {
        let root = config.hituav();
        Self {
            metadata_file: Some(root.join("dataset.yaml")),
            ..Self::new(
                config,
                YoloSource {
                    name: "HitUAV".to_string(),
                    root,
                    layout: SourceLayout::KindFirst,
                    splits: Split::ALL.iter().map(|s| s.as_str().to_string()).collect(),
                },
            )
        }
    }

    pub fn source(&self) -> &YoloSource {
        &self.source
    }

    /// Pool, shuffle, split and copy. Per-file problems are logged and counted.
    pub fn process(&self) -> PrepResult<DatasetSummary> {
        let mut summary = DatasetSummary::new(&self.source.name);
        summary.class_names = self.class_names();

        self.tree.create()?;
        let scan = scan_source(&self.source)?;
        summary.missing_dirs = scan.missing_dirs;
        summary.unmatched_images = scan.unmatched_images;
        summary.unmatched_labels = scan.unmatched_labels;
        summary.duplicate_stems = scan.duplicate_stems;
        summary.duplicate_files = scan.duplicate_files;

        if scan.pairs.is_empty() {
            warn!("No images found in {} dataset", self.source.name);
            return Ok(summary);
        }
        info!(
            "{}: pooled {} image/label pairs",
            self.source.name,
            scan.pairs.len()
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut pairs = scan.pairs;
        pairs.sort();
        let assignment = split_items(
            pairs,
            self.config.train_ratio,
            self.config.val_ratio,
            &mut rng,
        );

        for split in Split::ALL {
            let copied = self.copy_split(assignment.get(split), split, &mut summary);
            summary.record_split(split, copied);
            info!("Processed {} {} images", copied, split);
        }
        Ok(summary)
    }

    fn copy_split(&self, pairs: &[SourcePair], split: Split, summary: &mut DatasetSummary) -> usize {
        let pb = create_progress_bar(pairs.len() as u64, split.title());

        let mut copied = 0;
        for pair in pairs {
            match copy_pair(pair, &self.tree, split) {
                Ok(CopyOutcome::Copied) => copied += 1,
                Ok(CopyOutcome::AlreadyPresent(existing)) => {
                    warn!(
                        "{} already present at {}; skipping",
                        pair.stem,
                        existing.display()
                    );
                    summary.collisions += 1;
                }
                Err(e) => {
                    error!("Failed to copy {}: {}", pair.image.display(), e);
                    summary.failed_copies += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_with_message(format!("{} processing complete", split.title()));
        copied
    }

    /// Classes declared by the source's metadata file, logged as they are read.
    fn class_names(&self) -> BTreeMap<u32, String> {
        let Some(path) = &self.metadata_file else {
            return BTreeMap::new();
        };
        if !path.is_file() {
            warn!("Class metadata not found: {}", path.display());
            return BTreeMap::new();
        }
        match read_class_metadata(path) {
            Ok(metadata) => {
                info!(
                    "{} dataset has {} classes:",
                    self.source.name,
                    metadata.class_count()
                );
                let entries = metadata.entries();
                for (id, name) in &entries {
                    info!("  Class {}: {}", id, name);
                }
                entries
                    .into_iter()
                    .map(|(id, name)| (id as u32, name))
                    .collect()
            }
            Err(e) => {
                warn!("Could not read class metadata: {}", e);
                BTreeMap::new()
            }
        }
    }
}

enum CopyOutcome {
    Copied,
    AlreadyPresent(PathBuf),
}

/// Copy one pair, keeping the stem shared between image and label.
///
/// Nothing is written when any split already holds the stem.
fn copy_pair(pair: &SourcePair, tree: &DatasetTree, split: Split) -> PrepResult<CopyOutcome> {
    let stem = sanitize_filename::sanitize(&pair.stem);
    if let Some(existing) = tree.find_existing(&stem) {
        return Ok(CopyOutcome::AlreadyPresent(existing));
    }
    let extension = pair
        .image
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("jpg");

    let image_target = tree.images_dir(split).join(format!("{}.{}", stem, extension));
    fs::copy(&pair.image, &image_target).map_err(|e| PrepError::io(&pair.image, e))?;

    let label_target = tree.labels_dir(split).join(format!("{}.txt", stem));
    if let Err(e) = fs::copy(&pair.label, &label_target) {
        // Leave no image behind without its label.
        if let Err(cleanup) = fs::remove_file(&image_target) {
            warn!(
                "Could not remove {} after its label failed to copy: {}",
                image_target.display(),
                cleanup
            );
        }
        return Err(PrepError::io(&pair.label, e));
    }
    Ok(CopyOutcome::Copied)
}
