use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PrepError, PrepResult};
use crate::utils::{create_output_directory, resolve_image};

// Supported image formats when scanning source directories
pub const IMG_FORMATS: &[&str] = &["bmp", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

// Extensions tried, in order, when resolving a pooled image by id
pub const POOL_IMAGE_EXTENSIONS: &[&str] = &["jpg", "png"];

/// One object instance in canonical form.
///
/// Geometry is in pixel units until the splitter writes it out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelRow {
    pub image_id: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub x_center: f64,
    pub y_center: f64,
    pub classes: u32,
}

impl LabelRow {
    /// Build a row from a top-left box, deriving the centre.
    pub fn new(image_id: u32, x: f64, y: f64, w: f64, h: f64, classes: u32) -> PrepResult<Self> {
        if image_id == 0 {
            return Err(PrepError::InvalidRow {
                reason: "image_id must be positive".to_string(),
            });
        }
        if ![x, y, w, h].iter().all(|v| v.is_finite()) {
            return Err(PrepError::InvalidRow {
                reason: format!("non-finite box ({}, {}, {}, {})", x, y, w, h),
            });
        }
        Ok(Self {
            image_id,
            x,
            y,
            w,
            h,
            x_center: x + w / 2.0,
            y_center: y + h / 2.0,
            classes,
        })
    }
}

/// Which id space the `classes` column currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassSpace {
    /// Class ids as they appear in the source annotation files.
    Raw,
    /// Dense ids produced by the normalizer's remap.
    Training,
}

/// Ordered collection of label rows, several of which may share an image id.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    pub rows: Vec<LabelRow>,
    pub class_space: ClassSpace,
}

impl LabelTable {
    pub fn raw(rows: Vec<LabelRow>) -> Self {
        Self {
            rows,
            class_space: ClassSpace::Raw,
        }
    }

    pub fn training(rows: Vec<LabelRow>) -> Self {
        Self {
            rows,
            class_space: ClassSpace::Training,
        }
    }

    /// Append another table's rows, keeping both orders.
    pub fn append(&mut self, mut other: LabelTable) {
        self.rows.append(&mut other.rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct image ids, ascending.
    pub fn image_ids(&self) -> BTreeSet<u32> {
        self.rows.iter().map(|row| row.image_id).collect()
    }

    /// Rows grouped by image id, each group in table order.
    pub fn rows_by_image(&self) -> BTreeMap<u32, Vec<&LabelRow>> {
        let mut groups: BTreeMap<u32, Vec<&LabelRow>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.image_id).or_default().push(row);
        }
        groups
    }

    pub fn rows_for(&self, image_id: u32) -> impl Iterator<Item = &LabelRow> {
        self.rows.iter().filter(move |row| row.image_id == image_id)
    }

    /// Number of rows per class id.
    pub fn class_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.classes).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    /// Label used on progress bars.
    pub fn title(&self) -> &'static str {
        match self {
            Split::Train => "Train",
            Split::Val => "Val",
            Split::Test => "Test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three disjoint, exhaustive partitions of a shuffled item list.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitAssignment<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

impl<T> SplitAssignment<T> {
    pub fn get(&self, split: Split) -> &[T] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// On-disk `images/{split}` + `labels/{split}` layout under one root.
#[derive(Debug, Clone)]
pub struct DatasetTree {
    pub root: PathBuf,
}

impl DatasetTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn images_dir(&self, split: Split) -> PathBuf {
        self.root.join("images").join(split.as_str())
    }

    pub fn labels_dir(&self, split: Split) -> PathBuf {
        self.root.join("labels").join(split.as_str())
    }

    /// Create every split directory; existing directories are left alone.
    pub fn create(&self) -> PrepResult<()> {
        for split in Split::ALL {
            create_output_directory(&self.images_dir(split))?;
            create_output_directory(&self.labels_dir(split))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// An image or label already stored under `stem` in any split.
    pub fn find_existing(&self, stem: &str) -> Option<PathBuf> {
        Split::ALL.iter().find_map(|&split| {
            let label = self.labels_dir(split).join(format!("{}.txt", stem));
            if label.is_file() {
                return Some(label);
            }
            resolve_image(&self.images_dir(split), stem, IMG_FORMATS)
        })
    }
}

/// Counts reported at the end of one dataset's processing.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DatasetSummary {
    pub dataset: String,
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub clamped_values: usize,
    pub missing_dirs: usize,
    pub unmatched_images: usize,
    pub unmatched_labels: usize,
    /// Source stems already taken from an earlier source split.
    pub duplicate_stems: usize,
    /// Extra image files sharing a stem inside one source directory.
    pub duplicate_files: usize,
    /// Samples skipped because the tree already holds that stem.
    pub collisions: usize,
    pub failed_copies: usize,
    /// Training class id to name, as far as this dataset declares them.
    pub class_names: BTreeMap<u32, String>,
}

impl DatasetSummary {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            ..Self::default()
        }
    }

    pub fn record_split(&mut self, split: Split, count: usize) {
        match split {
            Split::Train => self.train = count,
            Split::Val => self.val = count,
            Split::Test => self.test = count,
        }
    }

    pub fn split_count(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train,
            Split::Val => self.val,
            Split::Test => self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }

    pub fn skipped(&self) -> usize {
        self.unmatched_images
            + self.unmatched_labels
            + self.duplicate_stems
            + self.duplicate_files
            + self.collisions
            + self.failed_copies
    }

    pub fn print_summary(&self) {
        log::info!("=== {} Summary ===", self.dataset);
        log::info!("Train: {} images", self.train);
        log::info!("Val: {} images", self.val);
        log::info!("Test: {} images", self.test);
        if self.rows_written > 0 {
            log::info!("Label rows written: {}", self.rows_written);
        }
        if self.rows_dropped > 0 {
            log::info!("Label rows dropped: {}", self.rows_dropped);
        }
        if self.clamped_values > 0 {
            log::warn!(
                "Coordinates clamped into [0, 1]: {}",
                self.clamped_values
            );
        }
        if self.missing_dirs > 0 {
            log::warn!("Missing source directories: {}", self.missing_dirs);
        }
        if self.skipped() > 0 {
            log::warn!(
                "Total skipped files: {} (image without label: {}, label without image: {}, \
                 duplicate stems: {}, duplicate images: {}, already in tree: {}, failed copies: {})",
                self.skipped(),
                self.unmatched_images,
                self.unmatched_labels,
                self.duplicate_stems,
                self.duplicate_files,
                self.collisions,
                self.failed_copies
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(image_id: u32, classes: u32) -> LabelRow {
        LabelRow::new(image_id, 1.0, 2.0, 4.0, 6.0, classes).unwrap()
    }

    #[test]
    fn test_label_row_derives_centre() {
        let r = LabelRow::new(3, 10.0, 20.0, 40.0, 30.0, 1).unwrap();
        assert_eq!(r.x_center, 30.0);
        assert_eq!(r.y_center, 35.0);
    }

    #[test]
    fn test_label_row_rejects_bad_input() {
        assert!(LabelRow::new(0, 1.0, 1.0, 1.0, 1.0, 1).is_err());
        assert!(LabelRow::new(1, f64::NAN, 1.0, 1.0, 1.0, 1).is_err());
    }

    #[test]
    fn test_grouping_and_counts() {
        let table = LabelTable::raw(vec![row(2, 1), row(1, 3), row(2, 1)]);
        let groups = table.rows_by_image();
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(groups[&2].len(), 2);
        assert_eq!(table.rows_for(2).count(), 2);
        assert_eq!(table.class_counts(), BTreeMap::from([(1, 2), (3, 1)]));
    }

    #[test]
    fn test_dataset_tree_paths() {
        let tree = DatasetTree::new("/out");
        assert_eq!(tree.images_dir(Split::Val), PathBuf::from("/out/images/val"));
        assert_eq!(tree.labels_dir(Split::Test), PathBuf::from("/out/labels/test"));
    }

    #[test]
    fn test_find_existing_checks_every_split() {
        let dir = tempfile::tempdir().unwrap();
        let tree = DatasetTree::new(dir.path());
        tree.create().unwrap();
        assert_eq!(tree.find_existing("7"), None);

        std::fs::write(tree.images_dir(Split::Test).join("7.png"), b"png").unwrap();
        assert_eq!(
            tree.find_existing("7"),
            Some(tree.images_dir(Split::Test).join("7.png"))
        );

        std::fs::write(tree.labels_dir(Split::Val).join("8.txt"), b"0 0.5 0.5 0.1 0.1\n").unwrap();
        assert_eq!(
            tree.find_existing("8"),
            Some(tree.labels_dir(Split::Val).join("8.txt"))
        );
    }

    #[test]
    fn test_skipped_counts_every_kind() {
        let summary = DatasetSummary {
            unmatched_images: 1,
            duplicate_stems: 2,
            duplicate_files: 1,
            collisions: 3,
            ..DatasetSummary::new("LLVIP")
        };
        assert_eq!(summary.skipped(), 7);
    }
}
