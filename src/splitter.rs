use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::PrepConfig;
use crate::error::{PrepError, PrepResult};
use crate::types::{
    DatasetSummary, DatasetTree, LabelRow, LabelTable, Split, SplitAssignment,
    POOL_IMAGE_EXTENSIONS,
};
use crate::utils::{create_progress_bar, resolve_image};

/// Shuffle `items` and cut them into train, val and test.
///
/// Train takes `floor(n * train_ratio)` items, val the next
/// `floor(n * val_ratio)`, test the remainder.
pub fn split_items<T>(
    mut items: Vec<T>,
    train_ratio: f64,
    val_ratio: f64,
    rng: &mut StdRng,
) -> SplitAssignment<T> {
    items.shuffle(rng);

    let n = items.len();
    let train_size = ((n as f64 * train_ratio).floor() as usize).min(n);
    let val_size = ((n as f64 * val_ratio).floor() as usize).min(n - train_size);

    let test = items.split_off(train_size + val_size);
    let val = items.split_off(train_size);
    SplitAssignment {
        train: items,
        val,
        test,
    }
}

/// Convert one pixel-space row into a YOLO line, clamping each value into [0, 1].
///
/// Returns the line and how many values had to be clamped.
pub fn yolo_line(row: &LabelRow, image_width: u32, image_height: u32) -> (String, usize) {
    let width = image_width as f64;
    let height = image_height as f64;
    let mut clamped = 0;
    let mut unit = |v: f64| {
        let c = v.clamp(0.0, 1.0);
        if c != v {
            clamped += 1;
        }
        c
    };

    let x_center = unit(row.x_center / width);
    let y_center = unit(row.y_center / height);
    let w = unit(row.w / width);
    let h = unit(row.h / height);

    (
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}\n",
            row.classes, x_center, y_center, w, h
        ),
        clamped,
    )
}

/// Partitions a cleaned label table and materialises the dataset tree.
pub struct DatasetSplitter<'a> {
    config: &'a PrepConfig,
    table: &'a LabelTable,
    pool: PathBuf,
    tree: DatasetTree,
}

impl<'a> DatasetSplitter<'a> {
    pub fn new(config: &'a PrepConfig, table: &'a LabelTable) -> Self {
        Self {
            config,
            table,
            pool: config.pool(),
            tree: DatasetTree::new(config.dataset()),
        }
    }

    /// Assign every distinct image id to exactly one split.
    pub fn assign(&self, train_ratio: f64, val_ratio: f64) -> SplitAssignment<u32> {
        let ids: Vec<u32> = self.table.image_ids().into_iter().collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        split_items(ids, train_ratio, val_ratio, &mut rng)
    }

    /// Split with the configured ratios and write labels and images for every split.
    pub fn split_and_save(&self) -> PrepResult<DatasetSummary> {
        self.split_and_save_with(self.config.train_ratio, self.config.val_ratio)
    }

    pub fn split_and_save_with(&self, train_ratio: f64, val_ratio: f64) -> PrepResult<DatasetSummary> {
        PrepConfig {
            train_ratio,
            val_ratio,
            ..self.config.clone()
        }
        .validate()?;

        let assignment = self.assign(train_ratio, val_ratio);
        let groups = self.table.rows_by_image();
        let mut summary = DatasetSummary::new("Camel");

        self.tree.create()?;
        for split in Split::ALL {
            let written = self.process_split(assignment.get(split), split, &groups, &mut summary)?;
            summary.record_split(split, written);
        }

        info!("Split data into:");
        for split in Split::ALL {
            info!("  {}: {} images", split.title(), summary.split_count(split));
        }
        Ok(summary)
    }

    fn process_split(
        &self,
        image_ids: &[u32],
        split: Split,
        groups: &BTreeMap<u32, Vec<&LabelRow>>,
        summary: &mut DatasetSummary,
    ) -> PrepResult<usize> {
        let pb = create_progress_bar(image_ids.len() as u64, split.title());
        let mut written_images = 0;
        for &image_id in image_ids {
            pb.inc(1);
            let rows = groups.get(&image_id).map(Vec::as_slice).unwrap_or_default();

            // Resolve first so a missing image never leaves a label file behind.
            let source = self.find_pool_image(image_id)?;
            if let Some(existing) = self.tree.find_existing(&image_id.to_string()) {
                warn!(
                    "Image {} already present at {}; skipping",
                    image_id,
                    existing.display()
                );
                summary.collisions += 1;
                continue;
            }
            let (written, clamped) = self.save_labels(rows, image_id, split)?;
            self.copy_image(&source, split)?;

            summary.rows_written += written;
            summary.clamped_values += clamped;
            written_images += 1;
        }
        pb.finish_with_message(format!("{} processing complete", split.title()));
        Ok(written_images)
    }

    /// Locate `<pool>/<id>.jpg`, falling back to `.png`.
    pub fn find_pool_image(&self, image_id: u32) -> PrepResult<PathBuf> {
        resolve_image(&self.pool, &image_id.to_string(), POOL_IMAGE_EXTENSIONS).ok_or_else(|| {
            PrepError::ImageNotFound {
                image_id,
                dir: self.pool.clone(),
            }
        })
    }

    fn save_labels(&self, rows: &[&LabelRow], image_id: u32, split: Split) -> PrepResult<(usize, usize)> {
        let output_path = self
            .tree
            .labels_dir(split)
            .join(format!("{}.txt", image_id));
        let file = File::create(&output_path).map_err(|e| PrepError::io(&output_path, e))?;
        let mut writer = BufWriter::new(file);

        let mut clamped = 0;
        for row in rows {
            let (line, c) = yolo_line(row, self.config.image_width, self.config.image_height);
            clamped += c;
            writer
                .write_all(line.as_bytes())
                .map_err(|e| PrepError::io(&output_path, e))?;
        }
        writer.flush().map_err(|e| PrepError::io(&output_path, e))?;
        Ok((rows.len(), clamped))
    }

    /// Copy a pooled image into the split's image directory, keeping its file name.
    pub fn copy_image(&self, source: &Path, split: Split) -> PrepResult<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| PrepError::InvalidRow {
            reason: format!("image path has no file name: {}", source.display()),
        })?;
        let target = self.tree.images_dir(split).join(file_name);
        fs::copy(source, &target).map_err(|e| PrepError::io(source, e))?;
        debug!("Copied {} -> {}", source.display(), target.display());
        Ok(target)
    }
}
