use log::{info, warn};
use std::collections::BTreeSet;

use crate::config::PrepConfig;
use crate::types::{ClassSpace, LabelRow, LabelTable};
use crate::utils::round2;

/// What the normalizer changed or removed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizeReport {
    /// Rows removed for a non-positive width or height.
    pub dropped: usize,
    /// Raw class ids that had no entry in the remap table.
    pub unmapped_ids: BTreeSet<u32>,
}

/// Remaps classes, rounds geometry and filters degenerate boxes.
pub struct Normalizer<'a> {
    config: &'a PrepConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a PrepConfig) -> Self {
        Self { config }
    }

    /// Clean a label table.
    ///
    /// The class remap only applies to tables still in the raw class space, so
    /// running this on its own output changes nothing.
    pub fn normalize(&self, table: &LabelTable) -> (LabelTable, NormalizeReport) {
        let mut report = NormalizeReport::default();
        let remap = table.class_space == ClassSpace::Raw;

        let mut rows = Vec::with_capacity(table.len());
        for row in &table.rows {
            let classes = if remap {
                if !self.config.class_remap.contains_key(&row.classes) {
                    report.unmapped_ids.insert(row.classes);
                }
                self.config.remap_class(row.classes)
            } else {
                row.classes
            };

            let cleaned = normalize_row(row, classes);
            if cleaned.w > 0.0 && cleaned.h > 0.0 {
                rows.push(cleaned);
            } else {
                report.dropped += 1;
            }
        }

        for raw in &report.unmapped_ids {
            warn!(
                "Raw class id {} has no remap entry and is kept unchanged",
                raw
            );
        }

        (LabelTable::training(rows), report)
    }
}

/// Round the box, then derive the centre from the rounded box.
fn normalize_row(row: &LabelRow, classes: u32) -> LabelRow {
    let x = round2(row.x);
    let y = round2(row.y);
    let w = round2(row.w);
    let h = round2(row.h);
    LabelRow {
        image_id: row.image_id,
        x,
        y,
        w,
        h,
        x_center: round2(x + w / 2.0),
        y_center: round2(y + h / 2.0),
        classes,
    }
}

/// Log distinct classes and per-class counts of a cleaned table.
pub fn log_class_report(table: &LabelTable, report: &NormalizeReport) {
    let counts = table.class_counts();
    info!("Number of unique classes: {}", counts.len());
    info!(
        "Class values: {:?}",
        counts.keys().copied().collect::<Vec<_>>()
    );
    for (class_id, count) in &counts {
        info!("  Class {}: {} rows", class_id, count);
    }
    if report.dropped > 0 {
        info!("Dropped {} rows with non-positive width or height", report.dropped);
    }
}
