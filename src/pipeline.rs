use log::{info, warn};
use std::collections::BTreeMap;

use crate::adapters::YoloImporter;
use crate::camel::CamelBuilder;
use crate::config::{DatasetKind, PrepConfig};
use crate::error::PrepResult;
use crate::io::{save_labels, write_dataset_manifest};
use crate::normalize::{log_class_report, Normalizer};
use crate::splitter::DatasetSplitter;
use crate::types::{DatasetSummary, DatasetTree};
use crate::utils::remove_output_directory;
use crate::visualize::class_distribution;

pub const ALL_LABELS_FILE: &str = "ALL_LABELS.txt";

/// Build, clean, persist and split the Camel dataset.
pub fn process_camel(config: &PrepConfig) -> PrepResult<DatasetSummary> {
    info!("Processing Camel dataset...");
    let (table, build_report) = CamelBuilder::new(config).build()?;

    let (clean, normalize_report) = Normalizer::new(config).normalize(&table);
    log_class_report(&clean, &normalize_report);
    save_labels(&clean, &config.camel_labels().join(ALL_LABELS_FILE))?;
    class_distribution(&clean);

    let mut summary = DatasetSplitter::new(config, &clean).split_and_save()?;
    summary.rows_dropped =
        normalize_report.dropped + build_report.orphan_rows + build_report.malformed_lines;
    summary.class_names = (0u32..)
        .zip(config.training_class_names())
        .collect();
    Ok(summary)
}

pub fn process_llvip(config: &PrepConfig) -> PrepResult<DatasetSummary> {
    info!("Processing LLVIP dataset...");
    YoloImporter::llvip(config).process()
}

pub fn process_hituav(config: &PrepConfig) -> PrepResult<DatasetSummary> {
    info!("Processing HitUAV dataset...");
    YoloImporter::hituav(config).process()
}

/// Main dataset processing pipeline: datasets run one after another into the shared tree.
pub fn process_datasets(
    config: &PrepConfig,
    kind: DatasetKind,
    clean: bool,
) -> PrepResult<Vec<DatasetSummary>> {
    config.validate()?;
    let tree = DatasetTree::new(config.dataset());
    if clean {
        remove_output_directory(tree.root())?;
    }
    tree.create()?;

    let mut summaries = Vec::new();
    if matches!(kind, DatasetKind::Camel | DatasetKind::All) {
        summaries.push(process_camel(config)?);
    }
    if matches!(kind, DatasetKind::Llvip | DatasetKind::All) {
        summaries.push(process_llvip(config)?);
    }
    if matches!(kind, DatasetKind::Hituav | DatasetKind::All) {
        summaries.push(process_hituav(config)?);
    }

    info!("Creating dataset.yaml file...");
    write_dataset_manifest(tree.root(), &manifest_class_names(config, &summaries))?;

    for summary in &summaries {
        summary.print_summary();
    }
    info!("Conversion process completed successfully.");
    Ok(summaries)
}

/// Merge the classes declared by every processed dataset into one id space.
///
/// The first dataset to name an id keeps it; later conflicting names are
/// warned about. Ids nobody names become `class_<i>`. Falls back to the
/// configured Camel classes when no dataset declares any.
pub fn manifest_class_names(config: &PrepConfig, summaries: &[DatasetSummary]) -> Vec<String> {
    let mut merged: BTreeMap<u32, (String, &str)> = BTreeMap::new();
    for summary in summaries {
        for (&id, name) in &summary.class_names {
            match merged.get(&id) {
                Some((existing, owner)) if existing != name => warn!(
                    "Class {} is {} in {} but {} in {}; keeping {}",
                    id, existing, owner, name, summary.dataset, existing
                ),
                Some(_) => {}
                None => {
                    merged.insert(id, (name.clone(), summary.dataset.as_str()));
                }
            }
        }
    }

    let Some(&max_id) = merged.keys().next_back() else {
        return config.training_class_names();
    };
    (0..=max_id)
        .map(|id| {
            merged
                .get(&id)
                .map(|(name, _)| name.clone())
                .unwrap_or_else(|| format!("class_{}", id))
        })
        .collect()
}
