//! Seam to the external detection library.
//!
//! Training, export and inference live outside this crate; a backend wraps
//! whichever framework is available and consumes the dataset tree and
//! `dataset.yaml` manifest produced here.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::config::PrepConfig;
use crate::error::{PrepError, PrepResult};
use crate::utils::{create_output_directory, list_files_with_extensions};

const PREDICT_EXTENSIONS: &[&str] = &["jpg", "png"];

/// Training hyper-parameters handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSettings {
    pub model: String,
    pub imgsz: u32,
    pub epochs: u32,
    pub batch: u32,
    pub name: String,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            model: "yolo11n.pt".to_string(),
            imgsz: 336,
            epochs: 50,
            batch: 16,
            name: "InfraOD_model".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainReport {
    pub run_dir: PathBuf,
    pub best_weights: Option<PathBuf>,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Onnx,
    TorchScript,
    OpenVino,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Onnx => "onnx",
            ExportFormat::TorchScript => "torchscript",
            ExportFormat::OpenVino => "openvino",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub file: PathBuf,
}

/// One predicted object; `bbox` is `[x_center, y_center, width, height]` in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

pub trait DetectionBackend {
    fn train(&mut self, manifest: &Path, settings: &TrainSettings) -> PrepResult<TrainReport>;
    fn export(&self, format: ExportFormat) -> PrepResult<ExportArtifact>;
    fn predict(&self, image: &Path) -> PrepResult<Vec<Detection>>;
}

/// Train on the dataset tree described by `<dataset_dir>/dataset.yaml`.
pub fn train_on_dataset<B: DetectionBackend>(
    backend: &mut B,
    config: &PrepConfig,
    settings: &TrainSettings,
) -> PrepResult<TrainReport> {
    let manifest = config.dataset().join("dataset.yaml");
    if !manifest.is_file() {
        return Err(PrepError::Detector(format!(
            "dataset manifest not found: {}",
            manifest.display()
        )));
    }
    let report = backend.train(&manifest, settings)?;
    info!("Training complete. Results in {}", report.run_dir.display());
    Ok(report)
}

pub fn export_model<B: DetectionBackend>(backend: &B, format: ExportFormat) -> PrepResult<ExportArtifact> {
    let artifact = backend.export(format)?;
    info!(
        "Exported model to {} format: {}",
        format.as_str(),
        artifact.file.display()
    );
    Ok(artifact)
}

/// Run the backend on every image in `images_dir`, writing `<stem>.json` per image.
///
/// Returns the number of images processed.
pub fn predict_directory<B: DetectionBackend>(
    backend: &B,
    images_dir: &Path,
    output_dir: &Path,
) -> PrepResult<usize> {
    create_output_directory(output_dir)?;
    let images = list_files_with_extensions(images_dir, PREDICT_EXTENSIONS)?;

    for image in &images {
        let detections = backend.predict(image)?;
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out_path = output_dir.join(format!("{}.json", stem));
        let file = File::create(&out_path).map_err(|e| PrepError::io(&out_path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &detections).map_err(|source| {
            PrepError::Json {
                path: out_path.clone(),
                source,
            }
        })?;
        info!(
            "Predictions for {}: {} detections",
            image.display(),
            detections.len()
        );
    }

    Ok(images.len())
}
