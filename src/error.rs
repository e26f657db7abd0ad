//! Error taxonomy shared by every preprocessing stage.

use std::path::PathBuf;
use thiserror::Error;

pub type PrepResult<T> = Result<T, PrepError>;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("required directory not found: {path}")]
    MissingDirectory { path: PathBuf },
    #[error("label file for sequence {sequence} not found: {path}")]
    MissingLabelFile { sequence: u32, path: PathBuf },
    #[error("image {image_id} has neither a .jpg nor a .png file in {dir}")]
    ImageNotFound { image_id: u32, dir: PathBuf },
    #[error("invalid split ratios: train={train}, val={val} (each must be in [0, 1] and sum to at most 1)")]
    InvalidRatios { train: f64, val: f64 },
    #[error("invalid label row: {reason}")]
    InvalidRow { reason: String },
    #[error("yaml error at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("detection backend failed: {0}")]
    Detector(String),
}

impl PrepError {
    /// Wrap an `io::Error` with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::Io {
            path: path.into(),
            source,
        }
    }
}
