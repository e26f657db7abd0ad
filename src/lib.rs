//! Infrared dataset preparation
//!
//! This library converts the Camel, LLVIP and HitUAV infrared datasets into a
//! single YOLO dataset tree (`images/{train,val,test}`, `labels/{train,val,test}`)
//! for object detection training.

pub mod adapters;
pub mod camel;
pub mod config;
pub mod detector;
pub mod error;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod splitter;
pub mod types;
pub mod utils;
pub mod visualize;

// Re-export commonly used types and functions
pub use adapters::YoloImporter;
pub use camel::CamelBuilder;
pub use config::{Args, DatasetKind, PrepConfig};
pub use error::{PrepError, PrepResult};
pub use io::{load_labels, save_labels, write_dataset_manifest};
pub use normalize::Normalizer;
pub use pipeline::{process_camel, process_datasets, process_hituav, process_llvip};
pub use splitter::DatasetSplitter;
pub use types::{DatasetSummary, DatasetTree, LabelRow, LabelTable, Split};
