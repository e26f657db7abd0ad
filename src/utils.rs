use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PrepError, PrepResult};

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
            label
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Create a directory and its parents; an existing directory is not an error
pub fn create_output_directory(path: &Path) -> PrepResult<PathBuf> {
    fs::create_dir_all(path).map_err(|e| PrepError::io(path, e))?;
    Ok(path.to_path_buf())
}

/// Remove a directory tree if it exists
pub fn remove_output_directory(path: &Path) -> PrepResult<()> {
    if path.exists() {
        warn!("Directory {:?} already exists. Deleting it.", path);
        fs::remove_dir_all(path).map_err(|e| PrepError::io(path, e))?;
    }
    Ok(())
}

/// Find `<dir>/<stem>.<ext>` for the first extension that exists.
pub fn resolve_image(dir: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|candidate| candidate.is_file())
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

/// List the regular files directly inside `dir` with one of `extensions`, sorted by name.
pub fn list_files_with_extensions(dir: &Path, extensions: &[&str]) -> PrepResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PrepError::MissingDirectory {
            path: dir.to_path_buf(),
        });
    }

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{}/*", escaped);
    let entries = glob(&pattern).map_err(|e| PrepError::InvalidRow {
        reason: format!("bad glob pattern {}: {}", pattern, e),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();
    files.sort();
    Ok(files)
}

/// Parse a file stem such as `0012` into `12`.
pub fn numeric_stem(path: &Path) -> Option<u32> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Parse an integral field that may have been written as `3` or `3.0`.
pub fn parse_integral(token: &str) -> Option<u32> {
    if let Ok(value) = token.parse::<u32>() {
        return Some(value);
    }
    let value = token.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value <= u32::MAX as f64 {
        Some(value.trunc() as u32)
    } else {
        None
    }
}

/// Round to two decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
