//! Camel sequence ingestion.
//!
//! Each `Sequence-<n>` directory holds frames named by their frame number and
//! has one `Seq<n>-IR.txt` annotation file. Frames from every sequence are
//! copied into a flat pool under a single global id space, and the label rows
//! are rewritten to point at those ids.

use glob::glob;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PrepConfig;
use crate::error::{PrepError, PrepResult};
use crate::types::{LabelRow, LabelTable, IMG_FORMATS};
use crate::utils::{
    create_output_directory, create_progress_bar, list_files_with_extensions, numeric_stem,
    parse_integral,
};

const SEQUENCE_PREFIX: &str = "Sequence-";

/// One annotation line of a Camel sequence file, before renumbering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCamelRow {
    pub frame: u32,
    pub class_id: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Counters collected while building the label table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildReport {
    pub sequences: usize,
    pub images: usize,
    pub rows: usize,
    pub malformed_lines: usize,
    pub orphan_rows: usize,
}

/// Parse `frame track_id class x y w h`; fields may be separated by whitespace or commas.
pub fn parse_camel_line(line: &str) -> Option<RawCamelRow> {
    let tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 7 {
        return None;
    }

    let frame = parse_integral(tokens[0])?;
    let class_id = parse_integral(tokens[2])?;
    let mut geometry = [0.0f64; 4];
    for (slot, token) in geometry.iter_mut().zip(&tokens[3..7]) {
        *slot = token.parse().ok()?;
    }
    let [x, y, w, h] = geometry;

    Some(RawCamelRow {
        frame,
        class_id,
        x,
        y,
        w,
        h,
    })
}

/// Read one sequence's annotation file. Malformed lines are skipped and counted.
pub fn read_sequence_labels(path: &Path) -> PrepResult<(Vec<RawCamelRow>, usize)> {
    let content = fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;
    let mut rows = Vec::new();
    let mut malformed = 0;

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_camel_line(line) {
            Some(row) => rows.push(row),
            None => {
                warn!(
                    "Skipping malformed label line {}:{}: {:?}",
                    path.display(),
                    line_num + 1,
                    line
                );
                malformed += 1;
            }
        }
    }

    Ok((rows, malformed))
}

/// Builds the unified Camel label table and the flat image pool.
pub struct CamelBuilder<'a> {
    config: &'a PrepConfig,
}

impl<'a> CamelBuilder<'a> {
    pub fn new(config: &'a PrepConfig) -> Self {
        Self { config }
    }

    /// Process every sequence in numeric order.
    ///
    /// A sequence without its annotation file aborts the whole build.
    pub fn build(&self) -> PrepResult<(LabelTable, BuildReport)> {
        let images_root = self.config.camel_images();
        if !images_root.is_dir() {
            return Err(PrepError::MissingDirectory { path: images_root });
        }
        let pool = create_output_directory(&self.config.pool())?;

        let sequences = list_sequences(&images_root)?;
        info!(
            "Found {} sequences in {}",
            sequences.len(),
            images_root.display()
        );

        let mut table = LabelTable::raw(Vec::new());
        let mut report = BuildReport::default();
        let mut next_id: u32 = 1;

        let pb = create_progress_bar(sequences.len() as u64, "Camel");
        for (sequence, seq_dir) in &sequences {
            let seq_table = self.process_sequence(*sequence, seq_dir, &pool, &mut next_id, &mut report)?;
            table.append(seq_table);
            report.sequences += 1;
            pb.inc(1);
        }
        pb.finish_with_message("Camel sequences complete");

        report.rows = table.len();
        info!(
            "Built label table: {} rows over {} images from {} sequences",
            report.rows, report.images, report.sequences
        );
        Ok((table, report))
    }

    fn process_sequence(
        &self,
        sequence: u32,
        seq_dir: &Path,
        pool: &Path,
        next_id: &mut u32,
        report: &mut BuildReport,
    ) -> PrepResult<LabelTable> {
        let label_path = self
            .config
            .camel_labels()
            .join(format!("Seq{}-IR.txt", sequence));
        if !label_path.is_file() {
            return Err(PrepError::MissingLabelFile {
                sequence,
                path: label_path,
            });
        }

        let (raw_rows, malformed) = read_sequence_labels(&label_path)?;
        report.malformed_lines += malformed;

        let frames = self.list_frames(sequence, seq_dir)?;
        debug!(
            "Sequence {}: {} frames, {} label rows",
            sequence,
            frames.len(),
            raw_rows.len()
        );

        let mut frame_ids: HashMap<u32, u32> = HashMap::with_capacity(frames.len());
        for (frame, source) in frames {
            let id = *next_id;
            let target = pool.join(format!("{}.jpg", id));
            fs::copy(&source, &target).map_err(|e| PrepError::io(&source, e))?;
            frame_ids.insert(frame, id);
            *next_id += 1;
            report.images += 1;
        }

        let mut rows = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let Some(&image_id) = frame_ids.get(&raw.frame) else {
                warn!(
                    "Sequence {}: label row references frame {} with no image; skipping",
                    sequence, raw.frame
                );
                report.orphan_rows += 1;
                continue;
            };
            match LabelRow::new(image_id, raw.x, raw.y, raw.w, raw.h, raw.class_id) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Sequence {}, frame {}: {}", sequence, raw.frame, e);
                    report.malformed_lines += 1;
                }
            }
        }

        Ok(LabelTable::raw(rows))
    }

    /// Frames of a sequence in numeric order, one source file per frame.
    ///
    /// When a frame exists under several extensions the sequence's preferred
    /// extension wins.
    fn list_frames(&self, sequence: u32, seq_dir: &Path) -> PrepResult<BTreeMap<u32, PathBuf>> {
        let preferred = self.config.sequence_extension(sequence);
        let mut frames: BTreeMap<u32, PathBuf> = BTreeMap::new();

        for path in list_files_with_extensions(seq_dir, IMG_FORMATS)? {
            let Some(frame) = numeric_stem(&path) else {
                warn!("Ignoring non-numeric image name: {}", path.display());
                continue;
            };
            let is_preferred = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(preferred));
            match frames.get(&frame) {
                Some(_) if !is_preferred => {
                    debug!("Frame {} already has a source; ignoring {}", frame, path.display());
                }
                _ => {
                    frames.insert(frame, path);
                }
            }
        }

        Ok(frames)
    }
}

/// `Sequence-<n>` directories under `root`, sorted by `n`.
fn list_sequences(root: &Path) -> PrepResult<Vec<(u32, PathBuf)>> {
    let pattern = format!(
        "{}/{}*",
        glob::Pattern::escape(&root.to_string_lossy()),
        SEQUENCE_PREFIX
    );
    let entries = glob(&pattern).map_err(|e| PrepError::InvalidRow {
        reason: format!("bad glob pattern {}: {}", pattern, e),
    })?;

    let mut sequences: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let number = path
                .file_name()?
                .to_str()?
                .strip_prefix(SEQUENCE_PREFIX)?
                .parse()
                .ok()?;
            Some((number, path))
        })
        .collect();
    sequences.sort_by_key(|(number, _)| *number);
    Ok(sequences)
}
