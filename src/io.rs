use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{PrepError, PrepResult};
use crate::types::{DatasetSummary, LabelRow, LabelTable};
use crate::utils::parse_integral;

/// Write the cleaned table tab-separated, without a header, in canonical column order.
pub fn save_labels(table: &LabelTable, output_path: &Path) -> PrepResult<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|e| PrepError::io(parent, e))?;
    }
    let file = File::create(output_path).map_err(|e| PrepError::io(output_path, e))?;
    let mut writer = BufWriter::new(file);

    for row in &table.rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.image_id, row.x, row.y, row.w, row.h, row.x_center, row.y_center, row.classes
        )
        .map_err(|e| PrepError::io(output_path, e))?;
    }
    writer.flush().map_err(|e| PrepError::io(output_path, e))?;

    info!("Saved {} labels to {}", table.len(), output_path.display());
    info!("Number of unique classes: {}", table.class_counts().len());
    Ok(())
}

/// Read a table written by [`save_labels`]. Its classes are already in training space.
pub fn load_labels(path: &Path) -> PrepResult<LabelTable> {
    let content = fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;
    let mut rows = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_table_line(line).ok_or_else(|| PrepError::InvalidRow {
            reason: format!("{}:{}: {:?}", path.display(), line_num + 1, line),
        })?;
        rows.push(row);
    }

    Ok(LabelTable::training(rows))
}

fn parse_table_line(line: &str) -> Option<LabelRow> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() != 8 {
        return None;
    }
    let mut numbers = [0.0f64; 6];
    for (slot, field) in numbers.iter_mut().zip(&fields[1..7]) {
        *slot = field.parse().ok()?;
    }
    let [x, y, w, h, x_center, y_center] = numbers;

    Some(LabelRow {
        image_id: parse_integral(fields[0])?,
        x,
        y,
        w,
        h,
        x_center,
        y_center,
        classes: parse_integral(fields[7])?,
    })
}

/// Create the dataset.yaml file the detection library trains from
pub fn write_dataset_manifest(dataset_dir: &Path, class_names: &[String]) -> PrepResult<()> {
    let dataset_yaml_path = dataset_dir.join("dataset.yaml");
    let absolute_path =
        fs::canonicalize(dataset_dir).map_err(|e| PrepError::io(dataset_dir, e))?;

    let mut yaml_content = format!(
        "path: {}\ntrain: images/train\nval: images/val\ntest: images/test\n",
        absolute_path.to_string_lossy()
    );
    yaml_content.push_str(&format!("\nnc: {}\nnames:\n", class_names.len()));
    for (id, label) in class_names.iter().enumerate() {
        yaml_content.push_str(&format!("    {}: {}\n", id, label));
    }

    let mut dataset_yaml = BufWriter::new(
        File::create(&dataset_yaml_path).map_err(|e| PrepError::io(&dataset_yaml_path, e))?,
    );
    dataset_yaml
        .write_all(yaml_content.as_bytes())
        .map_err(|e| PrepError::io(&dataset_yaml_path, e))?;
    info!("Wrote {}", dataset_yaml_path.display());
    Ok(())
}

pub fn write_summary_json(path: &Path, summaries: &[DatasetSummary]) -> PrepResult<()> {
    let file = File::create(path).map_err(|e| PrepError::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summaries).map_err(|source| {
        PrepError::Json {
            path: path.to_path_buf(),
            source,
        }
    })
}
