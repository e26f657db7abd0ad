//! Debug renderings of a label table. Nothing here writes to the dataset tree.

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{PrepError, PrepResult};
use crate::types::{LabelTable, POOL_IMAGE_EXTENSIONS};
use crate::utils::resolve_image;

const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BAR_COLOR: Rgba<u8> = Rgba([70, 130, 180, 255]);
const AXIS_COLOR: Rgba<u8> = Rgba([40, 40, 40, 255]);
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

const SHEET_COLUMNS: u32 = 10;
const THUMB_WIDTH: u32 = 112;
const THUMB_HEIGHT: u32 = 85;

pub const DEFAULT_SAMPLES: usize = 70;

/// Clamp a pixel-space `[x0, y0, x1, y1]` box into the image; `None` when nothing is left.
pub fn clamp_box(bbox: [f64; 4], dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 {
        return None;
    }
    let clamp = |v: f64, max: u32| -> u32 { v.max(0.0).min((max - 1) as f64) as u32 };
    let x0 = clamp(bbox[0], w);
    let y0 = clamp(bbox[1], h);
    let x1 = clamp(bbox[2], w);
    let y1 = clamp(bbox[3], h);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

/// Draw a rectangle border with given thickness.
pub fn draw_rect(img: &mut RgbaImage, bbox_px: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 >= w || yy0 >= h || xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(img: &mut RgbaImage, bbox_px: [u32; 4], color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for y in y0..=y1.min(h.saturating_sub(1)) {
        for x in x0..=x1.min(w.saturating_sub(1)) {
            img.put_pixel(x, y, color);
        }
    }
}

fn save_rgb(img: RgbaImage, out_path: &Path) -> PrepResult<()> {
    DynamicImage::ImageRgba8(img)
        .to_rgb8()
        .save(out_path)
        .map_err(|source| PrepError::Image {
            path: out_path.to_path_buf(),
            source,
        })
}

fn open_rgba(path: &Path) -> PrepResult<RgbaImage> {
    image::open(path)
        .map(|im| im.into_rgba8())
        .map_err(|source| PrepError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Rows per class, logged as a small report.
pub fn class_distribution(table: &LabelTable) -> BTreeMap<u32, usize> {
    let counts = table.class_counts();
    info!("Class distribution:");
    for (class_id, count) in &counts {
        info!("  Class {}: {}", class_id, count);
    }
    counts
}

/// Draw one bar per class, heights proportional to the counts.
pub fn render_class_histogram(counts: &BTreeMap<u32, usize>, out_path: &Path) -> PrepResult<()> {
    const BAR_WIDTH: u32 = 40;
    const GAP: u32 = 20;
    const PLOT_HEIGHT: u32 = 240;
    const MARGIN: u32 = 20;

    let bars = counts.len().max(1) as u32;
    let width = MARGIN * 2 + bars * (BAR_WIDTH + GAP);
    let height = PLOT_HEIGHT + MARGIN * 2;
    let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);

    let max_count = counts.values().copied().max().unwrap_or(0).max(1) as f64;
    let baseline = MARGIN + PLOT_HEIGHT;
    for (i, count) in counts.values().enumerate() {
        let bar_height = ((*count as f64 / max_count) * PLOT_HEIGHT as f64).round() as u32;
        if bar_height == 0 {
            continue;
        }
        let x0 = MARGIN + GAP / 2 + i as u32 * (BAR_WIDTH + GAP);
        fill_rect(
            &mut img,
            [x0, baseline - bar_height, x0 + BAR_WIDTH - 1, baseline - 1],
            BAR_COLOR,
        );
    }
    fill_rect(&mut img, [MARGIN, baseline, width - MARGIN, baseline], AXIS_COLOR);

    save_rgb(img, out_path)?;
    info!("Saved class histogram to {}", out_path.display());
    Ok(())
}

/// Draw every box of `image_id` over its pooled image.
///
/// Returns `Ok(false)` without writing anything when the image has no rows.
pub fn render_bounding_boxes(
    table: &LabelTable,
    image_id: u32,
    pool_dir: &Path,
    out_path: &Path,
) -> PrepResult<bool> {
    let source = resolve_image(pool_dir, &image_id.to_string(), POOL_IMAGE_EXTENSIONS).ok_or_else(
        || PrepError::ImageNotFound {
            image_id,
            dir: pool_dir.to_path_buf(),
        },
    )?;

    let rows: Vec<_> = table.rows_for(image_id).collect();
    if rows.is_empty() {
        warn!("No bounding boxes found for image {}", image_id);
        return Ok(false);
    }

    let mut img = open_rgba(&source)?;
    let dims = img.dimensions();
    for row in rows {
        let x_min = row.x_center - row.w / 2.0;
        let y_min = row.y_center - row.h / 2.0;
        if let Some(bbox) = clamp_box([x_min, y_min, x_min + row.w, y_min + row.h], dims) {
            draw_rect(&mut img, bbox, BOX_COLOR, 1);
        }
    }

    save_rgb(img, out_path)?;
    info!("Saved image {} with bounding boxes to {}", image_id, out_path.display());
    Ok(true)
}

/// Tile up to `num_samples` images containing `class_id` into one sheet.
///
/// Images missing from the pool are skipped with a warning. Returns the
/// number of tiles placed.
pub fn render_class_samples(
    table: &LabelTable,
    class_id: u32,
    pool_dir: &Path,
    num_samples: usize,
    out_path: &Path,
) -> PrepResult<usize> {
    let mut seen = HashSet::new();
    let image_ids: Vec<u32> = table
        .rows
        .iter()
        .filter(|row| row.classes == class_id)
        .map(|row| row.image_id)
        .filter(|id| seen.insert(*id))
        .take(num_samples)
        .collect();

    let thumbnails: Vec<RgbaImage> = image_ids
        .par_iter()
        .map(|&id| load_thumbnail(pool_dir, id))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    let rows = (thumbnails.len() as u32).div_ceil(SHEET_COLUMNS).max(1);
    let mut sheet = RgbaImage::from_pixel(
        SHEET_COLUMNS * THUMB_WIDTH,
        rows * THUMB_HEIGHT,
        BACKGROUND,
    );
    for (i, thumb) in thumbnails.iter().enumerate() {
        let col = i as u32 % SHEET_COLUMNS;
        let row = i as u32 / SHEET_COLUMNS;
        imageops::overlay(
            &mut sheet,
            thumb,
            (col * THUMB_WIDTH) as i64,
            (row * THUMB_HEIGHT) as i64,
        );
    }

    save_rgb(sheet, out_path)?;
    info!(
        "Saved {} samples of class {} to {}",
        thumbnails.len(),
        class_id,
        out_path.display()
    );
    Ok(thumbnails.len())
}

fn load_thumbnail(pool_dir: &Path, image_id: u32) -> Option<RgbaImage> {
    let Some(path) = resolve_image(pool_dir, &image_id.to_string(), POOL_IMAGE_EXTENSIONS) else {
        warn!("Image {} not found in {}", image_id, pool_dir.display());
        return None;
    };
    match open_rgba(&path) {
        Ok(img) => Some(imageops::thumbnail(&img, THUMB_WIDTH, THUMB_HEIGHT)),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabelRow;

    fn write_pool_image(dir: &Path, id: u32) {
        RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 255]))
            .save(dir.join(format!("{}.png", id)))
            .unwrap();
    }

    #[test]
    fn test_clamp_and_draw_box() {
        assert_eq!(clamp_box([-5.0, 2.0, 10.0, 80.0], (40, 40)), Some([0, 2, 10, 39]));
        assert_eq!(clamp_box([10.0, 10.0, 5.0, 20.0], (40, 40)), None);

        let mut img = RgbaImage::new(40, 40);
        draw_rect(&mut img, [5, 5, 10, 10], BOX_COLOR, 2);
        assert_eq!(img.get_pixel(5, 5), &BOX_COLOR);
        assert_eq!(img.get_pixel(10, 10), &BOX_COLOR);
        assert_eq!(img.get_pixel(6, 8), &BOX_COLOR);
        assert_ne!(img.get_pixel(8, 8), &BOX_COLOR);
    }

    #[test]
    fn test_render_bounding_boxes() {
        let dir = tempfile::tempdir().unwrap();
        write_pool_image(dir.path(), 1);
        let table = LabelTable::training(vec![LabelRow::new(1, 10.0, 10.0, 20.0, 20.0, 0).unwrap()]);
        let out = dir.path().join("boxes.png");

        assert!(render_bounding_boxes(&table, 1, dir.path(), &out).unwrap());
        let rendered = image::open(&out).unwrap().into_rgb8();
        assert_eq!(rendered.get_pixel(10, 10), &image::Rgb([255, 0, 0]));
        assert_eq!(rendered.get_pixel(20, 20), &image::Rgb([0, 0, 0]));

        let empty = LabelTable::training(Vec::new());
        assert!(!render_bounding_boxes(&empty, 1, dir.path(), &out).unwrap());
        assert!(matches!(
            render_bounding_boxes(&table, 2, dir.path(), &out),
            Err(PrepError::ImageNotFound { image_id: 2, .. })
        ));
    }

    #[test]
    fn test_render_class_samples_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_pool_image(dir.path(), 1);
        write_pool_image(dir.path(), 3);
        let table = LabelTable::training(vec![
            LabelRow::new(1, 0.0, 0.0, 5.0, 5.0, 0).unwrap(),
            LabelRow::new(1, 1.0, 1.0, 5.0, 5.0, 0).unwrap(),
            LabelRow::new(2, 0.0, 0.0, 5.0, 5.0, 0).unwrap(),
            LabelRow::new(3, 0.0, 0.0, 5.0, 5.0, 0).unwrap(),
            LabelRow::new(4, 0.0, 0.0, 5.0, 5.0, 1).unwrap(),
        ]);
        let out = dir.path().join("samples.png");

        let placed = render_class_samples(&table, 0, dir.path(), DEFAULT_SAMPLES, &out).unwrap();
        assert_eq!(placed, 2);
        let sheet = image::open(&out).unwrap();
        assert_eq!(sheet.width(), SHEET_COLUMNS * THUMB_WIDTH);
    }

    #[test]
    fn test_render_class_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hist.png");
        let counts = BTreeMap::from([(0, 10), (1, 5)]);
        render_class_histogram(&counts, &out).unwrap();
        let img = image::open(&out).unwrap();
        assert_eq!(img.width(), 20 * 2 + 2 * 60);
    }
}
