// SPDX-License-Identifier: MIT

//! Artifact writing (spec section "Executor", steps 3-6, and "Artifact
//! atomicity"): masks, the stitched preview, `manifest.json`, and
//! `artifacts.zip`.

use crate::error::ExecutorError;
use crate::tiling::Tile;
use image::{GrayImage, Rgb, RgbImage};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use wsi_core::{ArtifactEntry, ArtifactManifest, JobType};

pub fn mask_filename(row: u32, col: u32) -> String {
    format!("mask_{row}_{col}.png")
}

/// Write one tile's cropped mask, fsync it, and return its manifest entry.
pub fn write_mask(dir: &Path, row: u32, col: u32, mask: &GrayImage) -> Result<ArtifactEntry, ExecutorError> {
    let name = mask_filename(row, col);
    let path = dir.join(&name);
    mask.save(&path)?;
    let size = fsync_and_size(&path)?;
    Ok(ArtifactEntry { relative_path: name, size_bytes: size })
}

/// Compose a downscaled stitched preview: each tile's mask is placed at its
/// scaled position with a job-type color overlay (red for SEGMENT_CELLS,
/// green for TISSUE_MASK) against a neutral background, bounded to
/// `max_dim` on its longest side.
pub fn compose_preview(image_w: u32, image_h: u32, tiles: &[(Tile, GrayImage)], job_type: JobType, max_dim: u32) -> RgbImage {
    let longest = image_w.max(image_h).max(1);
    let scale = (max_dim as f32 / longest as f32).min(1.0);
    let out_w = ((image_w as f32 * scale).round() as u32).max(1);
    let out_h = ((image_h as f32 * scale).round() as u32).max(1);

    let color = match job_type {
        JobType::SegmentCells => Rgb([220, 40, 40]),
        JobType::TissueMask => Rgb([40, 200, 80]),
    };

    let mut canvas = RgbImage::from_pixel(out_w, out_h, Rgb([32, 32, 32]));
    for (tile, mask) in tiles {
        let scaled_w = ((tile.core_w as f32 * scale).round() as u32).max(1);
        let scaled_h = ((tile.core_h as f32 * scale).round() as u32).max(1);
        let resized = image::imageops::resize(mask, scaled_w, scaled_h, image::imageops::FilterType::Triangle);
        let origin_x = (tile.core_x as f32 * scale).round() as u32;
        let origin_y = (tile.core_y as f32 * scale).round() as u32;
        for (x, y, pixel) in resized.enumerate_pixels() {
            if pixel.0[0] == 0 {
                continue;
            }
            let (cx, cy) = (origin_x + x, origin_y + y);
            if cx < out_w && cy < out_h {
                canvas.put_pixel(cx, cy, color);
            }
        }
    }
    canvas
}

pub fn write_preview(dir: &Path, preview: &RgbImage) -> Result<ArtifactEntry, ExecutorError> {
    let name = "preview.png".to_string();
    let path = dir.join(&name);
    preview.save(&path)?;
    let size = fsync_and_size(&path)?;
    Ok(ArtifactEntry { relative_path: name, size_bytes: size })
}

/// `manifest.json` is written only after every other artifact has been
/// fsynced (spec section "Artifact atomicity"): its existence is the
/// completion signal consumers may rely on.
pub fn write_manifest(dir: &Path, manifest: &ArtifactManifest) -> Result<(), ExecutorError> {
    let path = dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(manifest).map_err(|e| ExecutorError::Io(std::io::Error::other(e)))?;
    let mut file = File::create(&path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Bundle the given artifacts into `artifacts.zip`, written to a temp name
/// and renamed into place (spec section "Artifact atomicity"). `entries`
/// must not include `manifest.json` itself (spec: "the mask files + preview").
pub fn bundle_zip(dir: &Path, entries: &[ArtifactEntry]) -> Result<(), ExecutorError> {
    let tmp_path = dir.join("artifacts.zip.tmp");
    let final_path = dir.join("artifacts.zip");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for entry in entries {
            writer.start_file(&entry.relative_path, options)?;
            let mut source = File::open(dir.join(&entry.relative_path))?;
            let mut buf = Vec::new();
            source.read_to_end(&mut buf)?;
            writer.write_all(&buf)?;
        }
        writer.finish()?;
    }
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

fn fsync_and_size(path: &Path) -> std::io::Result<u64> {
    let file = File::open(path)?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
