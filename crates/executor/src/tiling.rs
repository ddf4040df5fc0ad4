// SPDX-License-Identifier: MIT

//! Tile grid computation (spec section "Executor", step 2).
//!
//! Non-overlapping `TILE_SIZE`-square tiles cover the image in row-major
//! order; each tile additionally carries a padded region extended by
//! `TILE_OVERLAP` pixels on every side (clipped to the image bounds) that
//! is what actually gets passed to inference, giving the per-tile function
//! context beyond its own core region.

use image::GrayImage;

/// One tile's core (output) region and its padded (inference input) region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub row: u32,
    pub col: u32,
    pub core_x: u32,
    pub core_y: u32,
    pub core_w: u32,
    pub core_h: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub pad_w: u32,
    pub pad_h: u32,
}

/// Compute the row-major tile grid for an `image_w` x `image_h` image.
pub fn compute_tiles(image_w: u32, image_h: u32, tile_size: u32, overlap: u32) -> Vec<Tile> {
    if image_w == 0 || image_h == 0 || tile_size == 0 {
        return Vec::new();
    }

    let cols = image_w.div_ceil(tile_size);
    let rows = image_h.div_ceil(tile_size);
    let mut tiles = Vec::with_capacity((rows * cols) as usize);

    for row in 0..rows {
        for col in 0..cols {
            let core_x = col * tile_size;
            let core_y = row * tile_size;
            let core_w = tile_size.min(image_w - core_x);
            let core_h = tile_size.min(image_h - core_y);

            let pad_x = core_x.saturating_sub(overlap);
            let pad_y = core_y.saturating_sub(overlap);
            let pad_x2 = (core_x + core_w + overlap).min(image_w);
            let pad_y2 = (core_y + core_h + overlap).min(image_h);

            tiles.push(Tile {
                row,
                col,
                core_x,
                core_y,
                core_w,
                core_h,
                pad_x,
                pad_y,
                pad_w: pad_x2 - pad_x,
                pad_h: pad_y2 - pad_y,
            });
        }
    }
    tiles
}

/// Crop a mask produced over a tile's padded region down to just its core
/// region, discarding the overlap margins (spec section "Executor", step 3).
pub fn crop_to_core(mask: &GrayImage, tile: &Tile) -> GrayImage {
    let offset_x = tile.core_x - tile.pad_x;
    let offset_y = tile.core_y - tile.pad_y;
    image::imageops::crop_imm(mask, offset_x, offset_y, tile.core_w, tile.core_h).to_image()
}

#[cfg(test)]
#[path = "tiling_tests.rs"]
mod tests;
