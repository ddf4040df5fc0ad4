// SPDX-License-Identifier: MIT

//! The per-tile inference boundary (spec sections "InferenceFn" and
//! "Design notes": a dynamic pluggable inference function becomes, here, a
//! closed two-variant capability selected by job-type tag; the Scheduler
//! and Executor see only the tag and an opaque callable).

use image::{GrayImage, Luma, RgbImage};
use wsi_core::JobType;

/// A per-tile inference function. Opaque to the Scheduler; the Executor
/// invokes it once per tile with that tile's padded pixel region.
pub trait InferenceFn: Send + Sync {
    fn infer(&self, tile: &RgbImage) -> GrayImage;
}

/// Deterministic TISSUE_MASK implementation: darker-than-background pixels
/// (by luma) are called tissue. Always used — this job type has no
/// `ENABLE_INSTANTSEG` real-model counterpart in this crate.
pub struct TissueMaskFallback {
    pub luma_threshold: f32,
}

impl Default for TissueMaskFallback {
    fn default() -> Self {
        Self { luma_threshold: 200.0 }
    }
}

impl InferenceFn for TissueMaskFallback {
    fn infer(&self, tile: &RgbImage) -> GrayImage {
        GrayImage::from_fn(tile.width(), tile.height(), |x, y| {
            let p = tile.get_pixel(x, y);
            let luma = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
            Luma([if luma < self.luma_threshold { 255 } else { 0 }])
        })
    }
}

/// Deterministic SEGMENT_CELLS fallback used when `ENABLE_INSTANTSEG=false`
/// (spec section "External Interfaces: Config keys"): a stricter luma
/// threshold standing in for nucleus detection, so the crate is runnable
/// and testable without an external model.
pub struct SegmentCellsFallback {
    pub luma_threshold: f32,
}

impl Default for SegmentCellsFallback {
    fn default() -> Self {
        Self { luma_threshold: 120.0 }
    }
}

impl InferenceFn for SegmentCellsFallback {
    fn infer(&self, tile: &RgbImage) -> GrayImage {
        GrayImage::from_fn(tile.width(), tile.height(), |x, y| {
            let p = tile.get_pixel(x, y);
            let luma = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
            Luma([if luma < self.luma_threshold { 255 } else { 0 }])
        })
    }
}

/// Select the inference implementation for a job type.
///
/// `enable_instantseg` is carried through as the pluggability boundary
/// (spec section "Design notes"): a real SEGMENT_CELLS model would be
/// swapped in here without the Scheduler or Executor changing. This crate
/// ships only the deterministic fallback for both job types.
pub fn inference_for(job_type: JobType, _enable_instantseg: bool) -> Box<dyn InferenceFn> {
    match job_type {
        JobType::SegmentCells => Box::new(SegmentCellsFallback::default()),
        JobType::TissueMask => Box::new(TissueMaskFallback::default()),
    }
}

#[cfg(test)]
#[path = "inference_tests.rs"]
mod tests;
