// SPDX-License-Identifier: MIT

//! Drives one admitted job to completion (spec section "Executor").

use crate::artifacts;
use crate::error::ExecutorError;
use crate::inference::{inference_for, InferenceFn};
use image::DynamicImage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wsi_core::{ArtifactManifest, Clock, Config, Job, JobState, SystemClock};
use wsi_scheduler::Scheduler;

/// Runs one job's tiled execution against an already-decoded source image.
///
/// Opening the source (spec step 1: pyramid-level selection for WSI
/// formats, or treating it as a single image) is a transport/storage
/// concern left to the caller, which passes in the already-decoded
/// [`DynamicImage`] at the level it selected.
pub struct Executor<C: Clock = SystemClock> {
    scheduler: Arc<Scheduler<C>>,
    config: Arc<Config>,
}

impl<C: Clock> Executor<C> {
    pub fn new(scheduler: Arc<Scheduler<C>>, config: Arc<Config>) -> Self {
        Self { scheduler, config }
    }

    /// Run `job` (which must already be RUNNING) to a terminal state,
    /// releasing its scheduler resources afterward.
    ///
    /// Returns the jobs the Scheduler admitted once this job's resources
    /// were released, for the caller to dispatch in turn.
    pub fn run(&self, job: &Job, source: &DynamicImage, cancel: &CancellationToken) -> Vec<Job> {
        let store = self.scheduler.store();
        let inference = inference_for(job.job_type, self.config.enable_instantseg);

        match self.execute(job, source, inference.as_ref(), cancel) {
            Ok(manifest) => {
                tracing::info!(job_id = %job.id, "job succeeded");
                let _ = store.transition(job.id, &[JobState::Running], JobState::Succeeded, |j| {
                    j.manifest = Some(manifest);
                });
            }
            Err(ExecutorError::Canceled) => {
                // Cooperative cancellation only interrupts between tiles; the
                // job still ran partially, so this is a FAILED outcome, not
                // a CANCELED one (cancel of a RUNNING job is never honored).
                tracing::warn!(job_id = %job.id, "job stopped: shutdown requested");
                let _ = store.transition(job.id, &[JobState::Running], JobState::Failed, |j| {
                    j.error = Some("canceled during graceful shutdown".into());
                });
            }
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "job failed");
                let _ = store.transition(job.id, &[JobState::Running], JobState::Failed, |j| {
                    j.error = Some(err.to_string());
                });
            }
        }

        self.scheduler.release(job.id)
    }

    fn execute(
        &self,
        job: &Job,
        source: &DynamicImage,
        inference: &dyn InferenceFn,
        cancel: &CancellationToken,
    ) -> Result<ArtifactManifest, ExecutorError> {
        let store = self.scheduler.store();
        let rgb = source.to_rgb8();
        let tiles = crate::tiling::compute_tiles(rgb.width(), rgb.height(), self.config.tile_size, self.config.tile_overlap);
        let total = tiles.len() as u32;

        let dir = self.config.results_dir.join(job.id.to_string());
        std::fs::create_dir_all(&dir)?;

        let mut entries = Vec::with_capacity(tiles.len() + 1);
        let mut painted_tiles = Vec::with_capacity(tiles.len());

        for (done, tile) in tiles.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ExecutorError::Canceled);
            }

            let padded = image::imageops::crop_imm(&rgb, tile.pad_x, tile.pad_y, tile.pad_w, tile.pad_h).to_image();
            let mask = inference.infer(&padded);
            let cropped = crate::tiling::crop_to_core(&mask, tile);

            let entry = artifacts::write_mask(&dir, tile.row, tile.col, &cropped)?;
            entries.push(entry);
            painted_tiles.push((*tile, cropped));

            store.update_progress(job.id, (done + 1) as u32, total)?;
        }

        let preview = artifacts::compose_preview(rgb.width(), rgb.height(), &painted_tiles, job.job_type, 1024);
        entries.push(artifacts::write_preview(&dir, &preview)?);

        let created_at_epoch_ms = *job.state_entered_at.get(&JobState::Pending).unwrap_or(&0);
        let manifest = ArtifactManifest {
            job_id: job.id,
            workflow_id: job.workflow_id,
            tenant_id: job.tenant_id.clone(),
            job_type: job.job_type,
            branch: job.branch.clone(),
            tile_count: total,
            created_at_epoch_ms,
            finished_at_epoch_ms: store.clock().epoch_ms(),
            artifacts: entries.clone(),
        };
        artifacts::write_manifest(&dir, &manifest)?;
        artifacts::bundle_zip(&dir, &entries)?;

        Ok(manifest)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
