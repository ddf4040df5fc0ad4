// SPDX-License-Identifier: MIT

//! A transport-agnostic facade over the Store, Scheduler, and Executor
//! (spec section "External Interfaces"), standing in for the out-of-scope
//! HTTP/SSE surface.

use image::{DynamicImage, Rgb, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wsi_core::{ApiError, ArtifactManifest, Clock, Config, Job, JobId, SystemClock, TenantId, Workflow, WorkflowAggregate, WorkflowId};
use wsi_executor::Executor;
use wsi_scheduler::{QueueStatus, Scheduler};
use wsi_store::{Store, Subscription};

/// Every operation in spec section "External Interfaces" except `upload
/// file` (the on-disk upload layout is an out-of-scope collaborator; see
/// [`synthetic_source_image`]).
pub struct Api<C: Clock = SystemClock> {
    store: Arc<Store<C>>,
    scheduler: Arc<Scheduler<C>>,
    executor: Arc<Executor<C>>,
    config: Arc<Config>,
}

impl<C: Clock> Api<C> {
    pub fn new(store: Arc<Store<C>>, scheduler: Arc<Scheduler<C>>, executor: Arc<Executor<C>>, config: Arc<Config>) -> Self {
        Self { store, scheduler, executor, config }
    }

    pub fn create_workflow(&self, tenant: TenantId, name: impl Into<String>) -> Workflow {
        self.store.create_workflow(tenant, name)
    }

    pub fn create_job(
        &self,
        tenant: &TenantId,
        workflow_id: WorkflowId,
        file_ref: impl Into<String>,
        job_type: &str,
        branch: impl Into<String>,
    ) -> Result<Job, ApiError> {
        self.store.create_job(tenant, workflow_id, file_ref, job_type, branch)
    }

    pub fn get_job(&self, tenant: &TenantId, job_id: JobId) -> Result<Job, ApiError> {
        self.store.get_job(tenant, job_id)
    }

    pub fn get_workflow(&self, tenant: &TenantId, workflow_id: WorkflowId) -> Result<(Workflow, WorkflowAggregate), ApiError> {
        self.store.get_workflow(tenant, workflow_id)
    }

    pub fn list_workflow_jobs(&self, tenant: &TenantId, workflow_id: WorkflowId) -> Result<Vec<Job>, ApiError> {
        self.store.list_workflow_jobs(tenant, workflow_id)
    }

    pub fn list_workflows(&self, tenant: &TenantId) -> Vec<Workflow> {
        self.store.list_workflows(tenant)
    }

    pub fn queue_status(&self, tenant: &TenantId, job_id: JobId) -> Result<QueueStatus, ApiError> {
        self.scheduler.queue_status(tenant, job_id)
    }

    pub fn subscribe(&self, entity_id: &str) -> Subscription {
        self.store.subscribe(entity_id)
    }

    /// Enqueue `job_id` with the Scheduler without dispatching it. Exposed
    /// separately from [`Api::start_job`] so a caller driving several jobs
    /// at once (e.g. the demo scenarios in [`crate::scenario`]) can enqueue
    /// all of them before any are dispatched, rather than fully draining
    /// each one's admission cascade before the next is even enqueued.
    pub fn enqueue(&self, tenant: &TenantId, job_id: JobId) -> Result<Vec<Job>, ApiError> {
        self.scheduler.start(tenant, job_id)
    }

    /// Dispatch an already-admitted frontier of jobs (and whatever further
    /// jobs their completion unblocks) to completion.
    pub async fn dispatch(&self, admitted: Vec<Job>, shutdown: &CancellationToken) {
        self.dispatch_waves(admitted, shutdown).await;
    }

    /// Enqueue `job_id` with the Scheduler and drive every admission wave
    /// (this job's and any later jobs its completion unblocks) to
    /// completion. Returns once the whole admitted frontier has drained.
    pub async fn start_job(&self, tenant: &TenantId, job_id: JobId, shutdown: &CancellationToken) -> Result<(), ApiError> {
        let admitted = self.enqueue(tenant, job_id)?;
        self.dispatch(admitted, shutdown).await;
        Ok(())
    }

    pub fn cancel_job(&self, tenant: &TenantId, job_id: JobId) -> Result<Job, ApiError> {
        self.scheduler.cancel(tenant, job_id)
    }

    pub async fn retry_job(&self, tenant: &TenantId, job_id: JobId, shutdown: &CancellationToken) -> Result<(), ApiError> {
        let admitted = self.scheduler.retry(tenant, job_id)?;
        self.dispatch(admitted, shutdown).await;
        Ok(())
    }

    pub fn fetch_manifest(&self, tenant: &TenantId, job_id: JobId) -> Result<ArtifactManifest, ApiError> {
        let job = self.store.get_job(tenant, job_id)?;
        job.manifest.ok_or_else(|| ApiError::conflict(format!("job {job_id} has no manifest (not SUCCEEDED)")))
    }

    pub fn fetch_preview_path(&self, tenant: &TenantId, job_id: JobId) -> Result<PathBuf, ApiError> {
        self.artifact_path(tenant, job_id, "preview.png")
    }

    pub fn fetch_artifacts_path(&self, tenant: &TenantId, job_id: JobId) -> Result<PathBuf, ApiError> {
        self.artifact_path(tenant, job_id, "artifacts.zip")
    }

    fn artifact_path(&self, tenant: &TenantId, job_id: JobId, name: &str) -> Result<PathBuf, ApiError> {
        self.store.get_job(tenant, job_id)?;
        let path = self.config.results_dir.join(job_id.to_string()).join(name);
        if path.exists() {
            Ok(path)
        } else {
            Err(ApiError::not_found(format!("{name} not yet written for job {job_id}")))
        }
    }

    /// Admit, dispatch, and await one frontier of jobs at a time: a job's
    /// completion may unblock others, which form the next frontier. Jobs
    /// within one frontier run concurrently, bounded by the Scheduler's own
    /// `worker_slots` accounting (spec section "Scheduler").
    async fn dispatch_waves(&self, first_wave: Vec<Job>, shutdown: &CancellationToken) {
        let mut frontier = first_wave;
        while !frontier.is_empty() {
            let mut handles = Vec::with_capacity(frontier.len());
            for job in frontier {
                let executor = self.executor.clone();
                let token = shutdown.clone();
                let source = synthetic_source_image(&job);
                handles.push(tokio::task::spawn_blocking(move || executor.run(&job, &source, &token)));
            }
            let mut next = Vec::new();
            for handle in handles {
                if let Ok(admitted) = handle.await {
                    next.extend(admitted);
                }
            }
            frontier = next;
        }
    }
}

/// Synthesize a deterministic placeholder source image for a job.
///
/// Opening the real uploaded file (including pyramid-level selection for
/// WSI formats) is spec section 1's out-of-scope "on-disk upload/results
/// directory layout" collaborator; this stands in for it so the Executor's
/// tiling contract can still be exercised end-to-end without one.
pub fn synthetic_source_image(job: &Job) -> DynamicImage {
    let seed = job.branch.bytes().fold(17u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
    DynamicImage::ImageRgb8(RgbImage::from_fn(320, 240, move |x, y| {
        let v = seed.wrapping_add((x ^ y) as u8);
        Rgb([v, v.wrapping_add(40), v.wrapping_add(80)])
    }))
}
