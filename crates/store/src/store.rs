// SPDX-License-Identifier: MIT

//! The job/workflow store: the single writer of all Job/Workflow state
//! (spec section "Store").

use crate::bus::{EventBus, Subscription, DEFAULT_BUFFER};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use wsi_core::{
    ApiError, Clock, Event, Job, JobId, JobState, JobType, SystemClock, TenantId, Workflow,
    WorkflowAggregate, WorkflowId,
};

struct Inner {
    workflows: HashMap<WorkflowId, Workflow>,
    jobs: HashMap<JobId, Job>,
}

/// The in-memory Job/Workflow store.
///
/// All public mutations go through a single coarse lock; the lock is
/// dropped before events are published so a slow subscriber can never
/// block a mutation (spec section "Store").
pub struct Store<C: Clock = SystemClock> {
    inner: Mutex<Inner>,
    bus: EventBus,
    clock: C,
    max_jobs_per_workflow: u32,
}

impl Store<SystemClock> {
    pub fn new(max_jobs_per_workflow: u32) -> Self {
        Self::with_clock(SystemClock, max_jobs_per_workflow)
    }
}

impl<C: Clock> Store<C> {
    pub fn with_clock(clock: C, max_jobs_per_workflow: u32) -> Self {
        Self {
            inner: Mutex::new(Inner { workflows: HashMap::new(), jobs: HashMap::new() }),
            bus: EventBus::new(DEFAULT_BUFFER),
            clock,
            max_jobs_per_workflow,
        }
    }

    pub fn create_workflow(&self, tenant: TenantId, name: impl Into<String>) -> Workflow {
        let workflow = Workflow::new(tenant, name, self.clock.epoch_ms());
        self.inner.lock().workflows.insert(workflow.id, workflow.clone());
        workflow
    }

    /// `job_type_tag` comes from the external request; it is validated
    /// against the closed `JobType` set here (spec: INVALID if unknown).
    pub fn create_job(
        &self,
        tenant: &TenantId,
        workflow_id: WorkflowId,
        file_ref: impl Into<String>,
        job_type_tag: &str,
        branch: impl Into<String>,
    ) -> Result<Job, ApiError> {
        let job_type = JobType::from_str(job_type_tag)
            .map_err(|_| ApiError::invalid(format!("unknown job type: {job_type_tag}")))?;

        let job = {
            let mut inner = self.inner.lock();
            let workflow = inner
                .workflows
                .get(&workflow_id)
                .ok_or_else(|| ApiError::not_found(format!("workflow {workflow_id} not found")))?;
            if &workflow.tenant_id != tenant {
                return Err(ApiError::forbidden("workflow belongs to a different tenant"));
            }
            if workflow.job_ids.len() as u32 >= self.max_jobs_per_workflow {
                return Err(ApiError::limit_exceeded(format!(
                    "workflow already has {} jobs",
                    self.max_jobs_per_workflow
                )));
            }

            let job = Job::new(workflow_id, tenant.clone(), file_ref, job_type, branch, self.clock.epoch_ms());

            let Inner { workflows, jobs } = &mut *inner;
            jobs.insert(job.id, job.clone());
            if let Some(workflow) = workflows.get_mut(&workflow_id) {
                workflow.job_ids.push(job.id);
            }
            job
        };

        tracing::info!(job_id = %job.id, workflow_id = %workflow_id, job_type = %job_type, "job created");
        self.publish_job(&job);
        Ok(job)
    }

    pub fn get_job(&self, tenant: &TenantId, job_id: JobId) -> Result<Job, ApiError> {
        let inner = self.inner.lock();
        let job = inner.jobs.get(&job_id).ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;
        if &job.tenant_id != tenant {
            return Err(ApiError::forbidden("job belongs to a different tenant"));
        }
        Ok(job.clone())
    }

    pub fn get_workflow(&self, tenant: &TenantId, workflow_id: WorkflowId) -> Result<(Workflow, WorkflowAggregate), ApiError> {
        let inner = self.inner.lock();
        let workflow = inner
            .workflows
            .get(&workflow_id)
            .ok_or_else(|| ApiError::not_found(format!("workflow {workflow_id} not found")))?;
        if &workflow.tenant_id != tenant {
            return Err(ApiError::forbidden("workflow belongs to a different tenant"));
        }
        let aggregate = self.aggregate_locked(&inner, workflow_id);
        Ok((workflow.clone(), aggregate))
    }

    pub fn list_workflow_jobs(&self, tenant: &TenantId, workflow_id: WorkflowId) -> Result<Vec<Job>, ApiError> {
        let inner = self.inner.lock();
        let workflow = inner
            .workflows
            .get(&workflow_id)
            .ok_or_else(|| ApiError::not_found(format!("workflow {workflow_id} not found")))?;
        if &workflow.tenant_id != tenant {
            return Err(ApiError::forbidden("workflow belongs to a different tenant"));
        }
        Ok(workflow.job_ids.iter().filter_map(|id| inner.jobs.get(id).cloned()).collect())
    }

    pub fn list_workflows(&self, tenant: &TenantId) -> Vec<Workflow> {
        self.inner.lock().workflows.values().filter(|w| &w.tenant_id == tenant).cloned().collect()
    }

    /// Atomic compare-and-set state transition (spec section "Store").
    ///
    /// Succeeds only if the job's current state is in `from_states`; on
    /// success runs `mutate` against the job *before* recording the new
    /// state (so e.g. the Executor can set `error` in the same call that
    /// transitions RUNNING -> FAILED), then publishes exactly one event.
    pub fn transition(
        &self,
        job_id: JobId,
        from_states: &[JobState],
        to_state: JobState,
        mutate: impl FnOnce(&mut Job),
    ) -> Result<Job, ApiError> {
        let job = {
            let mut inner = self.inner.lock();
            let job = inner.jobs.get_mut(&job_id).ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;
            if !from_states.contains(&job.state) {
                return Err(ApiError::conflict(format!(
                    "job {job_id} is {}, expected one of {:?}",
                    job.state, from_states
                )));
            }
            mutate(job);
            job.enter_state(to_state, self.clock.epoch_ms());
            job.clone()
        };

        tracing::info!(job_id = %job.id, to = %to_state, "job transitioned");
        self.publish_job(&job);
        Ok(job)
    }

    /// Record tile progress for a RUNNING job. Progress is clamped to never
    /// move backwards within a RUNNING episode (spec: monotonic
    /// non-decreasing).
    pub fn update_progress(&self, job_id: JobId, done: u32, total: u32) -> Result<Job, ApiError> {
        let job = {
            let mut inner = self.inner.lock();
            let job = inner.jobs.get_mut(&job_id).ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;
            if job.state != JobState::Running {
                return Err(ApiError::conflict(format!("job {job_id} is not running")));
            }
            job.tiles_total = total;
            job.tiles_done = done;
            let next = if total == 0 { 0.0 } else { done as f64 / total as f64 };
            job.progress = job.progress.max(next);
            job.clone()
        };
        self.publish_job(&job);
        Ok(job)
    }

    pub fn subscribe(&self, entity_id: &str) -> Subscription {
        self.bus.subscribe(entity_id)
    }

    /// Fetch a job snapshot without tenant scoping.
    ///
    /// For trusted in-process components only (the Scheduler and Executor,
    /// which already hold the job id from an admitted/owned job and are
    /// inside the trust boundary); never expose this through a tenant-facing
    /// API surface.
    pub fn job_unchecked(&self, job_id: JobId) -> Option<Job> {
        self.inner.lock().jobs.get(&job_id).cloned()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn aggregate_locked(&self, inner: &Inner, workflow_id: WorkflowId) -> WorkflowAggregate {
        WorkflowAggregate::compute(inner.jobs.values().filter(|j| j.workflow_id == workflow_id))
    }

    fn publish_job(&self, job: &Job) {
        let at = self.clock.epoch_ms();
        self.bus.publish(&job.id.to_string(), Event::for_job(job, at));

        let aggregate = {
            let inner = self.inner.lock();
            self.aggregate_locked(&inner, job.workflow_id)
        };
        self.bus.publish(&job.workflow_id.to_string(), Event::for_workflow(job.workflow_id, &aggregate, at));
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
