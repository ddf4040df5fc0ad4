// SPDX-License-Identifier: MIT

//! Admission scheduler (spec section "Scheduler").
//!
//! Owns three resource tallies — worker slots, the active-tenant set, and
//! per-branch locks — plus a FIFO admission queue scanned (never dequeued
//! blindly) so a job blocked on one constraint cannot head-of-line-block a
//! job behind it that could run.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use wsi_core::{ApiError, Clock, Job, JobId, JobState, SystemClock, TenantId, WorkflowId};
use wsi_store::Store;

/// One reason a PENDING job is currently non-admissible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// No free worker slot.
    Worker,
    /// Its (workflow, branch) key is already RUNNING.
    Branch,
    /// Its tenant is not active and the active-tenant set is full.
    UserSlot,
}

wsi_core::simple_display! {
    Reason {
        Worker => "WORKER",
        Branch => "BRANCH",
        UserSlot => "USER_SLOT",
    }
}

/// Response to `queue_status` (spec section "External Interfaces").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued: bool,
    pub waiting_for: Vec<Reason>,
    pub active_workers: u32,
    pub max_workers: u32,
    pub active_users: u32,
    pub max_active_users: u32,
}

struct Inner {
    worker_slots: u32,
    /// Count of currently-RUNNING jobs per tenant; a tenant is "active"
    /// (occupies one of the `MAX_ACTIVE_USERS` slots) while its count is > 0.
    active_tenants: HashMap<TenantId, u32>,
    branch_busy: HashSet<(WorkflowId, String)>,
    /// FIFO order of PENDING job ids awaiting admission; scanned front to
    /// back on every pass, not dequeued blindly.
    queue: VecDeque<JobId>,
}

/// The admission scheduler.
///
/// Serializes its own resource tallies and queue under a single lock;
/// never holds that lock across I/O, and never blocks on a resource itself
/// — it scans, admits what it can, and returns (spec section "Concurrency
/// & Resource Model").
pub struct Scheduler<C: Clock = SystemClock> {
    store: Arc<Store<C>>,
    inner: Mutex<Inner>,
    max_workers: u32,
    max_active_users: u32,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(store: Arc<Store<C>>, max_workers: u32, max_active_users: u32) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner {
                worker_slots: max_workers,
                active_tenants: HashMap::new(),
                branch_busy: HashSet::new(),
                queue: VecDeque::new(),
            }),
            max_workers,
            max_active_users,
        }
    }

    /// Enqueue a PENDING job for admission and run a selection pass.
    ///
    /// Returns every job the pass admitted (including, possibly, `job_id`
    /// itself) — the caller hands each to the Executor.
    pub fn start(&self, tenant: &TenantId, job_id: JobId) -> Result<Vec<Job>, ApiError> {
        let job = self.store.get_job(tenant, job_id)?;
        if job.state != JobState::Pending {
            return Err(ApiError::conflict(format!("job {job_id} is {}, expected pending", job.state)));
        }

        let mut inner = self.inner.lock();
        if !inner.queue.contains(&job_id) {
            inner.queue.push_back(job_id);
            tracing::debug!(job_id = %job_id, "job enqueued for admission");
        }
        Ok(self.run_admission_pass(&mut inner))
    }

    /// Cancel a PENDING job: CONFLICT for any other state (spec section
    /// "Job state machine").
    pub fn cancel(&self, tenant: &TenantId, job_id: JobId) -> Result<Job, ApiError> {
        let mut inner = self.inner.lock();
        let job = self.store.get_job(tenant, job_id)?;
        if job.state != JobState::Pending {
            return Err(ApiError::conflict(format!("job {job_id} is {}, cancel requires pending", job.state)));
        }
        let canceled = self.store.transition(job_id, &[JobState::Pending], JobState::Canceled, |_| {})?;
        inner.queue.retain(|id| *id != job_id);
        tracing::info!(job_id = %job_id, "job canceled and dequeued");
        Ok(canceled)
    }

    /// Retry any terminal job: re-enqueues at the FIFO tail and runs a
    /// selection pass. CONFLICT if the job is RUNNING or PENDING.
    pub fn retry(&self, tenant: &TenantId, job_id: JobId) -> Result<Vec<Job>, ApiError> {
        let job = self.store.get_job(tenant, job_id)?;
        if !job.state.is_terminal() {
            return Err(ApiError::conflict(format!("job {job_id} is {}, retry requires a terminal state", job.state)));
        }
        self.store.transition(job_id, &JobState::TERMINAL, JobState::Pending, |_| {})?;

        let mut inner = self.inner.lock();
        inner.queue.push_back(job_id);
        tracing::debug!(job_id = %job_id, "job re-enqueued for retry");
        Ok(self.run_admission_pass(&mut inner))
    }

    /// Release a just-terminated RUNNING job's resources and run a
    /// selection pass. Called by the Executor (or its caller) immediately
    /// after it transitions a job to SUCCEEDED/FAILED.
    ///
    /// `job_id` must name a job the Store already recorded as terminal;
    /// calling this for any other job is a scheduler integrity bug.
    pub fn release(&self, job_id: JobId) -> Vec<Job> {
        let job = self
            .store
            .job_unchecked(job_id)
            .unwrap_or_else(|| unreachable!("release called for unknown job {job_id}"));
        assert!(job.state.is_terminal(), "release called on non-terminal job {job_id}");

        let mut inner = self.inner.lock();
        inner.worker_slots += 1;
        assert!(inner.worker_slots <= self.max_workers, "worker_slots exceeded MAX_WORKERS");
        inner.branch_busy.remove(&job.branch_key());
        if let Some(count) = inner.active_tenants.get_mut(&job.tenant_id) {
            *count -= 1;
            if *count == 0 {
                inner.active_tenants.remove(&job.tenant_id);
            }
        }
        tracing::info!(job_id = %job_id, workflow_id = %job.workflow_id, "scheduler resources released");
        self.run_admission_pass(&mut inner)
    }

    /// The Store backing this scheduler, for components (the Executor) that
    /// need to read or mutate job state directly.
    pub fn store(&self) -> &Arc<Store<C>> {
        &self.store
    }

    pub fn queue_status(&self, tenant: &TenantId, job_id: JobId) -> Result<QueueStatus, ApiError> {
        let job = self.store.get_job(tenant, job_id)?;
        let inner = self.inner.lock();
        let active_workers = self.max_workers - inner.worker_slots;
        let active_users = inner.active_tenants.len() as u32;

        if job.state != JobState::Pending {
            return Ok(QueueStatus {
                queued: false,
                waiting_for: Vec::new(),
                active_workers,
                max_workers: self.max_workers,
                active_users,
                max_active_users: self.max_active_users,
            });
        }

        let mut waiting_for = Vec::new();
        if inner.worker_slots == 0 {
            waiting_for.push(Reason::Worker);
        }
        if inner.branch_busy.contains(&job.branch_key()) {
            waiting_for.push(Reason::Branch);
        }
        let tenant_active = inner.active_tenants.contains_key(&job.tenant_id);
        if !tenant_active && active_users >= self.max_active_users {
            waiting_for.push(Reason::UserSlot);
        }

        Ok(QueueStatus {
            queued: true,
            waiting_for,
            active_workers,
            max_workers: self.max_workers,
            active_users,
            max_active_users: self.max_active_users,
        })
    }

    /// Scan the queue front to back, admitting every job that is currently
    /// admissible; never stops at the first blocked job (spec section
    /// "Scheduler: Selection policy").
    fn run_admission_pass(&self, inner: &mut Inner) -> Vec<Job> {
        let mut admitted = Vec::new();
        let mut remaining = VecDeque::with_capacity(inner.queue.len());

        while let Some(job_id) = inner.queue.pop_front() {
            if inner.worker_slots == 0 {
                remaining.push_back(job_id);
                continue;
            }

            let snapshot = match self.store.job_unchecked(job_id) {
                Some(job) if job.state == JobState::Pending => job,
                // Stale entry (e.g. canceled through another path already) — drop it.
                _ => continue,
            };

            let branch_key = snapshot.branch_key();
            let tenant_count = inner.active_tenants.get(&snapshot.tenant_id).copied().unwrap_or(0);
            let admissible = !inner.branch_busy.contains(&branch_key)
                && (tenant_count > 0 || (inner.active_tenants.len() as u32) < self.max_active_users);

            if !admissible {
                remaining.push_back(job_id);
                continue;
            }

            match self.store.transition(job_id, &[JobState::Pending], JobState::Running, |_| {}) {
                Ok(running) => {
                    inner.worker_slots -= 1;
                    inner.branch_busy.insert(branch_key);
                    *inner.active_tenants.entry(snapshot.tenant_id.clone()).or_insert(0) += 1;
                    tracing::info!(job_id = %job_id, workflow_id = %snapshot.workflow_id, "job admitted");
                    admitted.push(running);
                }
                // Raced with an external cancel between the snapshot and the
                // transition; drop it, no resources were taken for it.
                Err(_) => continue,
            }
        }

        inner.queue = remaining;
        admitted
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
