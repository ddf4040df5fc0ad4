// SPDX-License-Identifier: MIT

//! Workflow identifier, record, and the derived aggregate over its jobs.

use crate::job::{Job, JobState};
use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a workflow.
    pub struct WorkflowId("wf-");
}

/// A workflow (spec section "Data Model: Workflow").
///
/// The tenant never changes after creation; `job_ids` grows monotonically
/// up to `Config::max_jobs_per_workflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub tenant_id: TenantId,
    pub name: String,
    pub created_at_epoch_ms: u64,
    pub job_ids: Vec<crate::job::JobId>,
}

impl Workflow {
    pub fn new(tenant_id: TenantId, name: impl Into<String>, now_epoch_ms: u64) -> Self {
        Self { id: WorkflowId::new(), tenant_id, name: name.into(), created_at_epoch_ms: now_epoch_ms, job_ids: Vec::new() }
    }
}

/// Derived, on-demand aggregate over a workflow's current job set (spec
/// section "Store": workflow aggregate progress).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAggregate {
    pub state: WorkflowState,
    /// Arithmetic mean of job progress, CANCELED excluded, SUCCEEDED = 1.0,
    /// FAILED = last observed progress. `1.0` (vacuously) when there are no
    /// non-canceled jobs.
    pub percent_complete: f64,
    pub pending: u32,
    pub running: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub canceled: u32,
}

impl WorkflowAggregate {
    /// Compute the aggregate from a workflow's current jobs.
    ///
    /// `jobs` must be exactly the jobs belonging to this workflow; order
    /// does not matter.
    pub fn compute<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let (mut pending, mut running, mut succeeded, mut failed, mut canceled) = (0u32, 0u32, 0u32, 0u32, 0u32);
        let mut progress_sum = 0.0;
        let mut counted = 0u32;

        for job in jobs {
            match job.state {
                JobState::Pending => pending += 1,
                JobState::Running => running += 1,
                JobState::Succeeded => succeeded += 1,
                JobState::Failed => failed += 1,
                JobState::Canceled => canceled += 1,
            }
            if job.state != JobState::Canceled {
                counted += 1;
                progress_sum += match job.state {
                    JobState::Succeeded => 1.0,
                    _ => job.progress,
                };
            }
        }

        let state = if running > 0 {
            WorkflowState::Running
        } else if succeeded == counted {
            // Vacuously true (and SUCCEEDED) when there are no non-canceled jobs.
            WorkflowState::Succeeded
        } else if failed > 0 {
            WorkflowState::Failed
        } else {
            WorkflowState::Pending
        };

        let percent_complete = if counted == 0 { 1.0 } else { progress_sum / counted as f64 };

        Self { state, percent_complete, pending, running, succeeded, failed, canceled }
    }
}

/// Derived workflow-level state (spec section "Store").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

crate::simple_display! {
    WorkflowState {
        Pending => "pending",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
