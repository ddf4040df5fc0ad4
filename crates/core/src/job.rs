// SPDX-License-Identifier: MIT

//! Job identifier, job-type tag, and the job state machine.

use crate::tenant::TenantId;
use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job instance.
    pub struct JobId("job-");
}

/// Closed set of per-tile inference functions a job can select (spec section
/// "InferenceFn"). Unknown tags are rejected with `Invalid` at job creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    SegmentCells,
    TissueMask,
}

crate::simple_display! {
    JobType {
        SegmentCells => "SEGMENT_CELLS",
        TissueMask => "TISSUE_MASK",
    }
}

impl std::str::FromStr for JobType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEGMENT_CELLS" => Ok(JobType::SegmentCells),
            "TISSUE_MASK" => Ok(JobType::TissueMask),
            _ => Err(()),
        }
    }
}

/// Job lifecycle state (spec section "Job state machine").
///
/// ```text
/// PENDING --admit--> RUNNING --success--> SUCCEEDED
///    |                   |
///    |                   +--failure--> FAILED
///    +--cancel--> CANCELED
///    ^                                       |
///    +---------------- retry ----------------+  (from any terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

crate::simple_display! {
    JobState {
        Pending => "pending",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Canceled => "canceled",
    }
}

impl JobState {
    pub const TERMINAL: [JobState; 3] = [JobState::Succeeded, JobState::Failed, JobState::Canceled];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// States from which `to` is a legal destination, consulted by
    /// `Store::transition` as the static transition table the design notes
    /// ask for (separate from the caller-supplied `from_states` argument,
    /// which must be a subset of this for the call to make sense).
    pub fn legal_sources(to: JobState) -> &'static [JobState] {
        match to {
            JobState::Pending => &[JobState::Succeeded, JobState::Failed, JobState::Canceled],
            JobState::Running => &[JobState::Pending],
            JobState::Succeeded => &[JobState::Running],
            JobState::Failed => &[JobState::Running],
            JobState::Canceled => &[JobState::Pending],
        }
    }
}

/// A single artifact written by the Executor, recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub relative_path: String,
    pub size_bytes: u64,
}

/// `manifest.json` contents (spec section "Executor", step 5). Its existence
/// on disk is the atomicity signal for a SUCCEEDED job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub job_id: JobId,
    pub workflow_id: WorkflowId,
    pub tenant_id: TenantId,
    pub job_type: JobType,
    pub branch: String,
    pub tile_count: u32,
    pub created_at_epoch_ms: u64,
    pub finished_at_epoch_ms: u64,
    pub artifacts: Vec<ArtifactEntry>,
}

/// A job instance (spec section "Data Model: Job").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub workflow_id: WorkflowId,
    /// Copied from the owning workflow at creation time; immutable thereafter.
    pub tenant_id: TenantId,
    /// Opaque reference to the uploaded input file.
    pub file_ref: String,
    pub job_type: JobType,
    /// Free-form; the empty string is a legal distinct branch.
    pub branch: String,
    pub state: JobState,
    /// In `[0, 1]`, monotonic non-decreasing within a single RUNNING episode.
    pub progress: f64,
    pub tiles_done: u32,
    pub tiles_total: u32,
    pub error: Option<String>,
    /// Epoch-ms timestamp of the most recent entry into each state.
    pub state_entered_at: HashMap<JobState, u64>,
    pub manifest: Option<ArtifactManifest>,
}

impl Job {
    pub fn new(
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        file_ref: impl Into<String>,
        job_type: JobType,
        branch: impl Into<String>,
        now_epoch_ms: u64,
    ) -> Self {
        let mut state_entered_at = HashMap::new();
        state_entered_at.insert(JobState::Pending, now_epoch_ms);
        Self {
            id: JobId::new(),
            workflow_id,
            tenant_id,
            file_ref: file_ref.into(),
            job_type,
            branch: branch.into(),
            state: JobState::Pending,
            progress: 0.0,
            tiles_done: 0,
            tiles_total: 0,
            error: None,
            state_entered_at,
            manifest: None,
        }
    }

    /// The (workflow, branch) compound key that all serialization
    /// guarantees are scoped to.
    pub fn branch_key(&self) -> (WorkflowId, String) {
        (self.workflow_id, self.branch.clone())
    }

    /// Apply a legal state transition's side effects (progress/error/tile
    /// reset on RETRY, timestamp bookkeeping). Does not check legality —
    /// callers go through `Store::transition`, which does.
    pub fn enter_state(&mut self, to: JobState, now_epoch_ms: u64) {
        if to == JobState::Pending && self.state.is_terminal() {
            // RETRY: clear progress/error/tile counters.
            self.progress = 0.0;
            self.tiles_done = 0;
            self.tiles_total = 0;
            self.error = None;
            self.manifest = None;
        }
        self.state = to;
        self.state_entered_at.insert(to, now_epoch_ms);
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct JobBuilder => Job {
        into {
            file_ref: String = "upload-1",
            branch: String = "",
            workflow_id: WorkflowId = WorkflowId::new(),
            tenant_id: TenantId = TenantId::from("test-tenant"),
        }
        set {
            job_type: JobType = JobType::TissueMask,
            state: JobState = JobState::Pending,
            progress: f64 = 0.0,
            tiles_done: u32 = 0,
            tiles_total: u32 = 0,
            state_entered_at: HashMap<JobState, u64> = HashMap::new(),
        }
        option {
            error: String = None,
            manifest: ArtifactManifest = None,
        }
        computed {
            id: JobId = JobId::new(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
