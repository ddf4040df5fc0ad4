// SPDX-License-Identifier: MIT

//! The event schema streamed to subscribers (spec section "External
//! Interfaces: Event schema").

use crate::job::Job;
use crate::workflow::{WorkflowAggregate, WorkflowId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Job,
    Workflow,
}

crate::simple_display! {
    EntityKind {
        Job => "job",
        Workflow => "workflow",
    }
}

/// One update published on the [`crate::event::Event::entity_id`]'s stream.
///
/// Ordering is guaranteed per-subscriber and per-entity only (spec section
/// "EventBus").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub state: String,
    pub progress: f64,
    pub tiles_done: u32,
    pub tiles_total: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at_epoch_ms: u64,
}

impl Event {
    pub fn for_job(job: &Job, at_epoch_ms: u64) -> Self {
        Self {
            entity_kind: EntityKind::Job,
            entity_id: job.id.to_string(),
            state: job.state.to_string(),
            progress: job.progress,
            tiles_done: job.tiles_done,
            tiles_total: job.tiles_total,
            reason: job.error.clone(),
            at_epoch_ms,
        }
    }

    pub fn for_workflow(workflow_id: WorkflowId, aggregate: &WorkflowAggregate, at_epoch_ms: u64) -> Self {
        Self {
            entity_kind: EntityKind::Workflow,
            entity_id: workflow_id.to_string(),
            state: aggregate.state.to_string(),
            progress: aggregate.percent_complete,
            tiles_done: 0,
            tiles_total: 0,
            reason: None,
            at_epoch_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobBuilder, JobState};

    #[test]
    fn for_job_carries_job_fields() {
        let job = JobBuilder::default().state(JobState::Running).progress(0.5).tiles_done(3).tiles_total(10).build();
        let ev = Event::for_job(&job, 42);
        assert_eq!(ev.entity_kind, EntityKind::Job);
        assert_eq!(ev.entity_id, job.id.to_string());
        assert_eq!(ev.state, "running");
        assert_eq!(ev.progress, 0.5);
        assert_eq!(ev.tiles_done, 3);
        assert_eq!(ev.tiles_total, 10);
        assert_eq!(ev.at_epoch_ms, 42);
    }

    #[test]
    fn for_job_carries_error_as_reason() {
        let job = JobBuilder::default().state(JobState::Failed).error("boom").build();
        let ev = Event::for_job(&job, 1);
        assert_eq!(ev.reason.as_deref(), Some("boom"));
    }
}
