// SPDX-License-Identifier: MIT

//! Workspace-level integration specs: the store, event bus, scheduler, and
//! executor wired together as they would be in a real process, covering the
//! concrete end-to-end scenarios and universal invariants from the
//! specification's "Testable properties" section.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wsi_core::{Config, FakeClock, JobState, TenantId};
use wsi_executor::Executor;
use wsi_scheduler::Scheduler;
use wsi_store::Store;

fn rig(max_workers: u32, max_active_users: u32, max_jobs_per_workflow: u32, results_dir: &std::path::Path) -> (Arc<Store<FakeClock>>, Arc<Scheduler<FakeClock>>, Executor<FakeClock>) {
    let store = Arc::new(Store::with_clock(FakeClock::new(), max_jobs_per_workflow));
    let scheduler = Arc::new(Scheduler::new(store.clone(), max_workers, max_active_users));
    let config = Arc::new(Config { results_dir: results_dir.to_path_buf(), tile_size: 48, tile_overlap: 8, ..Config::default() });
    let executor = Executor::new(scheduler.clone(), config);
    (store, scheduler, executor)
}

fn source_image() -> image::DynamicImage {
    image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(120, 90, |x, y| image::Rgb([(x * 2) as u8, (y * 2) as u8, 128])))
}

/// Run a single admitted job synchronously to completion, feeding whatever
/// it unblocks back through the scheduler so the whole branch/queue drains —
/// mirrors the wave-based dispatch a real server's worker pool would do.
fn drain(executor: &Executor<FakeClock>, admitted: Vec<wsi_core::Job>, token: &CancellationToken) {
    let mut frontier = admitted;
    while let Some(job) = frontier.pop() {
        let image = source_image();
        let next = executor.run(&job, &image, token);
        frontier.extend(next);
    }
}

#[test]
fn branch_serialization_runs_one_job_at_a_time_and_completes_in_fifo_order() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(4, 4, 10, dir.path());
    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let token = CancellationToken::new();

    let mut job_ids = Vec::new();
    let mut frontier = Vec::new();
    for _ in 0..3 {
        let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();
        job_ids.push(job.id);
        frontier.extend(scheduler.start(&tenant, job.id).unwrap());
    }
    // Branch seriality: only the first of the three is admitted up front.
    assert_eq!(frontier.len(), 1);
    assert_eq!(frontier[0].id, job_ids[0]);

    drain(&executor, frontier, &token);

    let jobs: Vec<_> = job_ids.iter().map(|id| store.get_job(&tenant, *id).unwrap()).collect();
    assert!(jobs.iter().all(|j| j.state == JobState::Succeeded));
    // Completion order must match RUNNING order, which matches FIFO arrival
    // on a serialized branch.
    let completed_order: Vec<_> = jobs.iter().map(|j| j.state_entered_at[&JobState::Succeeded]).collect();
    assert!(completed_order.windows(2).all(|w| w[0] <= w[1]));

    let (_, aggregate) = store.get_workflow(&tenant, wf.id).unwrap();
    assert_eq!(aggregate.percent_complete, 1.0);
    assert_eq!(aggregate.succeeded, 3);
}

#[test]
fn cross_branch_jobs_admit_simultaneously_and_workflow_progress_is_their_union() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(4, 4, 10, dir.path());
    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let token = CancellationToken::new();

    let mut frontier = Vec::new();
    let mut job_ids = Vec::new();
    for branch in ["A", "B", "C"] {
        let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", branch).unwrap();
        job_ids.push(job.id);
        frontier.extend(scheduler.start(&tenant, job.id).unwrap());
    }
    assert_eq!(frontier.len(), 3, "independent branches must all admit at once");

    drain(&executor, frontier, &token);

    for id in job_ids {
        assert_eq!(store.get_job(&tenant, id).unwrap().state, JobState::Succeeded);
    }
    let (_, aggregate) = store.get_workflow(&tenant, wf.id).unwrap();
    assert_eq!(aggregate.percent_complete, 1.0);
}

#[test]
fn active_tenant_cap_blocks_the_fourth_tenant_until_a_slot_frees_then_it_runs_to_succeeded() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(8, 3, 10, dir.path());
    let token = CancellationToken::new();

    let mut frontier = Vec::new();
    let mut per_tenant = Vec::new();
    for n in 1..=4 {
        let tenant: TenantId = format!("u{n}").into();
        let wf = store.create_workflow(tenant.clone(), "w");
        let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "only").unwrap();
        let admitted = scheduler.start(&tenant, job.id).unwrap();
        frontier.extend(admitted);
        per_tenant.push((tenant, job.id));
    }
    assert_eq!(frontier.len(), 3, "only MAX_ACTIVE_USERS jobs admit up front");

    let (fourth_tenant, fourth_job) = &per_tenant[3];
    let status = scheduler.queue_status(fourth_tenant, *fourth_job).unwrap();
    assert!(status.queued);
    assert!(status.waiting_for.contains(&wsi_scheduler::Reason::UserSlot));
    assert_eq!(store.get_job(fourth_tenant, *fourth_job).unwrap().state, JobState::Pending);

    drain(&executor, frontier, &token);

    // Releasing any of the first three tenants must have let the fourth in,
    // and it must have run all the way to a terminal state.
    let fourth_final = store.get_job(fourth_tenant, *fourth_job).unwrap();
    assert_eq!(fourth_final.state, JobState::Succeeded);
}

#[test]
fn cancel_then_retry_round_trips_through_pending_and_eventually_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(1, 1, 10, dir.path());
    let token = CancellationToken::new();

    let blocker_tenant: TenantId = "blocker".into();
    let blocker_wf = store.create_workflow(blocker_tenant.clone(), "w0");
    let blocker = store.create_job(&blocker_tenant, blocker_wf.id, "f", "TISSUE_MASK", "X").unwrap();
    let blocker_wave = scheduler.start(&blocker_tenant, blocker.id).unwrap();
    assert_eq!(blocker_wave.len(), 1);

    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();
    let admitted = scheduler.start(&tenant, job.id).unwrap();
    assert!(admitted.is_empty(), "blocked by the active-tenant cap");

    let canceled = scheduler.cancel(&tenant, job.id).unwrap();
    assert_eq!(canceled.state, JobState::Canceled);

    let reenqueued = scheduler.retry(&tenant, job.id).unwrap();
    assert!(reenqueued.is_empty(), "still blocked; retry only re-enqueues at the FIFO tail");
    assert_eq!(store.get_job(&tenant, job.id).unwrap().state, JobState::Pending);

    drain(&executor, blocker_wave, &token);

    assert_eq!(store.get_job(&tenant, job.id).unwrap().state, JobState::Succeeded);
}

#[test]
fn cancel_is_rejected_once_admitted_and_the_job_still_reaches_a_terminal_state() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(1, 1, 10, dir.path());
    let token = CancellationToken::new();
    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();

    let admitted = scheduler.start(&tenant, job.id).unwrap();
    assert_eq!(admitted.len(), 1);

    let err = scheduler.cancel(&tenant, job.id).unwrap_err();
    assert_eq!(err.kind, wsi_core::Kind::Conflict);

    drain(&executor, admitted, &token);
    assert_eq!(store.get_job(&tenant, job.id).unwrap().state, JobState::Succeeded);
}

#[test]
fn workflow_cap_rejects_the_eleventh_job_after_ten_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(4, 4, 10, dir.path());
    let token = CancellationToken::new();
    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");

    for n in 0..10 {
        let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", format!("branch-{n}")).unwrap();
        let admitted = scheduler.start(&tenant, job.id).unwrap();
        drain(&executor, admitted, &token);
    }

    let err = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "overflow").unwrap_err();
    assert_eq!(err.kind, wsi_core::Kind::LimitExceeded);

    let (workflow, aggregate) = store.get_workflow(&tenant, wf.id).unwrap();
    assert_eq!(workflow.job_ids.len(), 10);
    assert_eq!(aggregate.succeeded, 10);
}

#[test]
fn retry_of_a_succeeded_job_resets_progress_and_clears_the_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(2, 2, 10, dir.path());
    let token = CancellationToken::new();
    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();

    let admitted = scheduler.start(&tenant, job.id).unwrap();
    drain(&executor, admitted, &token);
    let succeeded = store.get_job(&tenant, job.id).unwrap();
    assert_eq!(succeeded.state, JobState::Succeeded);
    assert_eq!(succeeded.progress, 1.0);
    assert!(succeeded.manifest.is_some());

    scheduler.retry(&tenant, job.id).unwrap();
    let retried = store.get_job(&tenant, job.id).unwrap();
    assert_eq!(retried.state, JobState::Pending);
    assert_eq!(retried.progress, 0.0);
    assert_eq!(retried.tiles_done, 0);
    assert!(retried.manifest.is_none());
}

#[test]
fn two_concurrent_cancels_of_the_same_pending_job_only_one_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, _executor) = rig(1, 1, 10, dir.path());

    let blocker_tenant: TenantId = "blocker".into();
    let blocker_wf = store.create_workflow(blocker_tenant.clone(), "w0");
    let blocker = store.create_job(&blocker_tenant, blocker_wf.id, "f", "TISSUE_MASK", "X").unwrap();
    scheduler.start(&blocker_tenant, blocker.id).unwrap();

    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();
    scheduler.start(&tenant, job.id).unwrap();
    assert_eq!(store.get_job(&tenant, job.id).unwrap().state, JobState::Pending);

    let scheduler_a = scheduler.clone();
    let scheduler_b = scheduler.clone();
    let tenant_a = tenant.clone();
    let tenant_b = tenant.clone();
    let job_id = job.id;

    let a = std::thread::spawn(move || scheduler_a.cancel(&tenant_a, job_id));
    let b = std::thread::spawn(move || scheduler_b.cancel(&tenant_b, job_id));
    let results = [a.join().unwrap(), b.join().unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results.iter().filter(|r| matches!(r, Err(e) if e.kind == wsi_core::Kind::Conflict)).count();
    assert_eq!(successes, 1, "exactly one cancel call should succeed");
    assert_eq!(conflicts, 1, "the other must fail with CONFLICT");
    assert_eq!(store.get_job(&tenant, job.id).unwrap().state, JobState::Canceled);
}

#[tokio::test]
async fn job_subscriber_observes_monotonic_progress_then_the_terminal_event_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(1, 1, 10, dir.path());
    let token = CancellationToken::new();
    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let job = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();

    let mut sub = store.subscribe(&job.id.to_string());
    let admitted = scheduler.start(&tenant, job.id).unwrap();
    drain(&executor, admitted, &token);

    let mut last_progress = -1.0;
    let mut saw_succeeded = false;
    while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(200), sub.recv()).await {
        assert!(event.progress >= last_progress, "progress must never regress for one subscriber");
        last_progress = event.progress;
        if event.state == "succeeded" {
            saw_succeeded = true;
            break;
        }
    }
    assert!(saw_succeeded, "subscriber must observe the terminal transition");
}

#[test]
fn a_failed_job_releases_its_branch_for_the_next_job_in_line() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, executor) = rig(1, 1, 10, dir.path());
    let tenant: TenantId = "u1".into();
    let wf = store.create_workflow(tenant.clone(), "w1");
    let doomed = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();
    let next = store.create_job(&tenant, wf.id, "f", "TISSUE_MASK", "A").unwrap();

    let admitted = scheduler.start(&tenant, doomed.id).unwrap();
    assert_eq!(admitted.len(), 1);
    scheduler.start(&tenant, next.id).unwrap();

    // An already-cancelled token fails the running job before any tile
    // completes, without the branch being stuck.
    let cancelled_token = CancellationToken::new();
    cancelled_token.cancel();
    let released = executor.run(&admitted[0], &source_image(), &cancelled_token);

    assert_eq!(store.get_job(&tenant, doomed.id).unwrap().state, JobState::Failed);
    assert_eq!(released.len(), 1, "the failed job's branch slot must free the next job");
    assert_eq!(released[0].id, next.id);
}
