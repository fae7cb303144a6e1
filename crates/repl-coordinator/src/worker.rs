use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use repl_engine::StorageEngine;
use repl_schemas::{Event, ReplError};
use repl_scheduler::{CommitOrderManager, DependencyScheduler};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::gaq::Gaq;

const MAX_SLAVE_RETRY_PAUSE_SECS: u64 = 60;

pub struct WorkerJob {
    pub group_seq: u64,
    pub event: Event,
    pub is_terminal: bool,
    /// Out-of-band partial-group recovery: roll back whatever the owning
    /// Worker has applied for its current group instead of applying
    /// `event`. Never reserves or touches a GAQ slot, matching the GAQ's
    /// job of tracking only complete primary groups.
    pub synthetic_rollback: bool,
}

pub struct WorkerHandle {
    pub tx: mpsc::Sender<WorkerJob>,
    pub join: tokio::task::JoinHandle<()>,
    /// Jobs sent but not yet fully applied; used for underrun nap and
    /// group-isolation drain waits.
    pub pending: Arc<AtomicUsize>,
}

/// One apply worker: events for groups it owns execute in enqueue order;
/// it reports completion back through the shared GAQ so the Coordinator's
/// checkpoint scan can advance the low-water mark.
pub async fn run_worker<E: StorageEngine + 'static>(
    worker_id: u32,
    mut rx: mpsc::Receiver<WorkerJob>,
    engine: Arc<E>,
    gaq: Arc<Mutex<Gaq>>,
    pending: Arc<AtomicUsize>,
    slave_trans_retries: u32,
) {
    // Events of the group currently being assembled, in enqueue order, so a
    // transient failure can roll back and replay the whole group rather
    // than just the event that failed.
    let mut group_seq: Option<u64> = None;
    let mut group_buffer: Vec<Event> = Vec::new();

    while let Some(job) = rx.recv().await {
        if job.synthetic_rollback {
            if let Err(e) = engine.rollback_group().await {
                warn!(worker_id, error = %e, "synthetic rollback failed");
            }
            group_seq = None;
            group_buffer.clear();
            pending.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        if group_seq != Some(job.group_seq) {
            group_seq = Some(job.group_seq);
            group_buffer.clear();
        }
        group_buffer.push(job.event.clone());

        let result = apply_with_retry(&engine, &group_buffer, slave_trans_retries).await;
        match result {
            Ok(()) => {
                if job.is_terminal {
                    if let Err(e) = engine.commit_group().await {
                        warn!(worker_id, error = %e, "commit_group failed, group left unmarked");
                    } else {
                        gaq.lock().await.mark_done(job.group_seq);
                    }
                    group_seq = None;
                    group_buffer.clear();
                }
            }
            Err(e) => {
                warn!(worker_id, error = %e, "worker could not apply event, group left unmarked");
                group_seq = None;
                group_buffer.clear();
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Apply the newest (last) event of `group_buffer`. On a transient engine
/// error, roll back and replay every buffered event of the group from
/// scratch — the group-level rollback discards effects the earlier events
/// already applied, so retrying only the failing event would drop them.
async fn apply_with_retry<E: StorageEngine>(engine: &Arc<E>, group_buffer: &[Event], slave_trans_retries: u32) -> Result<(), ReplError> {
    let latest = group_buffer.last().expect("caller pushes the new event before calling");
    match engine.apply(latest).await {
        Ok(()) => Ok(()),
        Err(ReplError::EngineTransient { message }) => {
            retry_group(engine, group_buffer, slave_trans_retries, ReplError::EngineTransient { message }).await
        }
        Err(e) => Err(e),
    }
}

async fn retry_group<E: StorageEngine>(
    engine: &Arc<E>,
    group_buffer: &[Event],
    slave_trans_retries: u32,
    first_err: ReplError,
) -> Result<(), ReplError> {
    let mut last_err = first_err;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if attempt > slave_trans_retries {
            return Err(last_err);
        }
        engine.rollback_group().await.ok();
        let pause = attempt.min(MAX_SLAVE_RETRY_PAUSE_SECS as u32);
        warn!(attempt, pause, "transient apply error, replaying buffered group from its start");
        tokio::time::sleep(Duration::from_secs(pause as u64)).await;

        let mut group_failed = None;
        for ev in group_buffer {
            match engine.apply(ev).await {
                Ok(()) => {}
                Err(e @ ReplError::EngineTransient { .. }) => {
                    group_failed = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        match group_failed {
            None => return Ok(()),
            Some(e) => last_err = e,
        }
    }
}

/// DependencyScheduler-mode worker: pulls whichever pending group doesn't
/// conflict with one already in flight, applies it end to end, then
/// releases its keys so a conflicting group can be taken. The GAQ here
/// exists purely for checkpoint bookkeeping — the Coordinator pairs one
/// `gaq.reserve` with one `scheduler.enqueue` per dispatched group in
/// strict sequence, so the group's scheduler id and its GAQ seq always
/// coincide.
pub async fn run_dependency_worker<E: StorageEngine + 'static>(
    worker_id: u32,
    scheduler: Arc<DependencyScheduler>,
    gaq: Arc<Mutex<Gaq>>,
    engine: Arc<E>,
    commit_order: Option<Arc<CommitOrderManager>>,
    slave_trans_retries: u32,
) {
    while let Some(group) = scheduler.take().await {
        match apply_group_sequential(&engine, &group.events, slave_trans_retries).await {
            Ok(()) => {
                if let Some(mgr) = &commit_order {
                    mgr.wait_turn(group.id).await;
                }
                if let Err(e) = engine.commit_group().await {
                    warn!(worker_id, error = %e, "dependency worker commit_group failed, group left unmarked");
                } else {
                    gaq.lock().await.mark_done(group.id);
                }
                if let Some(mgr) = &commit_order {
                    mgr.advance().await;
                }
            }
            Err(e) => {
                warn!(worker_id, error = %e, "dependency worker could not apply group");
            }
        }
        scheduler.complete(group.id).await;
    }
}

/// Apply every event of `group_events` in order. On a transient failure
/// partway through, roll back and replay everything applied so far (plus
/// the failing event) from scratch before continuing — same rationale as
/// the GAQ-mode Worker's `retry_group`.
async fn apply_group_sequential<E: StorageEngine>(engine: &Arc<E>, group_events: &[Event], slave_trans_retries: u32) -> Result<(), ReplError> {
    let mut idx = 0;
    while idx < group_events.len() {
        match engine.apply(&group_events[idx]).await {
            Ok(()) => idx += 1,
            Err(ReplError::EngineTransient { message }) => {
                retry_group(engine, &group_events[..=idx], slave_trans_retries, ReplError::EngineTransient { message }).await?;
                idx += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
