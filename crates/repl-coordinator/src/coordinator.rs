use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use repl_engine::StorageEngine;
use repl_relaylog::{RelayLog, RelayLogReader};
use repl_schemas::{ApplierState, Coordinate, ErrorEvent, Event, EventPayload, ReplError, RunningState, UntilCondition};
use repl_scheduler::{group_keys, CommitOrderManager, DependencyScheduler, SchedulerConfig};
use repl_store::{PersistedState, PositionStore, WorkerRecord};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::gaq::Gaq;
use crate::partitioning::{choose_worker, GroupDbTracker, PartitionMode};
use crate::recovery::{bit_is_set, merge_worker_bitmaps};
use crate::worker::{run_dependency_worker, run_worker, WorkerHandle, WorkerJob};

pub struct CoordinatorConfig {
    pub workers: u32,
    pub checkpoint_group: u32,
    pub checkpoint_period: Duration,
    pub queue_len_max: u32,
    pub underrun_level: u32,
    pub coordinator_basic_nap: Duration,
    pub partition_mode: PartitionMode,
    pub slave_trans_retries: u32,
    pub stop_wait_timeout: Duration,
    /// This replica's own server id, used to recognize a non-initial
    /// `FormatDescription` replayed by the primary (`server_id` differs
    /// from this) as a partial-group recovery boundary rather than an
    /// ordinary restart boundary.
    pub self_server_id: u32,
    /// `> 0` enables startup recovery: merge every persisted worker's
    /// bitmap and skip groups some worker already committed before the
    /// crash. See `Coordinator::prime_recovery`.
    pub recovery_parallel_workers: u32,
    /// `Some` selects the `DependencyScheduler` MT mode (4.7) instead of
    /// the fixed-partition GAQ/Worker-pool mode (4.6).
    pub dependency_scheduler: Option<SchedulerConfig>,
}

/// Multi-threaded apply: events inside one transaction group are buffered
/// until the group's terminal (`Xid`) event arrives, then the whole group
/// is handed to one worker in order. Maintenance events (format
/// description, heartbeat, previous-gtids, rotate) never belong to a group
/// and are applied by the coordinator itself between groups.
pub struct Coordinator<E: StorageEngine + 'static> {
    pub state: ApplierState,
    relay: Arc<RelayLog>,
    engine: Arc<E>,
    positions: PositionStore,
    config: CoordinatorConfig,
    gaq: Arc<Mutex<Gaq>>,
    workers: Vec<WorkerHandle>,
    scheduler: Option<Arc<DependencyScheduler>>,
    commit_order: Option<Arc<CommitOrderManager>>,
    dependency_joins: Vec<tokio::task::JoinHandle<()>>,
    max_keys_per_group: u32,
    db_tracker: GroupDbTracker,
    group_active: bool,
    group_buffer: Vec<(Event, Coordinate)>,
    current_group_gtid: Option<repl_schemas::Gtid>,
    since_checkpoint: u32,
    /// Set by `prime_recovery`: which not-yet-checkpointed groups some
    /// worker already committed before a crash, and how far dispatch has
    /// walked through it. Cleared once exhausted.
    recovery_bitmap: Option<Vec<u8>>,
    recovery_slot: usize,
}

impl<E: StorageEngine + 'static> Coordinator<E> {
    pub fn new(state: ApplierState, relay: Arc<RelayLog>, engine: Arc<E>, positions: PositionStore, mut config: CoordinatorConfig) -> Self {
        let capacity = config.checkpoint_group.max(1) as usize;
        let gaq = Arc::new(Mutex::new(Gaq::new(capacity)));
        let dependency_scheduler_config = config.dependency_scheduler.take();

        let (workers, scheduler, commit_order, dependency_joins, max_keys_per_group) = match dependency_scheduler_config {
            Some(sched_config) => {
                let order_commits = sched_config.order_commits;
                let max_keys = sched_config.max_keys_per_group;
                let scheduler = Arc::new(DependencyScheduler::new(sched_config));
                let commit_order = order_commits.then(|| Arc::new(CommitOrderManager::new(0)));
                let mut joins = Vec::with_capacity(config.workers.max(1) as usize);
                for id in 0..config.workers.max(1) {
                    joins.push(tokio::spawn(run_dependency_worker(
                        id,
                        scheduler.clone(),
                        gaq.clone(),
                        engine.clone(),
                        commit_order.clone(),
                        config.slave_trans_retries,
                    )));
                }
                (Vec::new(), Some(scheduler), commit_order, joins, max_keys)
            }
            None => {
                let mut workers = Vec::with_capacity(config.workers.max(1) as usize);
                for id in 0..config.workers.max(1) {
                    let (tx, rx) = mpsc::channel(config.queue_len_max.max(1) as usize);
                    let pending = Arc::new(AtomicUsize::new(0));
                    let join = tokio::spawn(run_worker(id, rx, engine.clone(), gaq.clone(), pending.clone(), config.slave_trans_retries));
                    workers.push(WorkerHandle { tx, join, pending });
                }
                (workers, None, None, Vec::new(), 0)
            }
        };

        Self {
            state,
            relay,
            engine,
            positions,
            config,
            gaq,
            workers,
            scheduler,
            commit_order,
            dependency_joins,
            max_keys_per_group,
            db_tracker: GroupDbTracker::default(),
            group_active: false,
            group_buffer: Vec::new(),
            current_group_gtid: None,
            since_checkpoint: 0,
            recovery_bitmap: None,
            recovery_slot: 0,
        }
    }

    /// Startup recovery (spec 4.6, "Recovery at startup"): when
    /// `recovery_parallel_workers > 0`, merge every persisted worker's
    /// bitmap into one recovery bitmap of groups some worker already
    /// committed before the crash and switch into `UNTIL_SQL_AFTER_MTS_GAPS`
    /// so `dispatch_group` skips them, replaying only the gaps. A no-op in
    /// dependency-scheduler mode, which has no fixed per-worker assignment
    /// to recover a bitmap against. Call before `run`.
    pub fn prime_recovery(&mut self, persisted_workers: &[WorkerRecord]) {
        if self.config.recovery_parallel_workers == 0 || self.scheduler.is_some() {
            return;
        }
        let bitmap = merge_worker_bitmaps(persisted_workers);
        if bitmap.is_empty() {
            return;
        }
        info!(bits = bitmap.len() * 8, "entering UNTIL_SQL_AFTER_MTS_GAPS recovery, skipping already-committed groups");
        self.recovery_bitmap = Some(bitmap);
        self.recovery_slot = 0;
        self.state.until_condition = UntilCondition::SqlAfterMtsGaps;
    }

    fn until_satisfied(&self, event: &Event, event_coord: &Coordinate) -> bool {
        match &self.state.until_condition {
            UntilCondition::None | UntilCondition::Done => false,
            UntilCondition::MasterPos(target) => matches!(
                event.coordinate.compare_total_order(target),
                Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
            ),
            UntilCondition::RelayPos(target) => matches!(
                event_coord.compare_total_order(target),
                Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
            ),
            UntilCondition::SqlBeforeGtids(set) => event.gtid().map(|g| set.contains(&g)).unwrap_or(false),
            // Checked in `maybe_checkpoint` instead, once the GAQ low-water
            // mark actually advances logged_gtids past the target set.
            UntilCondition::SqlAfterGtids(_) => false,
            UntilCondition::SqlAfterMtsGaps => false,
        }
    }

    fn sql_after_gtids_satisfied(&self) -> bool {
        match &self.state.until_condition {
            UntilCondition::SqlAfterGtids(set) => !set.is_empty() && set.iter().all(|g| self.state.logged_gtids.contains(&g)),
            _ => false,
        }
    }

    async fn sleep_to_enforce_delay(&self, event_ts: chrono::DateTime<Utc>) {
        if self.state.sql_delay_secs == 0 {
            return;
        }
        let target = event_ts + chrono::Duration::seconds(self.state.sql_delay_secs as i64);
        let now = Utc::now();
        if target > now {
            let dur = (target - now).to_std().unwrap_or_default();
            tokio::time::sleep(dur).await;
        }
    }

    async fn drain_workers(&self, worker_ids: &[u32]) {
        loop {
            let drained = worker_ids.iter().all(|&w| self.workers[w as usize].pending.load(Ordering::SeqCst) == 0);
            if drained {
                return;
            }
            tokio::time::sleep(self.config.coordinator_basic_nap).await;
        }
    }

    /// Hand the buffered group to one worker. `group_isolated`: a group
    /// touching more than one database waits for every worker it touches
    /// to fully drain first, so it can never race a still-applying group
    /// on one of those same databases.
    ///
    /// While `recovery_bitmap` is set, every call instead consults the next
    /// bit: a set bit means some worker already committed this group
    /// before the crash, so it's skipped (bookkeeping only, no apply);
    /// once the bitmap runs out the Coordinator returns to normal MT
    /// operation.
    async fn dispatch_group(&mut self) -> anyhow::Result<()> {
        if self.group_buffer.is_empty() {
            return Ok(());
        }
        if let Some(scheduler) = self.scheduler.clone() {
            return self.dispatch_group_dependency(&scheduler).await;
        }

        let worker_count = self.workers.len() as u32;
        let target = if self.db_tracker.is_multi_db() {
            let touched = self.db_tracker.workers_touched(worker_count);
            self.drain_workers(&touched).await;
            touched[0]
        } else {
            let representative = &self.group_buffer[0].0;
            choose_worker(self.config.partition_mode, representative, worker_count, true).unwrap_or(0)
        };

        let (last_event, last_relay_coord) = self.group_buffer.last().cloned().expect("checked nonempty above");

        let already_committed = self.recovery_bitmap.as_ref().is_some_and(|bm| bit_is_set(bm, self.recovery_slot));
        if let Some(bitmap) = &self.recovery_bitmap {
            self.recovery_slot += 1;
            if self.recovery_slot >= bitmap.len() * 8 {
                info!("recovery bitmap exhausted, resuming normal MT operation");
                self.recovery_bitmap = None;
                self.recovery_slot = 0;
                self.state.until_condition = UntilCondition::None;
            }
        }

        if already_committed {
            warn!(gtid = ?self.current_group_gtid, "skipping group already committed by some worker before the crash");
            self.group_buffer.clear();
            self.state.event_relay_coord = last_relay_coord.clone();
            self.state.group_master_coord = last_event.coordinate;
            self.state.group_relay_coord = last_relay_coord;
            if let Some(g) = self.current_group_gtid.take() {
                self.state.logged_gtids.add(g);
            }
            self.db_tracker.reset();
            return Ok(());
        }

        let gaq_seq = {
            let gtid = self.current_group_gtid;
            loop {
                let mut gaq = self.gaq.lock().await;
                if let Some(seq) = gaq.reserve(
                    last_event.coordinate.clone(),
                    last_relay_coord.clone(),
                    Utc::now(),
                    target,
                    gtid,
                ) {
                    break seq;
                }
                drop(gaq);
                tokio::time::sleep(self.config.coordinator_basic_nap).await;
            }
        };

        let total = self.group_buffer.len();
        for (idx, (event, _coord)) in std::mem::take(&mut self.group_buffer).into_iter().enumerate() {
            let job = WorkerJob {
                group_seq: gaq_seq,
                event,
                is_terminal: idx + 1 == total,
                synthetic_rollback: false,
            };
            self.workers[target as usize].pending.fetch_add(1, Ordering::SeqCst);
            self.workers[target as usize]
                .tx
                .send(job)
                .await
                .map_err(|_| anyhow::anyhow!("worker {target} channel closed"))?;
        }

        self.state.event_relay_coord = last_relay_coord;
        self.current_group_gtid = None;
        self.db_tracker.reset();
        self.since_checkpoint += 1;
        self.maybe_checkpoint(false).await
    }

    /// DependencyScheduler-mode dispatch: reserve a GAQ slot purely for
    /// checkpoint bookkeeping and enqueue the group's key-conflict set and
    /// events into the shared scheduler FIFO, in that strict order so the
    /// GAQ seq and the scheduler's group id always coincide (both are
    /// assigned sequentially from 0 by a single caller).
    async fn dispatch_group_dependency(&mut self, scheduler: &Arc<DependencyScheduler>) -> anyhow::Result<()> {
        let buffered = std::mem::take(&mut self.group_buffer);
        let (last_master_coord, last_relay_coord) = {
            let (event, coord) = buffered.last().expect("checked nonempty by caller");
            (event.coordinate.clone(), coord.clone())
        };
        let gtid = self.current_group_gtid.take();
        let events: Vec<Event> = buffered.into_iter().map(|(e, _)| e).collect();
        let keys = group_keys(&events, self.max_keys_per_group);

        let gaq_seq = loop {
            let mut gaq = self.gaq.lock().await;
            if let Some(seq) = gaq.reserve(last_master_coord.clone(), last_relay_coord.clone(), Utc::now(), 0, gtid) {
                break seq;
            }
            drop(gaq);
            tokio::time::sleep(self.config.coordinator_basic_nap).await;
        };
        let enqueued_id = scheduler.enqueue(keys, events).await;
        debug_assert_eq!(enqueued_id, gaq_seq, "gaq reservation and scheduler enqueue must stay in lockstep");

        self.state.event_relay_coord = last_relay_coord;
        self.db_tracker.reset();
        self.since_checkpoint += 1;
        self.maybe_checkpoint(false).await
    }

    /// Send the owning Worker (or, for a multi-db group, every Worker it
    /// touches) a synthetic rollback job out of band of the normal GAQ
    /// dispatch path, then discard the Coordinator's own buffer of the
    /// partial group. Not applicable in dependency-scheduler mode: a group
    /// there isn't handed to a Worker until it's pulled whole off the
    /// FIFO, so there is never partial per-Worker state to undo.
    async fn inject_synthetic_rollback(&mut self) -> anyhow::Result<()> {
        let Some((representative, _)) = self.group_buffer.first().cloned() else {
            self.group_buffer.clear();
            self.db_tracker.reset();
            return Ok(());
        };
        let worker_count = self.workers.len() as u32;
        if worker_count == 0 {
            warn!("partial group detected under dependency-scheduler mode, discarding buffered group without a per-worker rollback");
            self.group_buffer.clear();
            self.db_tracker.reset();
            return Ok(());
        }

        let targets = if self.db_tracker.is_multi_db() {
            self.db_tracker.workers_touched(worker_count)
        } else {
            vec![choose_worker(self.config.partition_mode, &representative, worker_count, true).unwrap_or(0)]
        };

        for &target in &targets {
            let job = WorkerJob {
                group_seq: 0,
                event: representative.clone(),
                is_terminal: false,
                synthetic_rollback: true,
            };
            self.workers[target as usize].pending.fetch_add(1, Ordering::SeqCst);
            self.workers[target as usize]
                .tx
                .send(job)
                .await
                .map_err(|_| anyhow::anyhow!("worker {target} channel closed"))?;
        }
        warn!(targets = targets.len(), "partial group detected, injected synthetic rollback into the owning worker(s)");
        self.group_buffer.clear();
        self.db_tracker.reset();
        Ok(())
    }

    async fn maybe_checkpoint(&mut self, force: bool) -> anyhow::Result<()> {
        if !force && self.since_checkpoint < self.config.checkpoint_group {
            return Ok(());
        }
        self.since_checkpoint = 0;
        let popped = self.gaq.lock().await.checkpoint();
        if popped.is_empty() && !force {
            return Ok(());
        }
        for (master_coord, relay_coord, gtid) in popped {
            self.state.group_master_coord = master_coord;
            self.state.group_relay_coord = relay_coord;
            if let Some(g) = gtid {
                self.state.logged_gtids.add(g);
            }
        }
        if self.sql_after_gtids_satisfied() {
            self.state.until_condition = UntilCondition::Done;
            self.state.running = RunningState::Stopping;
        }
        self.flush_position(force).await
    }

    async fn flush_position(&mut self, force: bool) -> anyhow::Result<()> {
        let mut persisted = PersistedState::new(self.state.group_master_coord.clone(), self.state.group_relay_coord.clone());
        persisted.retrieved_gtids_text = self.state.retrieved_gtids.encode_text();
        persisted.logged_gtids_text = self.state.logged_gtids.encode_text();
        let bitmaps = self.gaq.lock().await.worker_bitmaps(self.config.workers.max(1));
        for id in 0..self.config.workers.max(1) {
            let mut w = WorkerRecord::new(id);
            w.last_committed_group_master_coord = self.state.group_master_coord.clone();
            w.last_committed_group_relay_coord = self.state.group_relay_coord.clone();
            if let Some(bitmap) = bitmaps.get(&id) {
                w.executed_group_bitmap = bitmap.clone();
            }
            persisted.workers.push(w);
        }
        self.positions.save(&persisted, force).await
    }

    async fn stop_workers(&mut self) {
        if let Some(scheduler) = &self.scheduler {
            let (discarded, in_flight) = scheduler.stop_discard_pending().await;
            if !discarded.is_empty() {
                warn!(count = discarded.len(), "discarded pending dependency-scheduler groups on stop");
            }
            if !in_flight.is_empty() {
                warn!(count = in_flight.len(), "dependency-scheduler groups still in flight on stop, letting their workers finish applying");
            }
        }
        for w in self.workers.drain(..) {
            drop(w.tx);
            if tokio::time::timeout(self.config.stop_wait_timeout, w.join).await.is_err() {
                warn!("worker did not stop within stop_wait_timeout");
            }
        }
        for join in self.dependency_joins.drain(..) {
            if tokio::time::timeout(self.config.stop_wait_timeout, join).await.is_err() {
                warn!("dependency worker did not stop within stop_wait_timeout");
            }
        }
    }

    /// Drive the dispatch loop against `reader` until `abort_requested`,
    /// the UNTIL condition is satisfied, or a fatal error occurs.
    pub async fn run(&mut self, reader: &mut RelayLogReader) -> anyhow::Result<()> {
        info!(workers = self.workers.len(), "coordinator starting");
        let result = self.run_inner(reader).await;
        self.stop_workers().await;
        if let Err(e) = &result {
            self.state.error = Some(ErrorEvent {
                code: None,
                message: e.to_string(),
                timestamp: Utc::now(),
            });
            self.state.running = RunningState::Stopped;
            self.flush_position(true).await?;
            return result;
        }
        self.maybe_checkpoint(true).await?;
        Ok(())
    }

    async fn run_inner(&mut self, reader: &mut RelayLogReader) -> anyhow::Result<()> {
        loop {
            if self.state.abort_requested || matches!(self.state.until_condition, UntilCondition::Done) {
                break;
            }

            let event = match self.relay.read_next(reader).await? {
                Some(e) => e,
                None => {
                    self.relay.wait_for_data().await;
                    continue;
                }
            };
            let event_coord = reader.coordinate();

            if self.until_satisfied(&event, &event_coord) {
                self.state.until_condition = UntilCondition::Done;
                self.state.running = RunningState::Stopping;
                break;
            }

            if !matches!(event.payload, EventPayload::FormatDescription { .. }) {
                self.sleep_to_enforce_delay(event.timestamp).await;
            }

            if !self.group_active && self.state.slave_skip_counter > 0 {
                self.state.slave_skip_counter -= 1;
                self.state.event_relay_coord = event_coord;
                continue;
            }

            match &event.payload {
                EventPayload::FormatDescription { .. }
                | EventPayload::Heartbeat { .. }
                | EventPayload::PreviousGtids
                | EventPayload::Rotate { .. } => {
                    // Partial-group recovery: a non-initial FormatDescription
                    // from a differing server_id at a nonzero log position,
                    // arriving while a group is mid-flight, means the primary
                    // reconnected and is about to replay that group from its
                    // start. Undo the partial state in the Worker that owns
                    // it instead of silently discarding and re-dispatching
                    // on top of whatever it already applied.
                    let is_partial_group_recovery = matches!(event.payload, EventPayload::FormatDescription { .. })
                        && event.server_id != self.config.self_server_id
                        && event_coord.offset != 0
                        && self.group_active
                        && self.current_group_gtid.is_some();

                    if is_partial_group_recovery {
                        self.inject_synthetic_rollback().await?;
                    } else if self.group_active {
                        warn!(
                            file = %event_coord.file_name,
                            "restart boundary mid-group, discarding incomplete group"
                        );
                        self.group_buffer.clear();
                        self.db_tracker.reset();
                    }
                    self.group_active = false;
                    self.current_group_gtid = None;
                    self.engine.apply(&event).await.map_err(|e| anyhow::anyhow!(e))?;
                    self.state.event_relay_coord = event_coord;
                    self.state.last_applied_timestamp = Some(event.timestamp);
                }
                _ => {
                    if !self.group_active {
                        self.group_active = true;
                        self.group_buffer.clear();
                        self.db_tracker.reset();
                        self.state.group_relay_coord = event_coord.clone();
                    }
                    if let Some(g) = event.gtid() {
                        self.current_group_gtid = Some(g);
                    }
                    self.db_tracker.observe(&event);
                    self.group_buffer.push((event.clone(), event_coord.clone()));
                    self.state.event_relay_coord = event_coord;
                    self.state.last_applied_timestamp = Some(event.timestamp);

                    if event.is_commit_class() {
                        self.dispatch_group().await?;
                        self.group_active = false;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use repl_schemas::{ChecksumAlg, Coordinate as Coord, EventPayload as Payload};
    use repl_store::FileBacking;
    use std::sync::atomic::AtomicUsize as AU;
    use uuid::Uuid;

    struct CountingEngine {
        applied: AU,
        committed: AU,
    }

    #[async_trait]
    impl StorageEngine for CountingEngine {
        async fn apply(&self, _event: &Event) -> Result<(), ReplError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn commit_group(&self) -> Result<(), ReplError> {
            self.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn base_event(offset: u64, payload: Payload) -> Event {
        Event {
            server_id: 1,
            timestamp: Utc::now(),
            coordinate: Coord::new("mysql-bin.000001".into(), offset),
            payload_len: 0,
            payload,
            checksum: None,
        }
    }

    async fn setup(worker_count: u32) -> (Coordinator<CountingEngine>, Arc<RelayLog>, tempfile::TempDir, Arc<CountingEngine>) {
        let dir = tempfile::tempdir().unwrap();
        let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
        let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("position.json"))));
        let header = relay.current_write_coordinate().await.unwrap();
        let state = ApplierState::new(header);
        let engine = Arc::new(CountingEngine {
            applied: AU::new(0),
            committed: AU::new(0),
        });
        let config = CoordinatorConfig {
            workers: worker_count,
            checkpoint_group: 8,
            checkpoint_period: Duration::from_millis(50),
            queue_len_max: 64,
            underrun_level: 2,
            coordinator_basic_nap: Duration::from_millis(5),
            partition_mode: PartitionMode::DatabaseKey,
            slave_trans_retries: 2,
            stop_wait_timeout: Duration::from_secs(5),
            self_server_id: 1,
            recovery_parallel_workers: 0,
            dependency_scheduler: None,
        };
        let coord = Coordinator::new(state, relay.clone(), engine.clone(), positions, config);
        (coord, relay, dir, engine)
    }

    #[tokio::test]
    async fn single_db_group_dispatches_to_one_worker_and_commits() {
        let (mut coordinator, relay, _dir, engine) = setup(2).await;
        let header = coordinator.state.group_relay_coord.clone();

        let gtid = repl_schemas::Gtid::new(Uuid::from_bytes([9; 16]), 1);
        relay.append(&base_event(4, Payload::Gtid { gtid })).await.unwrap();
        relay
            .append(&base_event(
                8,
                Payload::Opaque {
                    statement_or_rows: vec![1, 2, 3],
                    db: Some("orders".into()),
                },
            ))
            .await
            .unwrap();
        relay.append(&base_event(12, Payload::Xid { xid: 1 })).await.unwrap();

        let mut reader = relay.open_for_read(header).await.unwrap();
        coordinator.state.abort_requested = false;

        for _ in 0..3 {
            let event = relay.read_next(&mut reader).await.unwrap().unwrap();
            let coord = reader.coordinate();
            if let Payload::FormatDescription { .. } = event.payload {
                continue;
            }
            if !coordinator.group_active {
                coordinator.group_active = true;
                coordinator.group_buffer.clear();
                coordinator.db_tracker.reset();
                coordinator.state.group_relay_coord = coord.clone();
            }
            if let Some(g) = event.gtid() {
                coordinator.current_group_gtid = Some(g);
            }
            coordinator.db_tracker.observe(&event);
            coordinator.group_buffer.push((event.clone(), coord.clone()));
            coordinator.state.event_relay_coord = coord;
            if event.is_commit_class() {
                coordinator.dispatch_group().await.unwrap();
                coordinator.group_active = false;
            }
        }

        coordinator.drain_workers(&[0, 1]).await;
        coordinator.maybe_checkpoint(true).await.unwrap();

        assert_eq!(engine.applied.load(Ordering::SeqCst), 3);
        assert_eq!(engine.committed.load(Ordering::SeqCst), 1);
        assert!(!coordinator.state.logged_gtids.is_empty());
        coordinator.stop_workers().await;
    }

    #[test]
    fn checksum_alg_default_is_undefined() {
        assert_eq!(ChecksumAlg::Undefined.is_checksum_unaware(), true);
    }
}
