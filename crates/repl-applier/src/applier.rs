use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use repl_engine::StorageEngine;
use repl_relaylog::{RelayLog, RelayLogReader};
use repl_schemas::{ApplierState, Coordinate, ErrorEvent, Event, EventPayload, ReplError, RunningState, UntilCondition};
use repl_store::{PersistedState, PositionStore, WorkerRecord};
use tracing::{info, warn};

/// Ceiling on the transient-retry backoff, matching the real server's
/// `MAX_SLAVE_RETRY_PAUSE`.
const MAX_SLAVE_RETRY_PAUSE_SECS: u64 = 60;

pub struct ApplierConfig {
    pub slave_trans_retries: u32,
}

/// Single-threaded apply loop: acquire-read-release-apply-advance, with
/// sql_delay, UNTIL, skip-counter and transient-retry handling exactly as
/// specified.
pub struct Applier<E: StorageEngine> {
    pub state: ApplierState,
    relay: Arc<RelayLog>,
    engine: Arc<E>,
    positions: PositionStore,
    config: ApplierConfig,
    current_group_gtid: Option<repl_schemas::Gtid>,
    /// Every event applied since the current group (or lone non-group
    /// event) started, so a transient failure can roll back and replay
    /// the whole group instead of just the event that failed.
    current_group_events: Vec<Event>,
    /// Relay coordinate to re-seek to when replaying `current_group_events`.
    group_start_relay_coord: Coordinate,
    group_active: bool,
}

impl<E: StorageEngine> Applier<E> {
    pub fn new(state: ApplierState, relay: Arc<RelayLog>, engine: Arc<E>, positions: PositionStore, config: ApplierConfig) -> Self {
        let group_start_relay_coord = state.group_relay_coord.clone();
        Self {
            state,
            relay,
            engine,
            positions,
            config,
            current_group_gtid: None,
            current_group_events: Vec::new(),
            group_start_relay_coord,
            group_active: false,
        }
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
            // Checked post-commit (see `run`'s commit-class branch), never
            // here: SQL_AFTER_GTIDS stops once the target set is fully
            // logged, which this pre-event check can't observe on the Gtid
            // event of the *next* group.
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

    /// Apply the newest event of the current group. On a transient engine
    /// error, roll back and replay the whole group from `reader`'s
    /// re-seeked start coord, not just this one event — a group-level
    /// rollback discards effects the earlier events in the group already
    /// applied, so retrying only the failing event would silently drop
    /// them.
    async fn apply_with_retry(&mut self, reader: &mut RelayLogReader, event: &Event) -> Result<(), ReplError> {
        match self.engine.apply(event).await {
            Ok(()) => Ok(()),
            Err(ReplError::EngineTransient { message }) => {
                self.retry_group_from_start(reader, ReplError::EngineTransient { message }).await
            }
            Err(e) => Err(e),
        }
    }

    async fn retry_group_from_start(&mut self, reader: &mut RelayLogReader, first_err: ReplError) -> Result<(), ReplError> {
        let mut last_err = first_err;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if attempt > self.config.slave_trans_retries {
                return Err(last_err);
            }
            self.engine.rollback_group().await.ok();
            let pause = attempt.min(MAX_SLAVE_RETRY_PAUSE_SECS as u32);
            warn!(attempt, pause, "transient apply error, rolling back and replaying group from its start coord");
            tokio::time::sleep(Duration::from_secs(pause as u64)).await;

            *reader = self
                .relay
                .open_for_read(self.group_start_relay_coord.clone())
                .await
                .map_err(|e| ReplError::EngineTransient { message: e.to_string() })?;

            let mut group_failed = None;
            for ev in self.current_group_events.clone() {
                self.relay
                    .read_next(reader)
                    .await
                    .map_err(|e| ReplError::EngineTransient { message: e.to_string() })?;
                match self.engine.apply(&ev).await {
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

    fn advance_cursors(&mut self, event: &Event, event_coord: Coordinate) {
        self.state.event_relay_coord = event_coord.clone();
        self.state.last_applied_timestamp = Some(event.timestamp);
        if event.is_begin() {
            self.state.group_relay_coord = event_coord;
        }
        if let Some(g) = event.gtid() {
            self.current_group_gtid = Some(g);
        }
    }

    async fn flush_position(&mut self, force: bool) -> anyhow::Result<()> {
        let mut worker = WorkerRecord::new(0);
        worker.last_committed_group_master_coord = self.state.group_master_coord.clone();
        worker.last_committed_group_relay_coord = self.state.group_relay_coord.clone();
        let mut persisted = PersistedState::new(self.state.group_master_coord.clone(), self.state.group_relay_coord.clone());
        persisted.retrieved_gtids_text = self.state.retrieved_gtids.encode_text();
        persisted.logged_gtids_text = self.state.logged_gtids.encode_text();
        persisted.workers.push(worker);
        self.positions.save(&persisted, force).await
    }

    /// Drive the loop against `reader` until `abort_requested`, the UNTIL
    /// condition is satisfied, or a fatal error occurs.
    pub async fn run(&mut self, reader: &mut RelayLogReader) -> anyhow::Result<()> {
        info!(relay_coord = %self.state.group_relay_coord, "applier starting");
        loop {
            if self.state.abort_requested {
                break;
            }

            let pre_read_coord = self.state.event_relay_coord.clone();
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

            if self.state.slave_skip_counter > 0 {
                self.state.slave_skip_counter -= 1;
                self.advance_cursors(&event, event_coord);
                continue;
            }

            if event.is_begin() || !self.group_active {
                self.current_group_events.clear();
                self.group_start_relay_coord = pre_read_coord;
            }
            self.current_group_events.push(event.clone());
            if event.is_begin() {
                self.group_active = true;
            }

            match self.apply_with_retry(reader, &event).await {
                Ok(()) => {
                    self.advance_cursors(&event, event_coord);
                    if event.is_commit_class() {
                        self.engine.commit_group().await.map_err(|e| anyhow::anyhow!(e))?;
                        self.state.group_master_coord = event.coordinate.clone();
                        self.state.group_relay_coord = self.state.event_relay_coord.clone();
                        if let Some(g) = self.current_group_gtid.take() {
                            self.state.logged_gtids.add(g);
                        }
                        self.group_active = false;
                        self.current_group_events.clear();
                        self.flush_position(true).await?;
                        if self.sql_after_gtids_satisfied() {
                            self.state.until_condition = UntilCondition::Done;
                            self.state.running = RunningState::Stopping;
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.state.error = Some(ErrorEvent::from_error(&e, Utc::now()));
                    self.state.running = RunningState::Stopped;
                    self.flush_position(true).await?;
                    return Err(e.into());
                }
            }
        }
        self.flush_position(true).await
    }
}
