use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use repl_config::SkipErrors;
use repl_relaylog::RelayLog;
use repl_schemas::{ApplierState, CaughtUpState, Coordinate, ReceiverState, RunningState, UntilCondition};
use repl_store::{LoadOutcome, PersistedState, PositionStore};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Receiver and Applier/Coordinator are independent tasks with no shared
/// reference to each other's state, so the Controller — the one place that
/// already holds both sides' last-reported snapshot for `status()` — is
/// where `CaughtUpState` actually gets to transition. `Unknown` lasts until
/// something has been fetched at all; once `master_coord` is set, the two
/// cursors are compared directly: equal means the Applier has drained
/// everything the Receiver retrieved, anything else means it's still
/// behind. See DESIGN.md Open Question 1.
fn recompute_caught_up(master_coord: &Coordinate, event_relay_coord: &Coordinate) -> CaughtUpState {
    if master_coord.file_name.is_empty() && master_coord.offset == 0 {
        return CaughtUpState::Unknown;
    }
    if *event_relay_coord == *master_coord {
        CaughtUpState::CaughtUp
    } else {
        CaughtUpState::Behind
    }
}

use crate::change_master::{validate_change_master, ChangeMasterError, ChangeMasterParams};
use crate::replica_thread::ReplicaThread;
use crate::status::StatusRow;
use crate::thread_mask::ThreadMask;

/// Everything the Controller knows about one primary's IO/SQL threads.
/// `io`/`sql` are the live handles (`Receiver`, and either the
/// single-threaded `Applier` or the `Coordinator`, wrapped by the caller
/// that spawned them); `receiver_state`/`applier_state` are the last
/// snapshot those tasks reported in, used to answer `status()` and to seed
/// `change_master`/`reset` without reaching back into the running task.
pub struct ReplicaEntry {
    pub io: Arc<dyn ReplicaThread>,
    pub sql: Arc<dyn ReplicaThread>,
    pub relay: Arc<RelayLog>,
    pub positions: PositionStore,
    pub receiver_state: ReceiverState,
    pub applier_state: ApplierState,
    pub skip_errors: SkipErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopOutcome {
    Stopped,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChangeMasterOutcome {
    Ok,
    MustStop,
    Rejected(ChangeMasterError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResetOutcome {
    Ok,
    MustStop,
}

/// Orchestration layer: `start`/`stop`/`change_master`/`reset`/`status`/
/// `set_skip_errors` over a registry of primaries, each with at most one
/// live Receiver/Applier pair. The registry mutex is the `LOCK_active_mi`
/// equivalent — every control entry point takes it, so two operators can
/// never race a `CHANGE MASTER` against a `START SLAVE` on the same
/// primary.
pub struct Controller {
    registry: Mutex<HashMap<String, ReplicaEntry>>,
    stop_wait_timeout: Duration,
    stop_poll_interval: Duration,
}

impl Controller {
    pub fn new(stop_wait_timeout: Duration) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            stop_wait_timeout,
            stop_poll_interval: Duration::from_millis(50),
        }
    }

    /// Register a primary's thread handles. Errors if this primary id is
    /// already registered: at most one live Receiver/Applier pair per
    /// primary.
    ///
    /// Before inserting, loads `entry.positions` and restores the
    /// crash-safe restart coordinates into `receiver_state`/`applier_state`
    /// when a prior run left persisted state behind, so a restarted
    /// deployment resumes from its last checkpoint instead of whatever
    /// coordinates the caller happened to construct the entry with.
    /// Refuses to register (and the caller must not start the threads) if
    /// that state is corrupt — a replica must never guess its restart
    /// position.
    pub async fn register(&self, primary_id: impl Into<String>, mut entry: ReplicaEntry) -> Result<()> {
        let primary_id = primary_id.into();
        let mut reg = self.registry.lock().await;
        if reg.contains_key(&primary_id) {
            bail!("primary {primary_id} is already registered");
        }
        match entry.positions.load().await.context("load persisted position state on registration")? {
            LoadOutcome::NotFound => {}
            LoadOutcome::Found(persisted) => {
                entry.receiver_state.master_coord = persisted.master_coord.clone();
                entry.applier_state.group_master_coord = persisted.master_coord;
                entry.applier_state.group_relay_coord = persisted.relay_coord.clone();
                entry.applier_state.event_relay_coord = persisted.relay_coord;
                info!(primary_id, "restored persisted position state at registration");
            }
            LoadOutcome::Corrupt(detail) => {
                bail!("persisted position state for primary {primary_id} is corrupt, refusing to start: {detail}");
            }
        }
        reg.insert(primary_id, entry);
        Ok(())
    }

    pub async fn unregister(&self, primary_id: &str) -> Option<ReplicaEntry> {
        self.registry.lock().await.remove(primary_id)
    }

    /// The live task calls this after every position flush so `status()`
    /// reflects current progress instead of the state at registration.
    pub async fn report_receiver_state(&self, primary_id: &str, mut state: ReceiverState) -> Result<()> {
        let mut reg = self.registry.lock().await;
        let entry = reg.get_mut(primary_id).context("unknown primary")?;
        state.caught_up = recompute_caught_up(&state.master_coord, &entry.applier_state.event_relay_coord);
        entry.receiver_state = state;
        Ok(())
    }

    pub async fn report_applier_state(&self, primary_id: &str, state: ApplierState) -> Result<()> {
        let mut reg = self.registry.lock().await;
        let entry = reg.get_mut(primary_id).context("unknown primary")?;
        entry.receiver_state.caught_up = recompute_caught_up(&entry.receiver_state.master_coord, &state.event_relay_coord);
        entry.applier_state = state;
        Ok(())
    }

    /// Idempotent on already-running threads: `request_start` is a no-op
    /// from the thread's own point of view if it's already past
    /// `Starting`.
    pub async fn start(&self, primary_id: &str, mask: ThreadMask) -> Result<()> {
        let reg = self.registry.lock().await;
        let entry = reg.get(primary_id).context("unknown primary")?;
        if mask.io {
            entry.io.request_start();
        }
        if mask.sql {
            entry.sql.request_start();
        }
        Ok(())
    }

    /// Cooperative stop: signal both targeted threads, then poll until
    /// both reach `Stopped` or `stop_wait_timeout` elapses. A timeout
    /// leaves the thread still trying to stop in the background; it is
    /// not rolled back.
    pub async fn stop(&self, primary_id: &str, mask: ThreadMask) -> Result<StopOutcome> {
        {
            let reg = self.registry.lock().await;
            let entry = reg.get(primary_id).context("unknown primary")?;
            if mask.io {
                entry.io.request_stop();
            }
            if mask.sql {
                entry.sql.request_stop();
            }
        }

        let deadline = tokio::time::Instant::now() + self.stop_wait_timeout;
        loop {
            {
                let reg = self.registry.lock().await;
                let entry = reg.get(primary_id).context("unknown primary")?;
                let io_done = !mask.io || entry.io.snapshot().await.running == RunningState::Stopped;
                let sql_done = !mask.sql || entry.sql.snapshot().await.running == RunningState::Stopped;
                if io_done && sql_done {
                    return Ok(StopOutcome::Stopped);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(primary_id, "stop timed out, thread still trying to stop");
                return Ok(StopOutcome::TimedOut);
            }
            tokio::time::sleep(self.stop_poll_interval).await;
        }
    }

    async fn both_stopped(&self, entry: &ReplicaEntry) -> bool {
        entry.io.snapshot().await.running == RunningState::Stopped && entry.sql.snapshot().await.running == RunningState::Stopped
    }

    /// Requires both threads stopped. Validates `{auto_position, explicit
    /// coord}` mutual exclusion and the GTID_MODE requirement; on success,
    /// clears `master_uuid`/`master_server_id` when host or port changes,
    /// snaps the Receiver's coord forward to the Applier's exec coord when
    /// neither host/port nor file/pos were supplied (so it doesn't refetch
    /// what's already applied), then flushes `PositionStore`.
    pub async fn change_master(&self, primary_id: &str, params: ChangeMasterParams, gtid_mode_on: bool) -> Result<ChangeMasterOutcome> {
        if let Err(e) = validate_change_master(&params, gtid_mode_on) {
            return Ok(ChangeMasterOutcome::Rejected(e));
        }

        let mut reg = self.registry.lock().await;
        let entry = reg.get_mut(primary_id).context("unknown primary")?;
        if !self.both_stopped(entry).await {
            return Ok(ChangeMasterOutcome::MustStop);
        }

        let host_or_port_changed = params.master_host.as_ref().is_some_and(|h| h != &entry.receiver_state.master_host)
            || params.master_port.is_some_and(|p| p != entry.receiver_state.master_port);

        if let Some(host) = params.master_host {
            entry.receiver_state.master_host = host;
        }
        if let Some(port) = params.master_port {
            entry.receiver_state.master_port = port;
        }
        if let Some(user) = params.master_user {
            entry.receiver_state.master_user = user;
        }
        if let Some(auto_position) = params.master_auto_position {
            entry.receiver_state.auto_position = auto_position;
        }

        if host_or_port_changed {
            entry.receiver_state.master_uuid = None;
            entry.receiver_state.master_server_id = None;
        }

        let explicit_coord = params.master_log_file.is_some() || params.master_log_pos.is_some();
        if let Some(file) = params.master_log_file {
            entry.receiver_state.master_coord.file_name = file;
        }
        if let Some(pos) = params.master_log_pos {
            entry.receiver_state.master_coord.offset = pos;
        }
        if !host_or_port_changed && !explicit_coord {
            entry.receiver_state.master_coord = entry.applier_state.group_master_coord.clone();
        }

        let persisted = PersistedState {
            master_coord: entry.receiver_state.master_coord.clone(),
            relay_coord: entry.applier_state.event_relay_coord.clone(),
            retrieved_gtids_text: entry.receiver_state.retrieved_gtids.encode_text(),
            logged_gtids_text: entry.applier_state.logged_gtids.encode_text(),
            workers: Vec::new(),
        };
        entry.positions.save(&persisted, true).await.context("flush position store after change_master")?;

        info!(primary_id, "change_master applied");
        Ok(ChangeMasterOutcome::Ok)
    }

    /// Requires both threads stopped. Purges every relay file when
    /// `purge` is set, clears both cursors, clears recorded errors and
    /// `until_condition`, and flushes the cleared state through
    /// `PositionStore`.
    pub async fn reset(&self, primary_id: &str, purge: bool) -> Result<ResetOutcome> {
        let mut reg = self.registry.lock().await;
        let entry = reg.get_mut(primary_id).context("unknown primary")?;
        if !self.both_stopped(entry).await {
            return Ok(ResetOutcome::MustStop);
        }

        let relay_header = if purge {
            entry.relay.reset().await.context("purge relay log on reset")?
        } else {
            entry.applier_state.event_relay_coord.clone()
        };

        entry.receiver_state.master_coord = Coordinate::new(String::new(), 0);
        entry.receiver_state.master_uuid = None;
        entry.receiver_state.master_server_id = None;
        entry.receiver_state.retrieved_gtids = Default::default();
        entry.receiver_state.last_error = None;

        entry.applier_state.group_master_coord = Coordinate::new(String::new(), 0);
        entry.applier_state.group_relay_coord = relay_header.clone();
        entry.applier_state.event_relay_coord = relay_header;
        entry.applier_state.retrieved_gtids = Default::default();
        entry.applier_state.logged_gtids = Default::default();
        entry.applier_state.until_condition = UntilCondition::None;
        entry.applier_state.error = None;

        let persisted = PersistedState {
            master_coord: entry.receiver_state.master_coord.clone(),
            relay_coord: entry.applier_state.event_relay_coord.clone(),
            retrieved_gtids_text: String::new(),
            logged_gtids_text: String::new(),
            workers: Vec::new(),
        };
        entry.positions.save(&persisted, true).await.context("flush position store after reset")?;

        info!(primary_id, purge, "reset applied");
        Ok(ResetOutcome::Ok)
    }

    pub async fn status(&self, primary_id: &str) -> Result<StatusRow> {
        let reg = self.registry.lock().await;
        let entry = reg.get(primary_id).context("unknown primary")?;
        let io_snap = entry.io.snapshot().await;
        let sql_snap = entry.sql.snapshot().await;

        let mut receiver_state = entry.receiver_state.clone();
        receiver_state.last_error = io_snap.last_error.or(receiver_state.last_error);
        let mut applier_state = entry.applier_state.clone();
        applier_state.error = sql_snap.last_error.or(applier_state.error);
        receiver_state.caught_up = recompute_caught_up(&receiver_state.master_coord, &applier_state.event_relay_coord);

        Ok(StatusRow::build(primary_id, io_snap.running, sql_snap.running, &receiver_state, &applier_state, entry.skip_errors.clone()))
    }

    pub async fn set_skip_errors(&self, primary_id: &str, spec: &str) -> Result<()> {
        let parsed = SkipErrors::parse(spec)?;
        let mut reg = self.registry.lock().await;
        let entry = reg.get_mut(primary_id).context("unknown primary")?;
        entry.skip_errors = parsed;
        Ok(())
    }
}
