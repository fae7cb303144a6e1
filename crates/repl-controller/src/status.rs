use chrono::Utc;
use repl_config::SkipErrors;
use repl_schemas::{ApplierState, CaughtUpState, Coordinate, ErrorEvent, ReceiverState, RunningState};
use serde::Serialize;

/// `SHOW SLAVE STATUS`'s field set, trimmed to what this implementation
/// actually tracks. Built fresh from the live `ReplicaThread` snapshots
/// plus the last-known `ReceiverState`/`ApplierState` the Controller holds
/// for the primary.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub primary_id: String,
    pub io_running: RunningState,
    pub sql_running: RunningState,

    pub master_host: String,
    pub master_port: u16,
    pub master_user: String,

    pub master_coord: Coordinate,
    pub relay_coord: Coordinate,
    pub exec_master_coord: Coordinate,

    pub retrieved_gtids: String,
    pub executed_gtids: String,

    pub last_io_error: Option<ErrorEvent>,
    pub last_sql_error: Option<ErrorEvent>,

    pub skip_errors: SkipErrors,

    /// `SHOW SLAVE STATUS`'s `Seconds_Behind_Master` equivalent. `None`
    /// before anything has been fetched; `Some(0)` once the Applier has
    /// drained everything retrieved; otherwise the age of the last event
    /// the Applier/Coordinator has applied.
    pub seconds_behind_master: Option<i64>,
}

impl StatusRow {
    pub fn build(
        primary_id: &str,
        io_running: RunningState,
        sql_running: RunningState,
        receiver: &ReceiverState,
        applier: &ApplierState,
        skip_errors: SkipErrors,
    ) -> Self {
        let seconds_behind_master = match receiver.caught_up {
            CaughtUpState::Unknown => None,
            CaughtUpState::CaughtUp => Some(0),
            CaughtUpState::Behind => applier.last_applied_timestamp.map(|ts| (Utc::now() - ts).num_seconds().max(0)),
        };

        Self {
            primary_id: primary_id.to_string(),
            io_running,
            sql_running,
            master_host: receiver.master_host.clone(),
            master_port: receiver.master_port,
            master_user: receiver.master_user.clone(),
            master_coord: receiver.master_coord.clone(),
            relay_coord: applier.event_relay_coord.clone(),
            exec_master_coord: applier.group_master_coord.clone(),
            retrieved_gtids: receiver.retrieved_gtids.encode_text(),
            executed_gtids: applier.logged_gtids.encode_text(),
            last_io_error: receiver.last_error.clone(),
            last_sql_error: applier.error.clone(),
            skip_errors,
            seconds_behind_master,
        }
    }
}
