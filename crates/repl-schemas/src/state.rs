use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinate::Coordinate;
use crate::error::ErrorEvent;
use crate::event::ChecksumAlg;
use crate::gtid::GtidSet;

/// Lifecycle state shared by the Receiver and Applier/Coordinator task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunningState {
    Stopped,
    Starting,
    Connecting,
    Connected,
    Running,
    Stopping,
}

impl RunningState {
    pub fn is_active(self) -> bool {
        !matches!(self, RunningState::Stopped)
    }
}

/// Resolution of the source's two overlapping "caught up" booleans
/// (`reset_seconds_behind_master`, `slave_has_caughtup`) into one explicit
/// state variable. See DESIGN.md "Unified caught-up signal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaughtUpState {
    /// No event fetched yet this connection.
    Unknown,
    /// `event_relay_coord < master_coord`: Applier has more relay data to
    /// consume before it matches what the Receiver has fetched.
    Behind,
    /// `event_relay_coord == master_coord`: Applier has consumed everything
    /// the Receiver has fetched so far.
    CaughtUp,
}

/// `UNTIL` stop condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UntilCondition {
    None,
    MasterPos(Coordinate),
    RelayPos(Coordinate),
    SqlBeforeGtids(GtidSet),
    SqlAfterGtids(GtidSet),
    SqlAfterMtsGaps,
    Done,
}

impl Default for UntilCondition {
    fn default() -> Self {
        UntilCondition::None
    }
}

/// One per configured primary. Transient fields (`abort_requested`,
/// `running`) are excluded from what `PositionStore` persists; see
/// `repl-store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverState {
    pub master_host: String,
    pub master_port: u16,
    pub master_user: String,
    pub bind_address: Option<String>,
    pub use_tls: bool,

    pub master_coord: Coordinate,
    pub master_uuid: Option<Uuid>,
    pub master_server_id: Option<u32>,
    pub heartbeat_period_ns: u64,
    pub retry_count: u32,
    pub connect_retry_secs: u64,

    pub checksum_alg: ChecksumAlg,
    pub ignore_server_ids: BTreeSet<u32>,
    pub auto_position: bool,
    pub replicate_same_server_id: bool,
    pub self_server_id: u32,

    /// GTIDs fetched from the primary so far, maintained by the Receiver
    /// per spec's "extract sid/gno, add before appending" rule. The
    /// Applier keeps its own `logged_gtids` of what has actually committed.
    pub retrieved_gtids: GtidSet,

    pub caught_up: CaughtUpState,
    pub last_error: Option<ErrorEvent>,

    #[serde(skip)]
    pub abort_requested: bool,
    #[serde(skip)]
    pub running: RunningState,
}

impl ReceiverState {
    pub fn new(self_server_id: u32) -> Self {
        Self {
            master_host: String::new(),
            master_port: 0,
            master_user: String::new(),
            bind_address: None,
            use_tls: false,
            master_coord: Coordinate::new(String::new(), 0),
            master_uuid: None,
            master_server_id: None,
            heartbeat_period_ns: 0,
            retry_count: 0,
            connect_retry_secs: 60,
            checksum_alg: ChecksumAlg::Undefined,
            ignore_server_ids: BTreeSet::new(),
            auto_position: false,
            replicate_same_server_id: false,
            self_server_id,
            retrieved_gtids: GtidSet::new(),
            caught_up: CaughtUpState::Unknown,
            last_error: None,
            abort_requested: false,
            running: RunningState::Stopped,
        }
    }
}

/// One per `ReceiverState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplierState {
    pub group_master_coord: Coordinate,
    pub group_relay_coord: Coordinate,
    pub event_relay_coord: Coordinate,

    pub retrieved_gtids: GtidSet,
    pub logged_gtids: GtidSet,

    pub until_condition: UntilCondition,
    pub sql_delay_secs: u64,

    pub trans_retries: u32,
    pub slave_skip_counter: u64,

    pub workers_configured: u32,
    pub checkpoint_group: u32,
    pub checkpoint_period_ns: u64,

    /// Timestamp embedded in the last event applied (or, in Coordinator
    /// mode, dispatched), used with `ReceiverState::caught_up` to compute
    /// `seconds_behind_master` for status reporting.
    pub last_applied_timestamp: Option<DateTime<Utc>>,

    pub error: Option<ErrorEvent>,

    #[serde(skip)]
    pub abort_requested: bool,
    #[serde(skip)]
    pub running: RunningState,
}

impl ApplierState {
    pub fn new(relay_file_header: Coordinate) -> Self {
        Self {
            group_master_coord: Coordinate::new(String::new(), 0),
            group_relay_coord: relay_file_header.clone(),
            event_relay_coord: relay_file_header,
            retrieved_gtids: GtidSet::new(),
            logged_gtids: GtidSet::new(),
            until_condition: UntilCondition::None,
            sql_delay_secs: 0,
            trans_retries: 0,
            slave_skip_counter: 0,
            workers_configured: 0,
            checkpoint_group: 512,
            checkpoint_period_ns: 300_000_000_000,
            last_applied_timestamp: None,
            error: None,
            abort_requested: false,
            running: RunningState::Stopped,
        }
    }
}
