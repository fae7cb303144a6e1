use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// The fixed "already exists / does not exist" DDL error codes that
/// `ddl_exist_errors` expands to.
pub const DDL_EXIST_ERROR_CODES: &[i32] = &[
    1007, // database exists
    1008, // database doesn't exist
    1050, // table exists
    1051, // unknown table
    1061, // duplicate key name
    1091, // can't drop field or key, doesn't exist
    1146, // no such table
];

/// Every configuration knob enumerated in spec §6, verbatim field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Soft cap on RelayLog bytes on disk.
    pub relay_log_space_limit: u64,
    /// Per-packet network timeout.
    pub slave_net_timeout: Duration,
    /// Max transient-error retries per group.
    pub slave_trans_retries: u32,
    /// Cooperative stop timeout.
    pub rpl_stop_slave_timeout: Duration,
    /// Worker count; 0 = single-threaded.
    pub slave_parallel_workers: u32,
    /// Max time between LWM checkpoints.
    pub mts_checkpoint_period: Duration,
    /// Max groups between checkpoints; sizes the GAQ.
    pub mts_checkpoint_group: u32,
    /// Aggregate backpressure cap.
    pub mts_pending_jobs_size_max: u64,
    /// Events to skip before applying.
    pub slave_skip_counter: u64,
    /// Allow events whose origin equals local id.
    pub replicate_same_server_id: bool,
    /// Verify event checksum on read.
    pub slave_sql_verify_checksum: bool,
    /// Resume by GTID set instead of coord.
    pub auto_position: bool,
    /// Artificial lag in seconds.
    pub sql_delay: Duration,

    /// Not itemized in the knob table but required to size the GAQ and
    /// per-worker queues consistently with `slave_parallel_workers`.
    pub mts_slave_worker_queue_len_max: u32,
    pub coordinator_basic_nap: Duration,
    pub underrun_level: u32,
    pub stop_wait_timeout: Duration,
    pub slave_wait_group_done: Duration,
    pub connect_retry_secs: u64,
    pub retry_count: u32,
    pub recovery_parallel_workers: u32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            relay_log_space_limit: 0,
            slave_net_timeout: Duration::from_secs(60),
            slave_trans_retries: 10,
            rpl_stop_slave_timeout: Duration::from_secs(31),
            slave_parallel_workers: 0,
            mts_checkpoint_period: Duration::from_millis(300),
            mts_checkpoint_group: 512,
            mts_pending_jobs_size_max: 16 * 1024 * 1024,
            slave_skip_counter: 0,
            replicate_same_server_id: false,
            slave_sql_verify_checksum: true,
            auto_position: false,
            sql_delay: Duration::from_secs(0),
            mts_slave_worker_queue_len_max: 16384,
            coordinator_basic_nap: Duration::from_millis(5),
            underrun_level: 10,
            stop_wait_timeout: Duration::from_secs(60),
            slave_wait_group_done: Duration::from_secs(60),
            connect_retry_secs: 60,
            retry_count: 86400,
            recovery_parallel_workers: 0,
        }
    }
}

/// Parsed `skip-errors` grammar: a comma-separated list of integers, the
/// literal `all`, or the literal `ddl_exist_errors`. Stored as a bitmap
/// over the error-code space so lookups are O(1) after parsing once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipErrors {
    None,
    All,
    Codes(BTreeSet<i32>),
}

impl SkipErrors {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(SkipErrors::None);
        }
        if spec.eq_ignore_ascii_case("all") {
            return Ok(SkipErrors::All);
        }
        if spec.eq_ignore_ascii_case("ddl_exist_errors") {
            return Ok(SkipErrors::Codes(DDL_EXIST_ERROR_CODES.iter().copied().collect()));
        }
        let mut codes = BTreeSet::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.parse::<i32>() {
                Ok(n) => {
                    codes.insert(n);
                }
                Err(_) => bail!("invalid skip-errors entry: {part:?}"),
            }
        }
        Ok(SkipErrors::Codes(codes))
    }

    /// `true` if an apply-time user error with this code should be warned
    /// on and skipped rather than treated as fatal.
    pub fn should_skip(&self, code: i32) -> bool {
        match self {
            SkipErrors::None => false,
            SkipErrors::All => true,
            SkipErrors::Codes(set) => set.contains(&code),
        }
    }
}
