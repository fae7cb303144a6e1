use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::gtid::Gtid;

/// Negotiated checksum algorithm for a connection / relay file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlg {
    Off,
    Crc32,
    /// Primary never declared a checksum algorithm (pre-negotiation default).
    Undefined,
}

impl ChecksumAlg {
    pub fn is_checksum_unaware(self) -> bool {
        matches!(self, ChecksumAlg::Undefined)
    }
}

/// Fields the core must branch on, per event type. Everything else in a
/// real binlog event is opaque payload bytes the core never inspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Rotate {
        new_file: String,
        new_offset: u64,
    },
    FormatDescription {
        checksum_alg: ChecksumAlg,
        binlog_version: u16,
    },
    Heartbeat {
        log_ident: String,
        log_pos: u64,
    },
    Gtid {
        gtid: Gtid,
    },
    PreviousGtids,
    /// Start of a transaction (`BEGIN` or an implicit DML/DDL begin).
    Begin,
    /// End of a transaction (`Xid` / `Commit` / DDL-equivalent single-event
    /// commit).
    Xid {
        xid: u64,
    },
    RowsQuery {
        trx_ts: Option<DateTime<Utc>>,
    },
    /// Any statement/row event the core applies opaquely through
    /// [`crate::ReplError`]-returning `StorageEngine::apply`.
    Opaque {
        statement_or_rows: Vec<u8>,
        /// Database name this statement/row-set targets, when known.
        /// Database-key partitioning in the multi-threaded apply path
        /// hashes on this; `None` is treated as its own serialized lane.
        db: Option<String>,
    },
}

/// Opaque event with typed accessors, as specified: type code, server_id,
/// timestamp, coordinate, payload length, plus per-type extras folded into
/// [`EventPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub server_id: u32,
    pub timestamp: DateTime<Utc>,
    pub coordinate: Coordinate,
    pub payload_len: u32,
    pub payload: EventPayload,
    /// Present when the connection/relay file negotiated a non-`Off`
    /// checksum; the core verifies it, never computes it over payload bytes
    /// it doesn't parse.
    pub checksum: Option<u32>,
}

impl Event {
    pub fn is_commit_class(&self) -> bool {
        matches!(self.payload, EventPayload::Xid { .. })
    }

    pub fn is_begin(&self) -> bool {
        matches!(self.payload, EventPayload::Begin | EventPayload::Gtid { .. })
    }

    pub fn gtid(&self) -> Option<Gtid> {
        match self.payload {
            EventPayload::Gtid { gtid } => Some(gtid),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.payload {
            EventPayload::Rotate { .. } => "Rotate",
            EventPayload::FormatDescription { .. } => "FormatDescription",
            EventPayload::Heartbeat { .. } => "Heartbeat",
            EventPayload::Gtid { .. } => "Gtid",
            EventPayload::PreviousGtids => "PreviousGtids",
            EventPayload::Begin => "Begin",
            EventPayload::Xid { .. } => "Xid",
            EventPayload::RowsQuery { .. } => "RowsQuery",
            EventPayload::Opaque { .. } => "Opaque",
        }
    }
}
