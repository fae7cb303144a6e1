use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use repl_applier::{Applier, ApplierConfig};
use repl_coordinator::{Coordinator, CoordinatorConfig, PartitionMode};
use repl_relaylog::RelayLog;
use repl_schemas::{ApplierState, Coordinate, Event, EventPayload, Gtid, UntilCondition};
use repl_store::{FileBacking, PositionStore};
use repl_testkit::FakeStorageEngine;
use uuid::Uuid;

fn ev(offset: u64, payload: EventPayload) -> Event {
    Event {
        server_id: 1,
        timestamp: Utc::now(),
        coordinate: Coordinate::new("mysql-bin.000001", offset),
        payload_len: 0,
        payload,
        checksum: None,
    }
}

fn opaque(tag: u8) -> EventPayload {
    EventPayload::Opaque {
        statement_or_rows: vec![tag],
        db: Some("x".into()),
    }
}

async fn build_relay(dir: &std::path::Path) -> (Arc<RelayLog>, Coordinate) {
    let relay = Arc::new(RelayLog::open(dir.join("relay"), "relay-bin", 0).await.unwrap());
    let header = relay.current_write_coordinate().await.unwrap();
    let sid = Uuid::from_bytes([12; 16]);
    // Every group targets the same database, so database-key partitioning
    // serializes them onto one worker exactly as a single-threaded apply
    // would, by construction rather than by accident.
    for (base, gno) in [(10u64, 1u64), (40, 2), (70, 3), (100, 4)] {
        relay.append(&ev(base, EventPayload::Gtid { gtid: Gtid::new(sid, gno) })).await.unwrap();
        relay.append(&ev(base + 10, opaque(gno as u8))).await.unwrap();
        relay.append(&ev(base + 20, EventPayload::Xid { xid: gno })).await.unwrap();
    }
    relay
        .append(&ev(130, EventPayload::Heartbeat { log_ident: "mysql-bin.000001".into(), log_pos: 130 }))
        .await
        .unwrap();
    (relay, header)
}

fn opaque_tags(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Opaque { statement_or_rows, .. } => Some(statement_or_rows[0]),
            _ => None,
        })
        .collect()
}

/// Universal invariant 5 — MT equivalence: for the same input stream, the
/// multi-threaded Coordinator's final committed set and commit order match
/// the single-threaded Applier's, as long as every group serializes onto
/// the same worker (database-key partitioning on a single database).
#[tokio::test]
async fn coordinator_matches_single_threaded_applier_on_one_database() {
    let st_dir = tempfile::tempdir().unwrap();
    let (relay_st, header_st) = build_relay(st_dir.path()).await;
    let positions_st = PositionStore::new(Arc::new(FileBacking::new(st_dir.path().join("pos.json"))));
    let engine_st = Arc::new(FakeStorageEngine::new());
    let mut state_st = ApplierState::new(header_st.clone());
    state_st.until_condition = UntilCondition::MasterPos(Coordinate::new("mysql-bin.000001", 130));
    let mut applier = Applier::new(state_st, relay_st.clone(), engine_st.clone(), positions_st, ApplierConfig { slave_trans_retries: 0 });
    let mut reader_st = relay_st.open_for_read(header_st).await.unwrap();
    applier.run(&mut reader_st).await.unwrap();

    let mt_dir = tempfile::tempdir().unwrap();
    let (relay_mt, header_mt) = build_relay(mt_dir.path()).await;
    let positions_mt = PositionStore::new(Arc::new(FileBacking::new(mt_dir.path().join("pos.json"))));
    let engine_mt = Arc::new(FakeStorageEngine::new());
    let mut state_mt = ApplierState::new(header_mt.clone());
    state_mt.until_condition = UntilCondition::MasterPos(Coordinate::new("mysql-bin.000001", 130));
    let config = CoordinatorConfig {
        workers: 3,
        checkpoint_group: 8,
        checkpoint_period: Duration::from_millis(50),
        queue_len_max: 64,
        underrun_level: 2,
        coordinator_basic_nap: Duration::from_millis(5),
        partition_mode: PartitionMode::DatabaseKey,
        slave_trans_retries: 0,
        stop_wait_timeout: Duration::from_secs(5),
        self_server_id: 1,
        recovery_parallel_workers: 0,
        dependency_scheduler: None,
    };
    let mut coordinator = Coordinator::new(state_mt, relay_mt.clone(), engine_mt.clone(), positions_mt, config);
    let mut reader_mt = relay_mt.open_for_read(header_mt).await.unwrap();
    coordinator.run(&mut reader_mt).await.unwrap();

    let st_tags = opaque_tags(&engine_st.applied_events().await);
    let mt_tags = opaque_tags(&engine_mt.applied_events().await);
    assert_eq!(mt_tags, st_tags, "commit order must match the single-threaded run when every group shares a worker");
    assert_eq!(engine_mt.commit_count(), engine_st.commit_count());
}
