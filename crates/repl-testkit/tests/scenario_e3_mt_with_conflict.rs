use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
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

fn opaque(db: &str, tag: u8) -> EventPayload {
    EventPayload::Opaque {
        statement_or_rows: vec![tag],
        db: Some(db.to_string()),
    }
}

/// E3 — two groups against the same database always land on the same
/// worker (hash partitioning), so their commit order on that database
/// matches the primary's dispatch order even with multiple workers.
#[tokio::test]
async fn same_db_groups_commit_in_dispatch_order_across_workers() {
    let dir = tempfile::tempdir().unwrap();
    let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
    let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("position.json"))));
    let engine = Arc::new(FakeStorageEngine::new());
    let sid = Uuid::from_bytes([4; 16]);

    let header = relay.current_write_coordinate().await.unwrap();

    // Ga(db=x), Gb(db=y), Gc(db=x), in primary order.
    relay.append(&ev(10, EventPayload::Gtid { gtid: Gtid::new(sid, 1) })).await.unwrap();
    relay.append(&ev(20, opaque("x", 1))).await.unwrap();
    relay.append(&ev(30, EventPayload::Xid { xid: 1 })).await.unwrap();

    relay.append(&ev(40, EventPayload::Gtid { gtid: Gtid::new(sid, 2) })).await.unwrap();
    relay.append(&ev(50, opaque("y", 2))).await.unwrap();
    relay.append(&ev(60, EventPayload::Xid { xid: 2 })).await.unwrap();

    relay.append(&ev(70, EventPayload::Gtid { gtid: Gtid::new(sid, 3) })).await.unwrap();
    relay.append(&ev(80, opaque("x", 3))).await.unwrap();
    relay.append(&ev(90, EventPayload::Xid { xid: 3 })).await.unwrap();

    // Sentinel the coordinator will stop at without applying, once every
    // real group has already been dispatched.
    relay
        .append(&ev(
            100,
            EventPayload::Heartbeat {
                log_ident: "mysql-bin.000001".into(),
                log_pos: 100,
            },
        ))
        .await
        .unwrap();

    let mut state = ApplierState::new(header.clone());
    state.until_condition = UntilCondition::MasterPos(Coordinate::new("mysql-bin.000001", 100));

    let config = CoordinatorConfig {
        workers: 2,
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
    let mut coordinator = Coordinator::new(state, relay.clone(), engine.clone(), positions, config);
    let mut reader = relay.open_for_read(header).await.unwrap();

    coordinator.run(&mut reader).await.unwrap();

    let applied = engine.applied_events().await;
    let x_tags: Vec<u8> = applied
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Opaque { db: Some(db), statement_or_rows } if db == "x" => Some(statement_or_rows[0]),
            _ => None,
        })
        .collect();
    assert_eq!(x_tags, vec![1, 3], "Ga then Gc must commit in that order on db=x");

    assert_eq!(engine.commit_count(), 3);
    assert_eq!(coordinator.state.group_master_coord, Coordinate::new("mysql-bin.000001", 90));
}
