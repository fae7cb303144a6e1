use std::sync::Arc;

use chrono::Utc;
use repl_applier::{Applier, ApplierConfig};
use repl_relaylog::RelayLog;
use repl_schemas::{ApplierState, Coordinate, Event, EventPayload, Gtid, GtidSet, UntilCondition};
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

/// E6 — UNTIL SQL_AFTER_GTIDS={g5}: the applier commits g3, g4, g5 and
/// stops right after g5 is logged, never touching g6.
#[tokio::test]
async fn stops_right_after_the_target_gtid_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
    let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("position.json"))));
    let engine = Arc::new(FakeStorageEngine::new());
    let sid = Uuid::from_bytes([6; 16]);
    let g3 = Gtid::new(sid, 3);
    let g4 = Gtid::new(sid, 4);
    let g5 = Gtid::new(sid, 5);
    let g6 = Gtid::new(sid, 6);

    let header = relay.current_write_coordinate().await.unwrap();

    relay.append(&ev(10, EventPayload::Gtid { gtid: g3 })).await.unwrap();
    relay.append(&ev(20, opaque(3))).await.unwrap();
    relay.append(&ev(30, EventPayload::Xid { xid: 3 })).await.unwrap();

    relay.append(&ev(40, EventPayload::Gtid { gtid: g4 })).await.unwrap();
    relay.append(&ev(50, opaque(4))).await.unwrap();
    relay.append(&ev(60, EventPayload::Xid { xid: 4 })).await.unwrap();

    relay.append(&ev(70, EventPayload::Gtid { gtid: g5 })).await.unwrap();
    relay.append(&ev(80, opaque(5))).await.unwrap();
    relay.append(&ev(90, EventPayload::Xid { xid: 5 })).await.unwrap();

    relay.append(&ev(100, EventPayload::Gtid { gtid: g6 })).await.unwrap();
    relay.append(&ev(110, opaque(6))).await.unwrap();
    relay.append(&ev(120, EventPayload::Xid { xid: 6 })).await.unwrap();

    let mut target = GtidSet::new();
    target.add(g5);
    let mut state = ApplierState::new(header.clone());
    state.until_condition = UntilCondition::SqlAfterGtids(target);

    let mut applier = Applier::new(state, relay.clone(), engine.clone(), positions, ApplierConfig { slave_trans_retries: 3 });
    let mut reader = relay.open_for_read(header).await.unwrap();

    applier.run(&mut reader).await.unwrap();

    assert_eq!(engine.commit_count(), 3, "g3, g4, g5 commit; g6 is never reached");
    assert_eq!(applier.state.group_master_coord, Coordinate::new("mysql-bin.000001", 90));
    assert!(applier.state.logged_gtids.contains(&g5));
    assert!(!applier.state.logged_gtids.contains(&g6));
    assert_eq!(applier.state.until_condition, UntilCondition::Done);
}
