use std::sync::Arc;

use chrono::Utc;
use repl_applier::{Applier, ApplierConfig};
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

/// Universal invariant 1 — cursor monotonicity: across any sequence of
/// observable snapshots, `group_master_coord`/`group_relay_coord` never
/// move backwards.
#[tokio::test]
async fn group_coords_never_regress_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
    let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("position.json"))));
    let engine = Arc::new(FakeStorageEngine::new());
    let sid = Uuid::from_bytes([8; 16]);
    let header = relay.current_write_coordinate().await.unwrap();

    for (base, gno) in [(10u64, 1u64), (40, 2), (70, 3)] {
        relay.append(&ev(base, EventPayload::Gtid { gtid: Gtid::new(sid, gno) })).await.unwrap();
        relay.append(&ev(base + 10, opaque(gno as u8))).await.unwrap();
        relay.append(&ev(base + 20, EventPayload::Xid { xid: gno })).await.unwrap();
    }
    relay
        .append(&ev(100, EventPayload::Heartbeat { log_ident: "mysql-bin.000001".into(), log_pos: 100 }))
        .await
        .unwrap();

    let state = ApplierState::new(header.clone());
    let mut applier = Applier::new(state, relay.clone(), engine.clone(), positions, ApplierConfig { slave_trans_retries: 0 });
    let mut reader = relay.open_for_read(header).await.unwrap();

    let mut snapshots = Vec::new();
    for target in [40u64, 70, 100] {
        applier.state.until_condition = UntilCondition::MasterPos(Coordinate::new("mysql-bin.000001", target));
        applier.run(&mut reader).await.unwrap();
        snapshots.push((applier.state.group_master_coord.offset, applier.state.group_relay_coord.offset));
    }

    for pair in snapshots.windows(2) {
        assert!(pair[1].0 >= pair[0].0, "group_master_coord regressed: {:?}", pair);
        assert!(pair[1].1 >= pair[0].1, "group_relay_coord regressed: {:?}", pair);
    }
    assert_eq!(snapshots.last().unwrap().0, 90);
}
