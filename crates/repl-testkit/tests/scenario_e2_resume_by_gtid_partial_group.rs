use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use repl_masterlink::{build_dump_request, DumpRequest, LinkConfig, MasterLink, PacketOutcome};
use repl_receiver::Receiver;
use repl_relaylog::RelayLog;
use repl_schemas::{Coordinate, Event, EventPayload, Gtid, GtidSet, ReceiverState};
use repl_store::{FileBacking, PositionStore};
use repl_testkit::ScriptedMasterConn;
use uuid::Uuid;

fn event(server_id: u32, offset: u64, payload: EventPayload) -> Event {
    Event {
        server_id,
        timestamp: Utc::now(),
        coordinate: Coordinate::new("mysql-bin.000001", offset),
        payload_len: 0,
        payload,
        checksum: None,
    }
}

fn test_config(self_uuid: Uuid) -> LinkConfig {
    LinkConfig {
        master_host: "primary".into(),
        master_port: 3306,
        master_user: "repl".into(),
        connect_timeout: Duration::from_secs(1),
        connect_retry_secs: 0,
        retry_count: 3,
        self_uuid,
        self_server_id: 2,
        replicate_same_server_id: false,
        auto_position: true,
    }
}

/// E2 — a group that breaks mid-flight leaves its GTID retrieved but not
/// logged; the next dump request must exclude it so the primary resends
/// the whole group rather than the tail the receiver already has.
#[tokio::test]
async fn auto_position_excludes_last_retrieved_gtid_of_unfinished_group() {
    let self_uuid = Uuid::from_bytes([1; 16]);
    let master_uuid = Uuid::from_bytes([2; 16]);
    let g1 = Gtid::new(master_uuid, 1);
    let g2 = Gtid::new(master_uuid, 2);

    let conn = ScriptedMasterConn::new(master_uuid, 7).with_packets([
        PacketOutcome::Event(event(7, 4, EventPayload::Gtid { gtid: g1 })),
        PacketOutcome::Event(event(7, 8, EventPayload::Begin)),
        PacketOutcome::Event(event(7, 20, EventPayload::Xid { xid: 1 })),
        PacketOutcome::Event(event(7, 24, EventPayload::Gtid { gtid: g2 })),
        PacketOutcome::Event(event(7, 28, EventPayload::Begin)),
        PacketOutcome::Event(event(
            7,
            60,
            EventPayload::Opaque {
                statement_or_rows: vec![9, 9],
                db: Some("x".into()),
            },
        )),
        // network breaks before g2's Xid arrives
        PacketOutcome::DumpClosed,
    ]);

    let mut link = MasterLink::new(conn, test_config(self_uuid));
    link.connect_and_handshake(&Coordinate::new("mysql-bin.000001", 0), &GtidSet::new(), &GtidSet::new(), None)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
    let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("position.json"))));
    let mut state = ReceiverState::new(2);
    state.auto_position = true;
    let mut receiver = Receiver::new(state, relay, positions, false);

    receiver.run(&mut link).await.unwrap();

    assert!(receiver.state.retrieved_gtids.contains(&g1));
    assert!(receiver.state.retrieved_gtids.contains(&g2));

    let last_retrieved = receiver.state.retrieved_gtids.iter().last();
    assert_eq!(last_retrieved, Some(g2));

    let request = build_dump_request(
        true,
        &receiver.state.master_coord,
        &receiver.state.retrieved_gtids,
        &GtidSet::new(), // applier has logged nothing from this group yet
        last_retrieved,
        2,
        0,
    );
    let DumpRequest::AutoPosition { gtid_set, .. } = request else {
        panic!("expected an auto-position request");
    };
    assert!(gtid_set.contains(&g1));
    assert!(!gtid_set.contains(&g2), "unfinished group's gtid must be excluded so the primary resends it");
}
