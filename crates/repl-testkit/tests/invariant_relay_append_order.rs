use std::sync::Arc;

use chrono::Utc;
use repl_receiver::Receiver;
use repl_relaylog::RelayLog;
use repl_schemas::{Coordinate, Event, EventPayload, ReceiverState};
use repl_store::{FileBacking, PositionStore};

fn ev(server_id: u32, offset: u64, payload: EventPayload) -> Event {
    Event {
        server_id,
        timestamp: Utc::now(),
        coordinate: Coordinate::new("mysql-bin.000001", offset),
        payload_len: 0,
        payload,
        checksum: None,
    }
}

/// Universal invariant 3 — relay append = primary order: the sequence of
/// non-filtered events written to the relay log is a prefix of the
/// primary's event sequence, with self-originated events dropped rather
/// than reordering anything around them.
#[tokio::test]
async fn non_filtered_events_append_in_primary_order() {
    let dir = tempfile::tempdir().unwrap();
    let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
    let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("position.json"))));
    let mut state = ReceiverState::new(7);
    state.ignore_server_ids.insert(9);
    let mut receiver = Receiver::new(state, relay.clone(), positions, false);

    let primary_sequence = vec![
        ev(3, 10, EventPayload::Opaque { statement_or_rows: vec![1], db: Some("x".into()) }),
        // server_id 9 is ignored: must not land in the relay log.
        ev(9, 20, EventPayload::Opaque { statement_or_rows: vec![2], db: Some("x".into()) }),
        ev(3, 30, EventPayload::Opaque { statement_or_rows: vec![3], db: Some("x".into()) }),
        ev(3, 40, EventPayload::Xid { xid: 1 }),
    ];
    for event in &primary_sequence {
        receiver.handle_event(event.clone()).await.unwrap();
    }

    let header = Coordinate::header_of("relay-bin.000001");
    let mut reader = relay.open_for_read(header).await.unwrap();
    let mut replayed = Vec::new();
    while let Some(event) = relay.read_next(&mut reader).await.unwrap() {
        replayed.push(event);
    }

    let expected: Vec<Event> = primary_sequence.into_iter().filter(|e| e.server_id != 9).collect();
    assert_eq!(replayed, expected);
}
