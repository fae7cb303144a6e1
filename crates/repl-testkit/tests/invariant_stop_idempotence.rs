use std::sync::Arc;
use std::time::Duration;

use repl_controller::{Controller, ReplicaEntry, StopOutcome, ThreadMask};
use repl_relaylog::RelayLog;
use repl_schemas::{ApplierState, Coordinate, ReceiverState};
use repl_store::{FileBacking, PositionStore};
use repl_testkit::FakeReplicaThread;

/// Universal invariant 6 — stop idempotence: `stop(); stop()` observes the
/// same end state as a single `stop()`, and the second call never errors
/// or un-stops anything.
#[tokio::test]
async fn calling_stop_twice_is_equivalent_to_calling_it_once() {
    let dir = tempfile::tempdir().unwrap();
    let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
    let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("pos.json"))));
    let entry = ReplicaEntry {
        io: Arc::new(FakeReplicaThread::new(true)),
        sql: Arc::new(FakeReplicaThread::new(true)),
        relay,
        positions,
        receiver_state: ReceiverState::new(7),
        applier_state: ApplierState::new(Coordinate::header_of("relay-bin.000001")),
        skip_errors: repl_config::SkipErrors::None,
    };
    let controller = Controller::new(Duration::from_millis(200));
    controller.register("primary-a", entry).await.unwrap();

    let first = controller.stop("primary-a", ThreadMask::ALL).await.unwrap();
    let status_after_first = controller.status("primary-a").await.unwrap();
    assert_eq!(first, StopOutcome::Stopped);

    let second = controller.stop("primary-a", ThreadMask::ALL).await.unwrap();
    let status_after_second = controller.status("primary-a").await.unwrap();

    assert_eq!(second, StopOutcome::Stopped);
    assert_eq!(status_after_first.io_running, status_after_second.io_running);
    assert_eq!(status_after_first.sql_running, status_after_second.sql_running);
    assert_eq!(status_after_first.last_io_error, status_after_second.last_io_error);
    assert_eq!(status_after_first.last_sql_error, status_after_second.last_sql_error);
}
