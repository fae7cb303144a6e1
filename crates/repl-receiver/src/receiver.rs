use std::sync::Arc;

use repl_masterlink::{MasterConn, MasterLink, PacketOutcome};
use repl_schemas::{Coordinate, Event, EventPayload, ReceiverState, ReplError};
use repl_relaylog::RelayLog;
use repl_store::{PersistedState, PositionStore};
use tracing::{info, warn};

use crate::checksum;

/// How many consecutive origin-filtered events the Receiver lets pass
/// before injecting a synthetic Rotate so the Applier's view still
/// advances (spec §4.4 step 3).
const FILTER_ROTATE_EVERY: u32 = 64;

pub struct Receiver {
    pub state: ReceiverState,
    relay: Arc<RelayLog>,
    positions: PositionStore,
    verify_checksum: bool,
    filtered_since_rotate: u32,
}

impl Receiver {
    pub fn new(state: ReceiverState, relay: Arc<RelayLog>, positions: PositionStore, verify_checksum: bool) -> Self {
        Self {
            state,
            relay,
            positions,
            verify_checksum,
            filtered_since_rotate: 0,
        }
    }

    fn is_filtered_origin(&self, server_id: u32) -> bool {
        (server_id == self.state.self_server_id && !self.state.replicate_same_server_id)
            || self.state.ignore_server_ids.contains(&server_id)
    }

    async fn append(&mut self, event: &Event) -> Result<Coordinate, ReplError> {
        let coord = self.relay.append(event).await.map_err(|e| ReplError::EngineTransient { message: e.to_string() })?;
        Ok(coord)
    }

    async fn rotate(&mut self) -> Result<(), ReplError> {
        self.relay.rotate().await.map_err(|e| ReplError::EngineTransient { message: e.to_string() })?;
        Ok(())
    }

    /// Non-forced flush after every append; callers that just rotated or
    /// are shutting down pass `force = true`.
    async fn flush_position(&mut self, force: bool) -> anyhow::Result<()> {
        let state = PersistedState::new(self.state.master_coord.clone(), self.relay.current_write_coordinate().await?);
        self.positions.save(&state, force).await?;
        if force {
            self.relay.flush_and_sync().await?;
        }
        Ok(())
    }

    /// Handle one event from the dump stream. Returns the error unchanged
    /// on a fatal condition; transient append failures bubble up for the
    /// caller's reconnect loop to classify.
    pub async fn handle_event(&mut self, event: Event) -> anyhow::Result<()> {
        checksum::verify(&event, self.state.checksum_alg, self.verify_checksum)?;

        if self.is_filtered_origin(event.server_id) {
            self.state.master_coord = event.coordinate.clone();
            self.filtered_since_rotate += 1;
            if self.filtered_since_rotate >= FILTER_ROTATE_EVERY {
                self.rotate().await?;
                self.filtered_since_rotate = 0;
            }
            self.flush_position(false).await?;
            return Ok(());
        }
        self.filtered_since_rotate = 0;

        match &event.payload {
            EventPayload::FormatDescription { checksum_alg, .. } => {
                self.state.checksum_alg = *checksum_alg;
                self.state.master_coord = event.coordinate.clone();
                self.append(&event).await?;
                self.flush_position(false).await?;
            }
            EventPayload::Rotate { new_file, new_offset } => {
                self.state.master_coord = Coordinate::new(new_file.clone(), *new_offset);
                self.rotate().await?;
                self.flush_position(true).await?;
            }
            EventPayload::Heartbeat { log_ident, log_pos } => {
                let incoming = Coordinate::new(log_ident.clone(), *log_pos);
                if let Some(order) = self.state.master_coord.compare_total_order(&incoming) {
                    if order == std::cmp::Ordering::Greater {
                        anyhow::bail!(ReplError::ProtocolFatal {
                            message: "heartbeat coordinate regressed relative to master_coord".into(),
                        });
                    }
                }
                let advanced = incoming != self.state.master_coord;
                self.state.master_coord = incoming;
                if advanced {
                    self.rotate().await?;
                }
                self.flush_position(advanced).await?;
            }
            EventPayload::PreviousGtids => {
                self.rotate().await?;
                self.flush_position(true).await?;
            }
            EventPayload::Gtid { gtid } => {
                let gtid = *gtid;
                let previously_present = self.state.retrieved_gtids.contains(&gtid);
                self.state.retrieved_gtids.add(gtid);
                self.state.master_coord = event.coordinate.clone();
                match self.append(&event).await {
                    Ok(_) => {
                        self.flush_position(false).await?;
                    }
                    Err(e) => {
                        if !previously_present {
                            self.state.retrieved_gtids.remove(&gtid);
                        }
                        return Err(e.into());
                    }
                }
            }
            _ => {
                self.state.master_coord = event.coordinate.clone();
                self.append(&event).await?;
                self.flush_position(false).await?;
            }
        }

        Ok(())
    }

    /// Drives a live `MasterLink`: reads packets until the dump connection
    /// closes or `abort_requested` is set, reconnecting through the link's
    /// own bounded backoff on transient read errors.
    pub async fn run<C: MasterConn>(&mut self, link: &mut MasterLink<C>) -> anyhow::Result<()> {
        info!(master_coord = %self.state.master_coord, "receiver starting dump loop");
        while !self.state.abort_requested {
            match link.read_packet().await {
                Ok(PacketOutcome::Event(event)) => {
                    self.handle_event(event).await?;
                }
                Ok(PacketOutcome::DumpClosed) => {
                    info!("primary closed dump connection");
                    break;
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "dump read failed, reconnecting");
                    let last_retrieved = self.state.master_uuid.and_then(|sid| self.state.retrieved_gtids.last_of(&sid));
                    link.reconnect_with_backoff(&self.state.master_coord, &self.state.retrieved_gtids, &self.state.retrieved_gtids, last_retrieved)
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.flush_position(true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use repl_schemas::Gtid;
    use repl_store::FileBacking;
    use uuid::Uuid;

    async fn test_receiver() -> (Receiver, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let relay = Arc::new(RelayLog::open(dir.path().join("relay"), "relay-bin", 0).await.unwrap());
        let positions = PositionStore::new(Arc::new(FileBacking::new(dir.path().join("position.json"))));
        let state = ReceiverState::new(1);
        (Receiver::new(state, relay, positions, true), dir)
    }

    fn event(server_id: u32, payload: EventPayload) -> Event {
        Event {
            server_id,
            timestamp: Utc::now(),
            coordinate: Coordinate::new("mysql-bin.000001".into(), 123),
            payload_len: 0,
            payload,
            checksum: Some(0),
        }
    }

    #[tokio::test]
    async fn rotate_event_updates_master_coord_and_relay_log() {
        let (mut recv, _dir) = test_receiver().await;
        recv.handle_event(event(
            5,
            EventPayload::Rotate {
                new_file: "mysql-bin.000002".into(),
                new_offset: 4,
            },
        ))
        .await
        .unwrap();
        assert_eq!(recv.state.master_coord, Coordinate::new("mysql-bin.000002".into(), 4));
    }

    #[tokio::test]
    async fn self_origin_event_is_filtered_but_advances_master_coord() {
        let (mut recv, _dir) = test_receiver().await;
        recv.handle_event(event(1, EventPayload::Xid { xid: 1 })).await.unwrap();
        assert_eq!(recv.state.master_coord, Coordinate::new("mysql-bin.000001".into(), 123));
    }

    #[tokio::test]
    async fn gtid_event_adds_before_append() {
        let (mut recv, _dir) = test_receiver().await;
        let g = Gtid::new(Uuid::from_bytes([3; 16]), 1);
        recv.handle_event(event(2, EventPayload::Gtid { gtid: g })).await.unwrap();
        assert!(recv.state.retrieved_gtids.contains(&g));
    }
}
