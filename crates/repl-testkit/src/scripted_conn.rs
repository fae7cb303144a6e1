use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use repl_masterlink::{MasterConn, PacketOutcome};
use repl_schemas::ReplError;
use uuid::Uuid;

/// Deterministic stand-in for a real primary connection: a canned
/// handshake reply plus a scripted queue of dump-stream packets. Tests
/// push whatever `PacketOutcome` sequence a scenario needs and drive the
/// real `MasterLink`/`Receiver` against it.
pub struct ScriptedMasterConn {
    pub server_uuid: Uuid,
    pub server_id: u32,
    pub collation: String,
    pub time_zone: String,
    packets: VecDeque<PacketOutcome>,
    /// How many leading `connect()` calls should fail with a retryable
    /// network error before handshakes are allowed to succeed, for
    /// exercising `MasterLink::reconnect_with_backoff`.
    fail_connects_remaining: AtomicU32,
    connect_attempts: AtomicU32,
}

impl ScriptedMasterConn {
    pub fn new(server_uuid: Uuid, server_id: u32) -> Self {
        Self {
            server_uuid,
            server_id,
            collation: "utf8mb4_general_ci".into(),
            time_zone: "SYSTEM".into(),
            packets: VecDeque::new(),
            fail_connects_remaining: AtomicU32::new(0),
            connect_attempts: AtomicU32::new(0),
        }
    }

    pub fn with_packets(mut self, packets: impl IntoIterator<Item = PacketOutcome>) -> Self {
        self.packets.extend(packets);
        self
    }

    pub fn with_failing_connects(self, count: u32) -> Self {
        self.fail_connects_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub fn push_packet(&mut self, packet: PacketOutcome) {
        self.packets.push_back(packet);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MasterConn for ScriptedMasterConn {
    async fn connect(&mut self, _host: &str, _port: u16, _connect_timeout: Duration) -> Result<(), ReplError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_connects_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ReplError::NetworkFatal {
                message: "scripted connect failure".into(),
            });
        }
        Ok(())
    }

    async fn authenticate(&mut self, _user: &str) -> Result<(), ReplError> {
        Ok(())
    }

    async fn query_scalar(&mut self, query: &str) -> Result<String, ReplError> {
        if query.contains("server_uuid") {
            Ok(self.server_uuid.to_string())
        } else {
            Ok(String::new())
        }
    }

    async fn query_row(&mut self, _query: &str) -> Result<Vec<String>, ReplError> {
        Ok(vec![self.server_id.to_string(), self.collation.clone(), self.time_zone.clone()])
    }

    async fn send_command(&mut self, _opcode: u8, _buf: &[u8]) -> Result<(), ReplError> {
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<PacketOutcome, ReplError> {
        self.packets.pop_front().ok_or(ReplError::NetworkFatal {
            message: "scripted primary has no more packets".into(),
        })
    }
}
