use std::time::Duration;

use repl_schemas::{Coordinate, Gtid, GtidSet, ReplError};
use tracing::warn;
use uuid::Uuid;

use crate::conn::{MasterConn, PacketOutcome};
use crate::dump::{build_dump_request, DumpRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Handshaking,
    Dumping,
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub master_host: String,
    pub master_port: u16,
    pub master_user: String,
    pub connect_timeout: Duration,
    pub connect_retry_secs: u64,
    pub retry_count: u32,
    pub self_uuid: Uuid,
    pub self_server_id: u32,
    pub replicate_same_server_id: bool,
    pub auto_position: bool,
}

/// Connection lifecycle to the primary: handshake, capability negotiation,
/// dump request, framed event read, reconnect with bounded retry. Every
/// network action is delegated to a `MasterConn`; this type only owns the
/// state machine and the handshake/reconnect sequencing.
pub struct MasterLink<C: MasterConn> {
    conn: C,
    config: LinkConfig,
    state: LinkState,
    pub master_uuid: Option<Uuid>,
    pub master_server_id: Option<u32>,
}

impl<C: MasterConn> MasterLink<C> {
    pub fn new(conn: C, config: LinkConfig) -> Self {
        Self {
            conn,
            config,
            state: LinkState::Disconnected,
            master_uuid: None,
            master_server_id: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Run the handshake (steps a-g) through `Handshaking` and issue the
    /// dump request, leaving the link in `Dumping` on success.
    pub async fn connect_and_handshake(
        &mut self,
        master_coord: &Coordinate,
        retrieved_gtids: &GtidSet,
        logged_gtids: &GtidSet,
        last_retrieved: Option<Gtid>,
    ) -> Result<(), ReplError> {
        self.state = LinkState::Connecting;
        self.conn
            .connect(&self.config.master_host, self.config.master_port, self.config.connect_timeout)
            .await?;

        self.state = LinkState::Handshaking;
        self.step_b_authenticate().await?;
        self.step_c_check_server_uuid().await?;
        self.step_d_check_server_id_and_locale().await?;
        self.step_e_set_session_vars().await?;
        self.step_f_register_as_slave().await?;
        self.step_g_issue_dump(master_coord, retrieved_gtids, logged_gtids, last_retrieved)
            .await?;

        self.state = LinkState::Dumping;
        Ok(())
    }

    async fn step_b_authenticate(&mut self) -> Result<(), ReplError> {
        self.conn.authenticate(&self.config.master_user).await
    }

    async fn step_c_check_server_uuid(&mut self) -> Result<(), ReplError> {
        let raw = self.conn.query_scalar("select @@server_uuid").await?;
        let uuid = Uuid::parse_str(raw.trim()).map_err(|e| ReplError::ProtocolFatal {
            message: format!("primary server_uuid unparsable: {e}"),
        })?;
        if uuid == self.config.self_uuid && !self.config.replicate_same_server_id {
            return Err(ReplError::ProtocolFatal {
                message: "primary server_uuid equals local uuid and replicate_same_server_id is false".into(),
            });
        }
        self.master_uuid = Some(uuid);
        Ok(())
    }

    async fn step_d_check_server_id_and_locale(&mut self) -> Result<(), ReplError> {
        let row = self.conn.query_row("select @@server_id, @@collation_server, @@time_zone").await?;
        let [server_id, collation, time_zone] = <[String; 3]>::try_from(row).map_err(|_| ReplError::ProtocolFatal {
            message: "malformed server_id/collation/time_zone row".into(),
        })?;
        let server_id: u32 = server_id.trim().parse().map_err(|_| ReplError::ProtocolFatal {
            message: "primary server_id unparsable".into(),
        })?;
        self.master_server_id = Some(server_id);
        if collation.trim() != "utf8mb4_general_ci" {
            warn!(collation = %collation, "primary collation differs from local default");
        }
        if time_zone.trim() != "SYSTEM" {
            warn!(time_zone = %time_zone, "primary time zone differs from local default");
        }
        Ok(())
    }

    async fn step_e_set_session_vars(&mut self) -> Result<(), ReplError> {
        self.conn
            .query_scalar(&format!("set @slave_uuid = '{}'", self.config.self_uuid))
            .await?;
        self.conn.query_scalar("set @dump_thread_wait_sleep_usec = 0").await?;
        self.conn.query_scalar("set @master_heartbeat_period = 0").await?;
        self.conn.query_scalar("set @master_binlog_checksum = 'CRC32'").await?;
        Ok(())
    }

    async fn step_f_register_as_slave(&mut self) -> Result<(), ReplError> {
        let payload = format!("{}:{}", self.config.master_host, self.config.master_port);
        self.conn.send_command(0x15, payload.as_bytes()).await
    }

    async fn step_g_issue_dump(
        &mut self,
        master_coord: &Coordinate,
        retrieved_gtids: &GtidSet,
        logged_gtids: &GtidSet,
        last_retrieved: Option<Gtid>,
    ) -> Result<(), ReplError> {
        let req = build_dump_request(
            self.config.auto_position,
            master_coord,
            retrieved_gtids,
            logged_gtids,
            last_retrieved,
            self.config.self_server_id,
            0,
        );
        let buf = encode_dump_request(&req);
        self.conn.send_command(crate::dump::DUMP_OPCODE, &buf).await
    }

    pub async fn read_packet(&mut self) -> Result<PacketOutcome, ReplError> {
        self.conn.read_packet().await
    }

    pub fn disconnect(&mut self) {
        self.state = LinkState::Disconnected;
    }

    /// Bounded reconnect: sleeps `connect_retry_secs` between attempts,
    /// gives up with `NetworkFatal` after `retry_count` consecutive
    /// failures. Fatal (non-retryable) handshake errors surface immediately.
    pub async fn reconnect_with_backoff(
        &mut self,
        master_coord: &Coordinate,
        retrieved_gtids: &GtidSet,
        logged_gtids: &GtidSet,
        last_retrieved: Option<Gtid>,
    ) -> Result<(), ReplError> {
        let mut attempts = 0u32;
        loop {
            match self
                .connect_and_handshake(master_coord, retrieved_gtids, logged_gtids, last_retrieved)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    attempts += 1;
                    if attempts >= self.config.retry_count {
                        return Err(ReplError::NetworkFatal {
                            message: format!("giving up after {attempts} reconnect attempts: {e}"),
                        });
                    }
                    warn!(attempt = attempts, error = %e, "reconnect attempt failed, retrying");
                    tokio::time::sleep(Duration::from_secs(self.config.connect_retry_secs)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn encode_dump_request(req: &DumpRequest) -> Vec<u8> {
    match req {
        DumpRequest::FileOffset {
            file,
            offset,
            server_id,
            flags,
        } => {
            let mut buf = Vec::new();
            buf.extend_from_slice(&flags.to_be_bytes());
            buf.extend_from_slice(&server_id.to_be_bytes());
            buf.extend_from_slice(&offset.to_be_bytes());
            buf.extend_from_slice(file.as_bytes());
            buf
        }
        DumpRequest::AutoPosition { server_id, flags, gtid_set } => {
            let mut buf = Vec::new();
            buf.push(1);
            buf.extend_from_slice(&flags.to_be_bytes());
            buf.extend_from_slice(&server_id.to_be_bytes());
            buf.extend_from_slice(&gtid_set.encode_binary());
            buf
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedConn {
        uuid_reply: String,
        server_row: Vec<String>,
        packets: Mutex<VecDeque<PacketOutcome>>,
    }

    #[async_trait]
    impl MasterConn for ScriptedConn {
        async fn connect(&mut self, _host: &str, _port: u16, _timeout: Duration) -> Result<(), ReplError> {
            Ok(())
        }
        async fn authenticate(&mut self, _user: &str) -> Result<(), ReplError> {
            Ok(())
        }
        async fn query_scalar(&mut self, query: &str) -> Result<String, ReplError> {
            if query.contains("server_uuid") {
                Ok(self.uuid_reply.clone())
            } else {
                Ok(String::new())
            }
        }
        async fn query_row(&mut self, _query: &str) -> Result<Vec<String>, ReplError> {
            Ok(self.server_row.clone())
        }
        async fn send_command(&mut self, _opcode: u8, _buf: &[u8]) -> Result<(), ReplError> {
            Ok(())
        }
        async fn read_packet(&mut self) -> Result<PacketOutcome, ReplError> {
            self.packets
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ReplError::NetworkFatal {
                    message: "no more scripted packets".into(),
                })
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
            auto_position: false,
        }
    }

    #[tokio::test]
    async fn handshake_fails_on_same_uuid_without_flag() {
        let self_uuid = Uuid::from_bytes([1; 16]);
        let conn = ScriptedConn {
            uuid_reply: self_uuid.to_string(),
            server_row: vec!["1".into(), "utf8mb4_general_ci".into(), "SYSTEM".into()],
            packets: Mutex::new(VecDeque::new()),
        };
        let mut link = MasterLink::new(conn, test_config(self_uuid));
        let result = link
            .connect_and_handshake(&Coordinate::new("mysql-bin.000001".into(), 4), &GtidSet::new(), &GtidSet::new(), None)
            .await;
        assert!(matches!(result, Err(ReplError::ProtocolFatal { .. })));
    }

    #[tokio::test]
    async fn handshake_succeeds_with_distinct_uuid() {
        let self_uuid = Uuid::from_bytes([1; 16]);
        let master_uuid = Uuid::from_bytes([2; 16]);
        let conn = ScriptedConn {
            uuid_reply: master_uuid.to_string(),
            server_row: vec!["1".into(), "utf8mb4_general_ci".into(), "SYSTEM".into()],
            packets: Mutex::new(VecDeque::new()),
        };
        let mut link = MasterLink::new(conn, test_config(self_uuid));
        link.connect_and_handshake(&Coordinate::new("mysql-bin.000001".into(), 4), &GtidSet::new(), &GtidSet::new(), None)
            .await
            .unwrap();
        assert_eq!(link.state(), LinkState::Dumping);
        assert_eq!(link.master_uuid, Some(master_uuid));
    }
}
