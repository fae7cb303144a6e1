use std::time::Duration;

use async_trait::async_trait;
use repl_schemas::{Event, ReplError};

/// One read from the primary's dump stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketOutcome {
    Event(Event),
    /// The primary closed the dump connection cleanly (COM_QUIT-equivalent).
    DumpClosed,
}

/// Wire-protocol collaborator boundary. `MasterLink` never touches a socket
/// directly; every handshake step and the dump read loop go through this
/// trait so tests can script a primary's responses deterministically.
#[async_trait]
pub trait MasterConn: Send + Sync {
    async fn connect(&mut self, host: &str, port: u16, connect_timeout: Duration) -> Result<(), ReplError>;
    async fn authenticate(&mut self, user: &str) -> Result<(), ReplError>;
    async fn query_scalar(&mut self, query: &str) -> Result<String, ReplError>;
    async fn query_row(&mut self, query: &str) -> Result<Vec<String>, ReplError>;
    async fn send_command(&mut self, opcode: u8, buf: &[u8]) -> Result<(), ReplError>;
    async fn read_packet(&mut self) -> Result<PacketOutcome, ReplError>;
}
