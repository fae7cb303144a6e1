//! Connection lifecycle to the replication primary: handshake, capability
//! negotiation, dump request construction, and bounded reconnect.

mod conn;
mod dump;
mod link;

pub use conn::{MasterConn, PacketOutcome};
pub use dump::{auto_position_gtid_set, build_dump_request, DumpRequest, DUMP_OPCODE};
pub use link::{LinkConfig, LinkState, MasterLink};
