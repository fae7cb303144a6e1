//! Data types shared across the replication slave core: coordinates, GTIDs,
//! the opaque event shape, the error taxonomy, and the per-primary state
//! records. No IO lives here — every type is plain data.

mod coordinate;
mod error;
mod event;
mod gtid;
mod state;

pub use coordinate::{Coordinate, BIN_LOG_HEADER_SIZE};
pub use error::{ErrorEvent, ReplError};
pub use event::{ChecksumAlg, Event, EventPayload};
pub use gtid::{Gtid, GtidSet};
pub use state::{ApplierState, CaughtUpState, ReceiverState, RunningState, UntilCondition};
