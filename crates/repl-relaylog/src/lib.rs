//! Append-only relay log: one appender, many readers, rotation into
//! `<base>.NNNNNN` files tracked by a line-oriented index.

mod index;
mod log;

pub use index::RelayLogIndex;
pub use log::{RelayLog, RelayLogReader};
