//! Layered YAML configuration loading plus the replication knob set.

mod knobs;
mod layered;

pub use knobs::{ReplicationConfig, SkipErrors, DDL_EXIST_ERROR_CODES};
pub use layered::{load_layered_yaml, LoadedConfig};
