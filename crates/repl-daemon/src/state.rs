//! Shared runtime state for repl-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself beyond the heartbeat task `spawn_heartbeat` starts.

use std::sync::Arc;
use std::time::Duration;

use repl_controller::{Controller, StatusRow};
use serde::Serialize;
use tokio::sync::broadcast;

/// Messages broadcast over the internal event bus and surfaced as SSE
/// events on `GET /v1/stream`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusRow),
    LogLine { level: String, msg: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers. One daemon
/// process serves one primary; `primary_id` is the key under which that
/// primary's `ReplicaEntry` is registered with `controller`.
pub struct AppState {
    pub controller: Arc<Controller>,
    pub primary_id: String,
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, primary_id: impl Into<String>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            controller,
            primary_id: primary_id.into(),
            bus,
            build: BuildInfo {
                service: "repl-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
