use async_trait::async_trait;
use repl_schemas::{ErrorEvent, RunningState};

/// What the Controller can observe about a live IO or SQL thread without
/// owning it. The thread itself (Receiver, single-threaded Applier, or
/// Coordinator) is spawned and driven by whoever wires a primary up
/// (`repl-daemon` in production, `repl-testkit` in tests); the Controller
/// only ever talks to it through this seam.
#[async_trait]
pub trait ReplicaThread: Send + Sync {
    async fn snapshot(&self) -> ThreadSnapshot;

    /// Arm the thread's run loop. Idempotent: calling it while already
    /// running is a no-op from the thread's point of view.
    fn request_start(&self);

    /// Cooperative stop: set abort, signal condvars. Does not block; the
    /// Controller polls `snapshot` to learn when the thread actually
    /// reaches `Stopped`.
    fn request_stop(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub running: RunningState,
    pub last_error: Option<ErrorEvent>,
}
