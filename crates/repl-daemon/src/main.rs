//! repl-daemon entry point.
//!
//! Thin: sets up tracing, builds shared state, wires middleware, and
//! starts the HTTP server. All route handlers live in `routes.rs`; all
//! shared state types live in `state.rs`. Wiring a live Receiver/Applier
//! pair into the `Controller` registry is left to the deployment's own
//! bootstrap (reading `ReplicationConfig`, opening `PositionStore` and
//! `RelayLog`, spawning the Receiver/Applier/Coordinator tasks) since that
//! depends on which `MasterConn`/`StorageEngine` implementations the
//! deployment plugs in. `Controller::register` loads `PositionStore`
//! itself and restores crash-safe coordinates before accepting the entry,
//! so the bootstrap only needs to construct the Receiver/Applier pair at
//! whatever coordinates it has on hand. A Coordinator-mode bootstrap that
//! wants `recovery_parallel_workers` gap-skipping must additionally call
//! `Coordinator::prime_recovery` with the same `PersistedState.workers` it
//! loaded, before handing the Coordinator off to `register`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use repl_controller::Controller;
use repl_daemon::{routes, state};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let primary_id = std::env::var("REPL_PRIMARY_ID").unwrap_or_else(|_| "default".to_string());
    let stop_wait_timeout = Duration::from_secs(
        std::env::var("REPL_STOP_WAIT_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
    );
    let controller = Arc::new(Controller::new(stop_wait_timeout));

    let shared = Arc::new(state::AppState::new(controller, primary_id));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)).on_response(DefaultOnResponse::new().level(Level::INFO)))
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8911)));
    info!("repl-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await.context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("REPL_DAEMON_ADDR").ok()?.parse().ok()
}

fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = ["http://localhost", "http://127.0.0.1"];
    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new().allow_origin(origins).allow_methods([Method::GET, Method::POST]).allow_headers(tower_http::cors::Any)
}
