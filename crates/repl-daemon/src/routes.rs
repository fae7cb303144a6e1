//! Axum router and HTTP handlers for the control-plane surface.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers. Handlers are `pub(crate)` so the scenario
//! tests under `tests/` can compose the router directly.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use repl_controller::{ChangeMasterOutcome, ChangeMasterParams, ResetOutcome, StopOutcome};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::api_types::{ErrorResponse, HealthResponse, ResetRequest, SkipErrorsRequest, ThreadMaskRequest};
use crate::state::{AppState, BusMsg};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/start", post(start))
        .route("/v1/stop", post(stop))
        .route("/v1/change-master", post(change_master))
        .route("/v1/reset", post(reset))
        .route("/v1/set-skip-errors", post(set_skip_errors))
        .with_state(state)
}

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { ok: true, service: st.build.service, version: st.build.version }))
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> Response {
    match st.controller.status(&st.primary_id).await {
        Ok(row) => {
            let _ = st.bus.send(BusMsg::Status(row.clone()));
            (StatusCode::OK, Json(row)).into_response()
        }
        Err(e) => not_found(&e),
    }
}

pub(crate) async fn start(State(st): State<Arc<AppState>>, Json(body): Json<ThreadMaskRequest>) -> Response {
    match st.controller.start(&st.primary_id, body.resolve()).await {
        Ok(()) => {
            info!(primary_id = %st.primary_id, "start");
            let _ = st.bus.send(BusMsg::LogLine { level: "INFO".into(), msg: "start".into() });
            StatusCode::OK.into_response()
        }
        Err(e) => not_found(&e),
    }
}

pub(crate) async fn stop(State(st): State<Arc<AppState>>, Json(body): Json<ThreadMaskRequest>) -> Response {
    match st.controller.stop(&st.primary_id, body.resolve()).await {
        Ok(outcome) => {
            let code = if outcome == StopOutcome::Stopped { StatusCode::OK } else { StatusCode::GATEWAY_TIMEOUT };
            info!(primary_id = %st.primary_id, ?outcome, "stop");
            (code, Json(outcome)).into_response()
        }
        Err(e) => not_found(&e),
    }
}

pub(crate) async fn change_master(State(st): State<Arc<AppState>>, Json(params): Json<ChangeMasterParams>) -> Response {
    match st.controller.change_master(&st.primary_id, params, false).await {
        Ok(ChangeMasterOutcome::Ok) => {
            let _ = st.bus.send(BusMsg::LogLine { level: "INFO".into(), msg: "change_master applied".into() });
            (StatusCode::OK, Json(ChangeMasterOutcome::Ok)).into_response()
        }
        Ok(outcome) => (StatusCode::CONFLICT, Json(outcome)).into_response(),
        Err(e) => not_found(&e),
    }
}

pub(crate) async fn reset(State(st): State<Arc<AppState>>, Json(body): Json<ResetRequest>) -> Response {
    match st.controller.reset(&st.primary_id, body.purge).await {
        Ok(ResetOutcome::Ok) => {
            let _ = st.bus.send(BusMsg::LogLine { level: "WARN".into(), msg: "reset applied".into() });
            (StatusCode::OK, Json(ResetOutcome::Ok)).into_response()
        }
        Ok(outcome) => (StatusCode::CONFLICT, Json(outcome)).into_response(),
        Err(e) => not_found(&e),
    }
}

pub(crate) async fn set_skip_errors(State(st): State<Arc<AppState>>, Json(body): Json<SkipErrorsRequest>) -> Response {
    match st.controller.set_skip_errors(&st.primary_id, &body.spec).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e.to_string() })).into_response(),
    }
}

fn not_found(e: &anyhow::Error) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: e.to_string() })).into_response()
}

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);
    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(rx: broadcast::Receiver<BusMsg>) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Status(_) => "status",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None,
        }
    })
}
