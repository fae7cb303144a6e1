//! Request and response types for the control-plane HTTP endpoints. These
//! carry no business logic; they exist so routes.rs can decode bodies and
//! Axum can JSON-encode responses.

use repl_controller::ThreadMask;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThreadMaskRequest {
    pub io: Option<bool>,
    pub sql: Option<bool>,
}

impl ThreadMaskRequest {
    pub fn resolve(&self) -> ThreadMask {
        ThreadMask {
            io: self.io.unwrap_or(true),
            sql: self.sql.unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub purge: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkipErrorsRequest {
    pub spec: String,
}

/// Response body when a control route is refused because of an unknown
/// primary id or a state-machine precondition.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
