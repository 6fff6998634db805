//! HTTP API handlers — the step protocol as JSON over HTTP.

pub mod graph;
pub mod status;
pub mod task;
pub mod vars;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;

use pipestep_services::{Engine, StepExecutor};

#[derive(Clone)]
pub struct ApiState {
    pub executor: Arc<StepExecutor<Engine>>,
}

impl ApiState {
    pub fn new(engine: Engine) -> Self {
        Self {
            executor: Arc::new(StepExecutor::new(engine)),
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Unwrap a JSON body, turning extractor rejections into readable client
/// errors. Shape errors (422 from axum) are reported as 400; size and
/// content-type rejections keep their own status.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, (StatusCode, String)> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            let status = match rejection.status() {
                StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
                other => other,
            };
            tracing::debug!(%status, reason = %rejection.body_text(), "rejected request body");
            Err((status, rejection.body_text()))
        }
    }
}

fn bad_request(err: impl ToString) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

// Re-export handler functions for use in router setup.
pub use graph::handle_graph;
pub use status::{handle_status, handle_task_types};
pub use task::handle_task;
pub use vars::handle_var_helper;
