//! /status and /tasks handlers.

use axum::Json;
use serde::Serialize;

use pipestep_services::TaskType;

// ── /tasks ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTypesResponse {
    pub task_types: Vec<&'static str>,
}

pub async fn handle_task_types() -> Json<TaskTypesResponse> {
    Json(TaskTypesResponse {
        task_types: task_types(),
    })
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub task_types: Vec<&'static str>,
}

pub async fn handle_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        name: "pipestep",
        version: env!("CARGO_PKG_VERSION"),
        task_types: task_types(),
    })
}

fn task_types() -> Vec<&'static str> {
    TaskType::ALL.iter().map(|t| t.as_str()).collect()
}
