//! /graph — dependency graph of a DOT job spec.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use pipestep_services::graph::{self, GraphNode};

use super::json_body;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphRequest {
    pub spec: String,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub tasks: Vec<GraphNode>,
    /// Parse failure message, empty when the spec parsed.
    pub error: String,
}

/// A spec that does not parse is not a request error: the response carries an
/// empty task list and the parser's message.
pub async fn handle_graph(
    payload: Result<Json<GraphRequest>, JsonRejection>,
) -> Result<Json<GraphResponse>, (StatusCode, String)> {
    let req = json_body(payload)?;
    let (graph, error) = graph::extract_or_empty(&req.spec);
    Ok(Json(GraphResponse {
        tasks: graph.tasks,
        error: error.unwrap_or_default(),
    }))
}
