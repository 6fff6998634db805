//! Graph extractor — projects a parsed pipeline into the node list clients
//! render and step through.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::spec_parser::{self, Dependency, ParseError, Pipeline};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub task_type: String,
    /// Node attributes other than `type`, ready to send as step options.
    pub options: Map<String, Value>,
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyGraph {
    pub tasks: Vec<GraphNode>,
}

impl From<Pipeline> for DependencyGraph {
    fn from(p: Pipeline) -> Self {
        let tasks = p
            .nodes
            .into_iter()
            .map(|n| GraphNode {
                id: n.id,
                task_type: n.task_type,
                options: n
                    .attrs
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
                dependencies: n.dependencies,
            })
            .collect();
        Self { tasks }
    }
}

pub fn extract(spec: &str) -> Result<DependencyGraph, ParseError> {
    spec_parser::parse(spec).map(DependencyGraph::from)
}

/// Like `extract`, but a parse failure yields an empty graph and the error
/// message so the caller can still render something.
pub fn extract_or_empty(spec: &str) -> (DependencyGraph, Option<String>) {
    match extract(spec) {
        Ok(graph) => (graph, None),
        Err(e) => {
            tracing::debug!(error = %e, "spec did not parse");
            (DependencyGraph::default(), Some(e.to_string()))
        }
    }
}
