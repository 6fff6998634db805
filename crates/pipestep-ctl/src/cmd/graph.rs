//! Dependency graph of a job spec.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

#[derive(Serialize)]
struct GraphRequest<'a> {
    spec: &'a str,
}

#[derive(Deserialize)]
pub struct GraphResponse {
    pub tasks: Vec<GraphTask>,
    pub error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphTask {
    pub id: String,
    pub task_type: String,
    pub options: serde_json::Map<String, serde_json::Value>,
    pub dependencies: Vec<GraphDependency>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDependency {
    pub id: String,
    pub propagate_result: bool,
}

/// Fetch the graph of the spec in `path`. A spec that does not parse is an error.
pub async fn fetch_graph(port: u16, path: &str) -> Result<GraphResponse> {
    let spec = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    let resp: GraphResponse =
        post_json_body(&format!("{}/graph", base_url(port)), &GraphRequest { spec: &spec }).await?;
    if !resp.error.is_empty() {
        bail!("{}: {}", path, resp.error);
    }
    Ok(resp)
}

pub async fn cmd_graph(port: u16, path: &str) -> Result<()> {
    let resp = fetch_graph(port, path).await?;

    println!("═══════════════════════════════════════");
    println!("  Pipeline ({} tasks, execution order)", resp.tasks.len());
    println!("═══════════════════════════════════════");

    for t in &resp.tasks {
        println!("  ┌─ {} [{}]", t.id, t.task_type);
        for (k, v) in &t.options {
            let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
            println!("  │  {:<8} = {}", k, v);
        }
        if t.dependencies.is_empty() {
            println!("  └─ no dependencies");
        } else {
            let deps: Vec<String> = t
                .dependencies
                .iter()
                .map(|d| {
                    if d.propagate_result {
                        d.id.clone()
                    } else {
                        format!("{} (reference)", d.id)
                    }
                })
                .collect();
            println!("  └─ after {}", deps.join(", "));
        }
    }

    Ok(())
}
