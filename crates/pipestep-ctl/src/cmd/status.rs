//! Service status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    name: String,
    version: String,
    task_types: Vec<String>,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  {} {}", resp.name, resp.version);
    println!("═══════════════════════════════════════");
    println!("  Task types ({}):", resp.task_types.len());
    for t in &resp.task_types {
        println!("    {}", t);
    }

    Ok(())
}
