//! Typed variable conversion.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, post_json_body, read_json_file};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarHelperResponse {
    pub environment: serde_json::Map<String, serde_json::Value>,
    pub environment_token: String,
}

/// Send a var-helper request body (`{ vars, jobRun, jobSpec }`) read from `path`.
pub async fn convert_file(port: u16, path: &str) -> Result<VarHelperResponse> {
    let body = read_json_file(path)?;
    post_json_body(&format!("{}/var-helper", base_url(port)), &body).await
}

pub async fn cmd_vars(port: u16, path: &str) -> Result<()> {
    let resp = convert_file(port, path).await?;

    println!("{}", serde_json::to_string_pretty(&resp.environment)?);
    println!();
    println!("environmentToken: {}", resp.environment_token);

    Ok(())
}
