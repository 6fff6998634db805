//! Single step execution.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body, read_json_file};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest<'a> {
    pub node_id: &'a str,
    pub task_type: &'a str,
    pub options: &'a serde_json::Map<String, serde_json::Value>,
    pub prior_inputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<&'a serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub value: String,
    pub value_token: String,
    pub environment: serde_json::Map<String, serde_json::Value>,
    pub environment_token: String,
    pub error: String,
}

pub async fn send<T: Serialize + ?Sized>(port: u16, body: &T) -> Result<TaskResponse> {
    post_json_body(&format!("{}/task", base_url(port)), body).await
}

pub async fn cmd_step(port: u16, path: &str) -> Result<()> {
    let body = read_json_file(path)?;
    let resp = send(port, &body).await?;

    if resp.error.is_empty() {
        println!("value            : {}", resp.value);
    } else {
        println!("error            : {}", resp.error);
    }
    println!("valueToken       : {}", resp.value_token);
    println!("environmentToken : {}", resp.environment_token);
    println!();
    println!("{}", serde_json::to_string_pretty(&resp.environment)?);

    Ok(())
}
