//! pipestep integration test harness.
//!
//! Each test serves the real router on an ephemeral loopback port and talks
//! to it over HTTP, the way a pipeline client would. Nothing outside the
//! test process is required.

mod failures;
mod graph;
mod pipeline;
mod status;
mod vars;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use pipestep_api::ApiState;
use pipestep_core::config::{EngineConfig, ServerConfig};
use pipestep_services::Engine;

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct TestServer {
    pub base: String,
    client: reqwest::Client,
}

/// Serve the API with the default body limit.
pub async fn spawn_server() -> Result<TestServer> {
    spawn_server_with_limit(ServerConfig::default().max_body_bytes).await
}

pub async fn spawn_server_with_limit(max_body_bytes: usize) -> Result<TestServer> {
    let engine = Engine::new(&EngineConfig::default())?;
    let app = pipestep_api::router(ApiState::new(engine), max_body_bytes);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind test listener")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(TestServer {
        base: format!("http://{addr}/api"),
        client: reqwest::Client::new(),
    })
}

/// A throwaway upstream for the http task, answering every GET on `path`
/// with `body`. Returns the full URL.
pub async fn spawn_upstream(path: &'static str, body: Value) -> Result<String> {
    let app = axum::Router::new().route(
        path,
        axum::routing::get(move || {
            let body = body.clone();
            async move { axum::Json(body) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{addr}{path}"))
}

impl TestServer {
    pub async fn api_get(&self, path: &str) -> Result<Value> {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        expect_json(path, resp).await
    }

    pub async fn api_post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        expect_json(path, resp).await
    }

    /// POST arbitrary bytes and return the status and body text, success or not.
    pub async fn api_post_raw(
        &self,
        path: &str,
        content_type: &str,
        body: impl Into<String>,
    ) -> Result<(u16, String)> {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .header("content-type", content_type)
            .body(body.into())
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        let status = resp.status().as_u16();
        Ok((status, resp.text().await?))
    }

    /// One step call; `environment` and `prior_inputs` come from earlier responses.
    pub async fn step(&self, request: Value) -> Result<Value> {
        self.api_post("/task", &request).await
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

async fn expect_json(path: &str, resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        bail!("{path} returned {status}: {text}");
    }
    resp.json().await.with_context(|| format!("{path} did not return JSON"))
}
