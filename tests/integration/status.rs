use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Status
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_status_and_task_types() -> Result<()> {
    let server = spawn_server().await?;

    let status = server.api_get("/status").await?;
    assert_eq!(status["name"], "pipestep");
    assert!(status["version"].is_string(), "missing version");

    let types = server.api_get("/tasks").await?;
    assert_eq!(types["taskTypes"], status["taskTypes"]);
    let types = types["taskTypes"].as_array().context("taskTypes")?;
    for expected in ["http", "jsonparse", "multiply", "median", "any"] {
        assert!(types.iter().any(|t| t == expected), "missing {expected}");
    }
    Ok(())
}

#[tokio::test]
async fn test_cors_allows_any_origin() -> Result<()> {
    let server = spawn_server().await?;

    let resp = server
        .client()
        .get(format!("{}/status", server.base))
        .header("origin", "http://simulator.local")
        .send()
        .await?;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    Ok(())
}
