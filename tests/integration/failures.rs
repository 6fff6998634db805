use crate::*;
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
//  Malformed requests
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_wrong_content_type_is_415() -> Result<()> {
    let server = spawn_server().await?;
    let (status, _) = server
        .api_post_raw("/task", "text/plain", r#"{"nodeId":"a"}"#)
        .await?;
    assert_eq!(status, 415);
    Ok(())
}

#[tokio::test]
async fn test_oversized_body_is_413() -> Result<()> {
    let server = spawn_server_with_limit(256).await?;
    let body = json!({ "nodeId": "a", "mockResponse": "x".repeat(4096) }).to_string();
    let (status, _) = server.api_post_raw("/task", "application/json", body).await?;
    assert_eq!(status, 413);
    Ok(())
}

#[tokio::test]
async fn test_envelope_errors_are_400() -> Result<()> {
    let server = spawn_server().await?;

    for body in [
        r#"{"nodeId":"#,
        r#"{"nodeId":"a"} trailing"#,
        r#"{"nodeId":"a","bogus":1}"#,
        r#"{"nodeId":7}"#,
        r#"[]"#,
    ] {
        let (status, text) = server.api_post_raw("/task", "application/json", body).await?;
        assert_eq!(status, 400, "{body} gave {status}: {text}");
        assert!(!text.is_empty(), "{body} gave an empty message");
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_task_type_is_400() -> Result<()> {
    let server = spawn_server().await?;
    let (status, text) = server
        .api_post_raw(
            "/task",
            "application/json",
            json!({ "nodeId": "a", "taskType": "ethtx" }).to_string(),
        )
        .await?;
    assert_eq!(status, 400);
    assert!(text.contains("ethtx"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_options_are_400() -> Result<()> {
    let server = spawn_server().await?;
    let (status, text) = server
        .api_post_raw(
            "/task",
            "application/json",
            json!({ "nodeId": "a", "taskType": "multiply", "options": { "factor": 2 } }).to_string(),
        )
        .await?;
    assert_eq!(status, 400);
    assert!(text.contains("factor"), "unexpected message: {text}");
    Ok(())
}

#[tokio::test]
async fn test_corrupt_tokens_are_400() -> Result<()> {
    let server = spawn_server().await?;

    let (status, text) = server
        .api_post_raw(
            "/task",
            "application/json",
            json!({ "nodeId": "a", "mockResponse": 1, "environment": "@@@" }).to_string(),
        )
        .await?;
    assert_eq!(status, 400);
    assert!(text.contains("environment"));

    // Well-formed base64, unknown version byte.
    let (status, text) = server
        .api_post_raw(
            "/task",
            "application/json",
            json!({ "nodeId": "b", "taskType": "any", "priorInputs": ["/w=="] }).to_string(),
        )
        .await?;
    assert_eq!(status, 400);
    assert!(text.contains("prior input 0"));
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Nesting limits
// ══════════════════════════════════════════════════════════════════════════════

fn nested(levels: usize) -> serde_json::Value {
    (0..levels).fold(json!(1), |v, _| json!([v]))
}

#[tokio::test]
async fn test_over_deep_passthrough_is_400() -> Result<()> {
    let server = spawn_server().await?;
    let (status, text) = server
        .api_post_raw(
            "/var-helper",
            "application/json",
            json!({ "vars": { "blob": { "passthrough": nested(70) } } }).to_string(),
        )
        .await?;
    assert_eq!(status, 400, "unexpected response: {text}");
    assert!(text.contains("blob"), "unexpected message: {text}");
    Ok(())
}

#[tokio::test]
async fn test_over_deep_mock_response_is_400() -> Result<()> {
    let server = spawn_server().await?;
    let (status, text) = server
        .api_post_raw(
            "/task",
            "application/json",
            json!({ "nodeId": "a", "mockResponse": nested(70) }).to_string(),
        )
        .await?;
    assert_eq!(status, 400, "unexpected response: {text}");
    assert!(text.contains("mock response"), "unexpected message: {text}");
    Ok(())
}

#[tokio::test]
async fn test_over_deep_task_result_is_a_task_error() -> Result<()> {
    let server = spawn_server().await?;
    let resp = server
        .step(json!({
            "nodeId": "parsed",
            "taskType": "jsonparse",
            "options": { "data": nested(70).to_string(), "path": "" },
        }))
        .await?;
    assert_eq!(resp["value"], "null");
    assert!(
        resp["error"].as_str().unwrap_or_default().contains("deeper"),
        "unexpected response: {resp}"
    );
    Ok(())
}
