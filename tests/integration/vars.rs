use crate::*;
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
//  Variable conversion
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_var_helper_builds_first_environment() -> Result<()> {
    let server = spawn_server().await?;

    let resp = server
        .api_post(
            "/var-helper",
            &json!({
                "vars": {
                    "symbol": { "type": "string", "value": "ETH" },
                    "ids": { "type": "int", "values": ["1", "2"] },
                },
                "jobRun": {
                    "payment": { "type": "int", "value": "1000000000000000000000" },
                },
            }),
        )
        .await?;

    assert_eq!(resp["environment"]["symbol"], "ETH");
    assert_eq!(resp["environment"]["ids"], json!(["1", "2"]));
    assert_eq!(resp["environment"]["jobRun"]["payment"], "1000000000000000000000");
    assert!(resp["environmentToken"].as_str().is_some_and(|t| !t.is_empty()));
    Ok(())
}

/// The var-helper token seeds the first step; nested job variables resolve
/// through dotted paths.
#[tokio::test]
async fn test_job_run_vars_reach_tasks() -> Result<()> {
    let server = spawn_server().await?;

    let vars = server
        .api_post(
            "/var-helper",
            &json!({
                "jobRun": { "payment": { "type": "int", "value": "1000000000000000000000" } },
            }),
        )
        .await?;

    let doubled = server
        .step(json!({
            "nodeId": "double",
            "taskType": "multiply",
            "options": { "input": "$(jobRun.payment)", "times": 2 },
            "environment": vars["environmentToken"],
        }))
        .await?;
    assert_eq!(doubled["error"], "");
    assert_eq!(doubled["value"].as_str().unwrap_or_default().parse::<f64>()?, 2e21);
    assert_eq!(doubled["environment"]["jobRun"]["payment"], "1000000000000000000000");
    Ok(())
}

#[tokio::test]
async fn test_bad_variable_is_rejected_with_its_name() -> Result<()> {
    let server = spawn_server().await?;

    let (status, text) = server
        .api_post_raw(
            "/var-helper",
            "application/json",
            json!({ "jobSpec": { "oracle": { "type": "address", "value": "0x1234" } } }).to_string(),
        )
        .await?;
    assert_eq!(status, 400);
    assert!(text.contains("jobSpec.oracle"), "unexpected message: {text}");
    Ok(())
}
