use crate::*;
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
//  Step-by-step pipeline runs
// ══════════════════════════════════════════════════════════════════════════════

/// Graph, then every node in order: fetch from a local upstream, parse the
/// body, scale the price. Each call carries the previous environment token
/// and the propagated result tokens.
#[tokio::test]
async fn test_fetch_parse_scale() -> Result<()> {
    let server = spawn_server().await?;
    let url = spawn_upstream("/price", json!({ "data": { "usd": "2.5" } })).await?;

    let spec = format!(
        r#"
        fetch [type=http url="{url}" allowUnrestrictedNetworkAccess=true];
        parse [type=jsonparse path="data,usd"];
        scale [type=multiply times=100];
        fetch -> parse -> scale;
        "#
    );
    let graph = server.api_post("/graph", &json!({ "spec": spec })).await?;
    assert_eq!(graph["error"], "");
    let tasks = graph["tasks"].as_array().context("tasks")?;

    let mut environment = Value::Null;
    let mut results = serde_json::Map::new();
    for task in tasks {
        let prior: Vec<Value> = task["dependencies"]
            .as_array()
            .context("dependencies")?
            .iter()
            .filter(|d| d["propagateResult"] == true)
            .map(|d| results[d["id"].as_str().unwrap_or_default()].clone())
            .collect();

        let resp = server
            .step(json!({
                "nodeId": task["id"],
                "taskType": task["taskType"],
                "options": task["options"],
                "priorInputs": prior,
                "environment": environment,
            }))
            .await?;
        assert_eq!(resp["error"], "", "{} failed: {}", task["id"], resp["error"]);

        results.insert(task["id"].as_str().unwrap_or_default().to_string(), resp["valueToken"].clone());
        environment = resp["environmentToken"].clone();
        if task["id"] == "scale" {
            let scaled: f64 = resp["value"].as_str().unwrap_or_default().parse()?;
            assert_eq!(scaled, 250.0);
            assert_eq!(resp["environment"]["parse"], "2.5");
            assert!(resp["environment"]["fetch"].as_str().unwrap_or_default().contains("usd"));
        }
    }
    assert_eq!(results.len(), 3);
    Ok(())
}

/// A mocked node never runs, but downstream nodes see its value through the
/// environment exactly as if it had.
#[tokio::test]
async fn test_mock_feeds_downstream_lookup() -> Result<()> {
    let server = spawn_server().await?;

    let a = server
        .step(json!({
            "nodeId": "quote",
            "taskType": "http",
            "mockResponse": { "price": 12 },
        }))
        .await?;
    assert_eq!(a["error"], "");
    assert_eq!(a["environment"]["quote"]["price"], "12");

    let b = server
        .step(json!({
            "nodeId": "price",
            "taskType": "lookup",
            "options": { "input": "$(quote)", "key": "price" },
            "environment": a["environmentToken"],
        }))
        .await?;
    assert_eq!(b["error"], "");
    assert_eq!(b["value"], "12");
    assert_eq!(b["environment"]["price"], "12");
    assert_eq!(b["environment"]["quote"]["price"], "12");
    Ok(())
}

/// A task-level failure still answers 200; the node is folded as null and the
/// run can continue.
#[tokio::test]
async fn test_task_error_is_reported_and_run_continues() -> Result<()> {
    let server = spawn_server().await?;

    let failed = server
        .step(json!({
            "nodeId": "ratio",
            "taskType": "divide",
            "options": { "input": 10, "divisor": 0 },
        }))
        .await?;
    assert_eq!(failed["error"], "division by zero");
    assert_eq!(failed["environment"]["ratio"], Value::Null);

    let next = server
        .step(json!({
            "nodeId": "label",
            "taskType": "uppercase",
            "options": { "input": "done" },
            "environment": failed["environmentToken"],
        }))
        .await?;
    assert_eq!(next["value"], "DONE");
    assert!(next["environment"].as_object().context("environment")?.contains_key("ratio"));
    Ok(())
}

/// Aggregates take every propagated input, in the order given.
#[tokio::test]
async fn test_median_over_prior_inputs() -> Result<()> {
    let server = spawn_server().await?;

    let mut tokens = Vec::new();
    let mut environment = Value::Null;
    for (id, price) in [("a", 3), ("b", 1), ("c", 2)] {
        let resp = server
            .step(json!({ "nodeId": id, "mockResponse": price, "environment": environment }))
            .await?;
        tokens.push(resp["valueToken"].clone());
        environment = resp["environmentToken"].clone();
    }

    let median = server
        .step(json!({
            "nodeId": "median",
            "taskType": "median",
            "priorInputs": tokens,
            "environment": environment,
        }))
        .await?;
    assert_eq!(median["error"], "");
    assert_eq!(median["value"].as_str().unwrap_or_default().parse::<f64>()?, 2.0);
    assert_eq!(median["environment"].as_object().context("environment")?.len(), 4);
    Ok(())
}
