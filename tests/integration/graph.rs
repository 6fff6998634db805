use crate::*;
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
//  Dependency graphs
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_graph_orders_and_flags_dependencies() -> Result<()> {
    let server = spawn_server().await?;

    let spec = r#"
        digraph job {
            total [type=sum];
            a [type=http url="https://example.com/a"];
            b [type=http url="https://example.com/b"];
            note [type=uppercase input="$(a)"];
            a -> total;
            b -> total;
        }
    "#;
    let graph = server.api_post("/graph", &json!({ "spec": spec })).await?;
    assert_eq!(graph["error"], "");

    let ids: Vec<&str> = graph["tasks"]
        .as_array()
        .context("tasks")?
        .iter()
        .filter_map(|t| t["id"].as_str())
        .collect();
    assert_eq!(ids, ["a", "b", "total", "note"]);

    let total = &graph["tasks"][2];
    assert_eq!(total["taskType"], "sum");
    assert_eq!(
        total["dependencies"],
        json!([
            { "id": "a", "propagateResult": true },
            { "id": "b", "propagateResult": true },
        ])
    );
    let note = &graph["tasks"][3];
    assert_eq!(note["dependencies"], json!([{ "id": "a", "propagateResult": false }]));
    assert_eq!(note["options"], json!({ "input": "$(a)" }));
    Ok(())
}

#[tokio::test]
async fn test_unparseable_spec_returns_empty_graph() -> Result<()> {
    let server = spawn_server().await?;

    let graph = server
        .api_post("/graph", &json!({ "spec": "a [type=any]; a -> a;" }))
        .await?;
    assert_eq!(graph["tasks"], json!([]));
    assert!(graph["error"].as_str().is_some_and(|e| e.contains("cycle")));
    Ok(())
}
