//! /task — execute one pipeline node.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use pipestep_core::Token;
use pipestep_services::{StepError, TaskInvocation};

use super::{json_body, ApiState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskRequest {
    pub node_id: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub prior_inputs: Vec<String>,
    #[serde(default)]
    pub environment: Option<String>,
    /// `null` and absent both mean "run the task".
    #[serde(default)]
    pub mock_response: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub value: String,
    pub value_token: Token,
    pub environment: Map<String, Value>,
    pub environment_token: Token,
    /// Task-level failure message, empty on success.
    pub error: String,
}

pub async fn handle_task(
    State(state): State<ApiState>,
    payload: Result<Json<TaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    let req = json_body(payload)?;
    let invocation = TaskInvocation {
        node_id: req.node_id,
        task_type: req.task_type,
        options: req.options,
        prior_inputs: req.prior_inputs,
        environment: req.environment,
        mock_response: req.mock_response,
    };

    let outcome = state
        .executor
        .execute(invocation)
        .await
        .map_err(step_failure)?;

    Ok(Json(TaskResponse {
        value: outcome.value.to_string(),
        value_token: outcome.value_token,
        environment: outcome.environment.to_json(),
        environment_token: outcome.environment_token,
        error: outcome.error.unwrap_or_default(),
    }))
}

fn step_failure(err: StepError) -> (StatusCode, String) {
    if err.is_client_error() {
        tracing::warn!(stage = err.stage(), error = %err, "step rejected");
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        tracing::error!(stage = err.stage(), error = %err, "step failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipestep_core::config::EngineConfig;
    use pipestep_core::{codec, Environment};
    use pipestep_services::Engine;
    use serde_json::json;

    fn state() -> State<ApiState> {
        State(ApiState::new(Engine::new(&EngineConfig::default()).unwrap()))
    }

    fn request(v: Value) -> Result<Json<TaskRequest>, JsonRejection> {
        Ok(Json(serde_json::from_value(v).unwrap()))
    }

    #[tokio::test]
    async fn runs_a_task_and_folds_the_result() {
        let Json(resp) = handle_task(
            state(),
            request(json!({
                "nodeId": "shout",
                "taskType": "uppercase",
                "options": { "input": "hello" },
            })),
        )
        .await
        .unwrap();

        assert_eq!(resp.value, "HELLO");
        assert_eq!(resp.error, "");
        assert_eq!(resp.environment["shout"], json!("HELLO"));
        let env = Environment::decode(Some(resp.environment_token.as_str())).unwrap();
        assert_eq!(env.get("shout").and_then(|v| v.as_text()), Some("HELLO"));
    }

    #[tokio::test]
    async fn prior_inputs_feed_the_task() {
        let Json(first) = handle_task(
            state(),
            request(json!({ "nodeId": "a", "mockResponse": "Quiet" })),
        )
        .await
        .unwrap();

        let Json(second) = handle_task(
            state(),
            request(json!({
                "nodeId": "b",
                "taskType": "lowercase",
                "priorInputs": [first.value_token.as_str()],
                "environment": first.environment_token.as_str(),
            })),
        )
        .await
        .unwrap();

        assert_eq!(second.value, "quiet");
        assert_eq!(second.environment["a"], json!("Quiet"));
        assert_eq!(second.environment["b"], json!("quiet"));
        assert_eq!(
            codec::decode(second.value_token.as_str()).unwrap().as_text(),
            Some("quiet")
        );
    }

    #[tokio::test]
    async fn task_error_is_ok_with_error_field() {
        let Json(resp) = handle_task(
            state(),
            request(json!({ "nodeId": "first", "taskType": "any" })),
        )
        .await
        .unwrap();
        assert_eq!(resp.value, "null");
        assert_eq!(resp.error, "no inputs");
        assert_eq!(resp.environment["first"], Value::Null);
    }

    #[tokio::test]
    async fn unknown_task_type_is_bad_request() {
        let err = handle_task(
            state(),
            request(json!({ "nodeId": "a", "taskType": "teleport" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("teleport"));
    }

    #[tokio::test]
    async fn corrupt_environment_is_bad_request() {
        let err = handle_task(
            state(),
            request(json!({ "nodeId": "a", "mockResponse": 1, "environment": "not base64!" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("environment"));
    }

    #[test]
    fn node_id_is_required() {
        let parsed: Result<TaskRequest, _> = serde_json::from_value(json!({ "taskType": "any" }));
        assert!(parsed.is_err());
    }
}
