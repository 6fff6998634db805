//! /var-helper — typed variables in, first environment out.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use pipestep_core::{Token, TypedValue};
use pipestep_services::var_helper::{self, VarGroups};

use super::{bad_request, json_body};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VarHelperRequest {
    #[serde(default)]
    pub vars: BTreeMap<String, TypedValue>,
    #[serde(default)]
    pub job_run: Option<BTreeMap<String, TypedValue>>,
    #[serde(default)]
    pub job_spec: Option<BTreeMap<String, TypedValue>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarHelperResponse {
    pub environment: serde_json::Map<String, serde_json::Value>,
    pub environment_token: Token,
}

pub async fn handle_var_helper(
    payload: Result<Json<VarHelperRequest>, JsonRejection>,
) -> Result<Json<VarHelperResponse>, (StatusCode, String)> {
    let req = json_body(payload)?;
    let groups = VarGroups {
        vars: req.vars,
        job_run: req.job_run,
        job_spec: req.job_spec,
    };

    let env = var_helper::build_environment(&groups).map_err(bad_request)?;
    let environment_token = env.encode().map_err(|e| {
        tracing::error!(error = %e, "failed to encode environment");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(VarHelperResponse {
        environment: env.to_json(),
        environment_token,
    }))
}
