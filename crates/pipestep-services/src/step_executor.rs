//! Step executor — runs one pipeline node per call.
//!
//! Stages: decode the environment and prior inputs, resolve the task, run it,
//! fold the result into the environment under the node id, encode. A mock
//! response skips resolve and run. Task-level failures are carried in
//! `StepOutcome::error`; only decode, resolve and encode failures abort.

use pipestep_core::codec::{self, CodecError, Token};
use pipestep_core::{Environment, NativeValue};
use serde_json::{Map, Value};

use crate::engine::{TaskEngine, TaskRun};
use crate::resolver::ResolveError;

/// One node execution request.
#[derive(Debug, Clone, Default)]
pub struct TaskInvocation {
    pub node_id: String,
    pub task_type: String,
    pub options: Map<String, Value>,
    /// Tokens of the propagated upstream results, in order.
    pub prior_inputs: Vec<String>,
    /// Environment token from the previous step; absent on the first.
    pub environment: Option<String>,
    /// Stand-in result; when set the task is not run.
    pub mock_response: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub value: NativeValue,
    pub value_token: Token,
    pub environment: Environment,
    pub environment_token: Token,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("node id must not be empty")]
    EmptyNodeId,

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: CodecError,
    },
}

impl StepError {
    /// The stage the step stopped in.
    pub fn stage(&self) -> &'static str {
        match self {
            StepError::EmptyNodeId | StepError::Decode { .. } => "decode",
            StepError::Resolve(_) => "resolve",
            StepError::Encode { .. } => "encode",
        }
    }

    /// Whether the caller sent something unusable, as opposed to a fault of
    /// this service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, StepError::Encode { .. })
    }
}

pub struct StepExecutor<E> {
    engine: E,
}

impl<E: TaskEngine> StepExecutor<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn execute(&self, inv: TaskInvocation) -> Result<StepOutcome, StepError> {
        let node_id = inv.node_id.trim().to_string();
        if node_id.is_empty() {
            return Err(StepError::EmptyNodeId);
        }

        let mut env = Environment::decode(inv.environment.as_deref()).map_err(|source| {
            StepError::Decode {
                what: "environment".to_string(),
                source,
            }
        })?;
        let inputs = inv
            .prior_inputs
            .iter()
            .enumerate()
            .map(|(i, token)| {
                codec::decode(token).map_err(|source| StepError::Decode {
                    what: format!("prior input {i}"),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            node_id = %node_id,
            stage = "decoded",
            variables = env.len(),
            inputs = inputs.len(),
            "step stage"
        );

        let run = match inv.mock_response {
            Some(mock) => {
                let value = NativeValue::from_json(mock);
                if !codec::fits_environment(&value) {
                    return Err(StepError::Decode {
                        what: "mock response".to_string(),
                        source: CodecError::TooDeep,
                    });
                }
                tracing::debug!(node_id = %node_id, stage = "mocked", "step stage");
                TaskRun::ok(value)
            }
            None => {
                let handle = self.engine.resolve(&inv.task_type, &inv.options)?;
                tracing::debug!(
                    node_id = %node_id,
                    task_type = %inv.task_type,
                    stage = "resolved",
                    "step stage"
                );
                let mut run = self.engine.run(&handle, &env, &inputs).await;
                if !codec::fits_environment(&run.value) {
                    run = TaskRun::failed(CodecError::TooDeep);
                }
                tracing::debug!(
                    node_id = %node_id,
                    stage = "executed",
                    failed = run.error.is_some(),
                    "step stage"
                );
                run
            }
        };

        let TaskRun { value, error } = run;
        env.insert(node_id.clone(), value.clone());

        let value_token = codec::encode(&value).map_err(|source| StepError::Encode {
            what: "task result",
            source,
        })?;
        let environment_token = env.encode().map_err(|source| StepError::Encode {
            what: "environment",
            source,
        })?;
        tracing::debug!(node_id = %node_id, stage = "encoded", "step stage");

        Ok(StepOutcome {
            value,
            value_token,
            environment: env,
            environment_token,
            error,
        })
    }
}
