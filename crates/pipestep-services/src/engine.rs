//! Task engine contract.
//!
//! The step executor only knows this trait: construct a handle for a task
//! type and its options, then run the handle against an environment and the
//! positional results of upstream nodes. The built-in implementation lives in
//! `tasks`; tests substitute their own.

use std::future::Future;

use pipestep_core::{Environment, NativeValue};

use crate::resolver::ResolveError;

/// Outcome of one task run.
///
/// `error` is a task-level failure (an upstream fetch failed, a value did not
/// parse). It is reported to the client next to `value` and never aborts the
/// step.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub value: NativeValue,
    pub error: Option<String>,
}

impl TaskRun {
    pub fn ok(value: NativeValue) -> Self {
        Self { value, error: None }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            value: NativeValue::Null,
            error: Some(error.to_string()),
        }
    }
}

pub trait TaskEngine: Send + Sync {
    /// A constructed, ready-to-run task.
    type Handle: Send + Sync;

    /// Construct a task from its type name and raw options.
    fn resolve(
        &self,
        task_type: &str,
        options: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self::Handle, ResolveError>;

    /// Run a constructed task. `inputs` are the decoded results of the
    /// upstream nodes whose result propagates, in order.
    fn run(
        &self,
        handle: &Self::Handle,
        env: &Environment,
        inputs: &[NativeValue],
    ) -> impl Future<Output = TaskRun> + Send;
}
