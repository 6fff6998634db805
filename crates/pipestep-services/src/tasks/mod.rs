//! Built-in task engine.
//!
//! `Engine` resolves task types through `resolver` and runs them here. Task
//! failures become `TaskRun::error`; nothing in this module fails the step.

mod http;
mod interpolate;
mod math;
mod parse;
mod text;

use pipestep_core::config::EngineConfig;
use pipestep_core::environment::LookupError;
use pipestep_core::{Environment, NativeValue};
use serde_json::{Map, Value};

use crate::engine::{TaskEngine, TaskRun};
use crate::resolver::{self, ResolveError, Task};

/// Task-level failure, reported in the step response.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("option {0:?} is empty and there is no input to use instead")]
    MissingOption(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("no values to aggregate")]
    NoValues,

    #[error("too many faults: {faults} of {total} values unusable, {allowed} allowed")]
    TooManyFaults {
        faults: usize,
        total: usize,
        allowed: usize,
    },

    #[error("division by zero")]
    DivideByZero,

    #[error("no inputs")]
    NoInputs,

    #[error("{0}")]
    Http(String),
}

#[derive(Clone)]
pub struct Engine {
    http: http::Clients,
}

impl Engine {
    pub fn new(settings: &EngineConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: http::Clients::new(settings)?,
        })
    }

    async fn run_task(
        &self,
        task: &Task,
        env: &Environment,
        inputs: &[NativeValue],
    ) -> Result<NativeValue, TaskError> {
        match task {
            Task::Http(o) => http::fetch(&self.http, o, env).await,
            Task::Mean(o) => math::mean(o, env, inputs),
            Task::Median(o) => math::median(o, env, inputs),
            Task::Mode(o) => math::mode(o, env, inputs),
            Task::Sum(o) => math::sum(o, env, inputs),
            Task::Multiply(o) => math::multiply(o, env, inputs),
            Task::Divide(o) => math::divide(o, env, inputs),
            Task::LessThan(o) => math::less_than(o, env, inputs),
            Task::Length(o) => math::length(o, env, inputs),
            Task::Lowercase(o) => text::lowercase(o, env, inputs),
            Task::Uppercase(o) => text::uppercase(o, env, inputs),
            Task::Lookup(o) => text::lookup(o, env, inputs),
            Task::JsonParse(o) => parse::json_parse(o, env, inputs),
            Task::CborParse(o) => parse::cbor_parse(o, env, inputs),
            Task::Any => inputs.first().cloned().ok_or(TaskError::NoInputs),
        }
    }
}

impl TaskEngine for Engine {
    type Handle = Task;

    fn resolve(&self, task_type: &str, options: &Map<String, Value>) -> Result<Task, ResolveError> {
        resolver::resolve(task_type, options)
    }

    async fn run(&self, task: &Task, env: &Environment, inputs: &[NativeValue]) -> TaskRun {
        match self.run_task(task, env, inputs).await {
            Ok(value) => TaskRun::ok(value),
            Err(e) => {
                tracing::debug!(task_type = %task.task_type(), error = %e, "task failed");
                TaskRun::failed(e)
            }
        }
    }
}
