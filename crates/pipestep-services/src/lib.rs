//! pipestep-services — everything between the HTTP surface and the core
//! value types: the task engine and its resolver, the pipeline spec parser,
//! the graph extractor, the variable helper and the step executor.

pub mod engine;
pub mod graph;
pub mod resolver;
pub mod spec_parser;
pub mod step_executor;
pub mod tasks;
pub mod var_helper;

pub use engine::{TaskEngine, TaskRun};
pub use resolver::{ResolveError, Task, TaskType};
pub use step_executor::{StepError, StepExecutor, StepOutcome, TaskInvocation};
pub use tasks::Engine;
