//! CLI command modules.

pub mod graph;
pub mod http;
pub mod run;
pub mod status;
pub mod step;
pub mod vars;
