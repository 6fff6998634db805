//! Variable helper — turns typed request variables into the first
//! environment of a pipeline run.

use std::collections::BTreeMap;

use pipestep_core::codec::{self, MAX_DEPTH};
use pipestep_core::convert::{self, ConversionError, TypedValue};
use pipestep_core::{Environment, NativeValue};

pub const JOB_RUN: &str = "jobRun";
pub const JOB_SPEC: &str = "jobSpec";

/// Typed variables grouped the way a request carries them.
#[derive(Debug, Clone, Default)]
pub struct VarGroups {
    /// Top-level variables.
    pub vars: BTreeMap<String, TypedValue>,
    /// Nested under `jobRun`.
    pub job_run: Option<BTreeMap<String, TypedValue>>,
    /// Nested under `jobSpec`.
    pub job_spec: Option<BTreeMap<String, TypedValue>>,
}

/// Convert every group. A nested group is present in the result whenever it
/// was present in the request, even if empty. Errors name the variable by
/// its full path, e.g. `jobRun.payment`.
pub fn build_environment(groups: &VarGroups) -> Result<Environment, ConversionError> {
    let mut env = Environment::from_map(convert::convert_all(&groups.vars)?);

    for (name, group) in [(JOB_RUN, &groups.job_run), (JOB_SPEC, &groups.job_spec)] {
        if let Some(group) = group {
            let converted = convert::convert_all(group).map_err(|e| qualify(name, e))?;
            env.insert(name, NativeValue::Map(converted));
        }
    }

    check_depth(&env)?;
    tracing::debug!(variables = env.len(), "built environment");
    Ok(env)
}

/// Passthrough values may nest arbitrarily; the environment token may not.
fn check_depth(env: &Environment) -> Result<(), ConversionError> {
    for (name, value) in env {
        if codec::fits_environment(value) {
            continue;
        }
        let name = match value {
            NativeValue::Map(group) if name == JOB_RUN || name == JOB_SPEC => group
                .iter()
                .find(|(_, v)| v.depth() + 2 > MAX_DEPTH)
                .map(|(k, _)| format!("{name}.{k}"))
                .unwrap_or_else(|| name.clone()),
            _ => name.clone(),
        };
        return Err(ConversionError::InVariable {
            name,
            source: Box::new(ConversionError::TooDeep),
        });
    }
    Ok(())
}

fn qualify(prefix: &str, err: ConversionError) -> ConversionError {
    match err {
        ConversionError::InVariable { name, source } => ConversionError::InVariable {
            name: format!("{prefix}.{name}"),
            source,
        },
        other => other,
    }
}
