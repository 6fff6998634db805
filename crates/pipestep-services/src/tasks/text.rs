//! String and lookup tasks.

use pipestep_core::{Environment, NativeValue};

use super::interpolate;
use super::TaskError;
use crate::resolver::{InputOptions, LookupOptions};

fn input_text(opts: &InputOptions, env: &Environment, inputs: &[NativeValue]) -> Result<String, TaskError> {
    let v = interpolate::value_or_input("input", &opts.input, env, inputs)?;
    Ok(match v.as_text() {
        Some(s) => s.to_string(),
        None => v.to_string(),
    })
}

pub fn lowercase(opts: &InputOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    Ok(NativeValue::String(input_text(opts, env, inputs)?.to_lowercase()))
}

pub fn uppercase(opts: &InputOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    Ok(NativeValue::String(input_text(opts, env, inputs)?.to_uppercase()))
}

/// Value under `key` in a map input, null when the key is missing.
pub fn lookup(opts: &LookupOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    let input = interpolate::value_or_input("input", &opts.input, env, inputs)?;
    let key = match interpolate::value(&opts.key, env)? {
        Some(k) => k.to_string(),
        None => return Err(TaskError::MissingOption("key".to_string())),
    };
    match input {
        NativeValue::Map(map) => Ok(map.get(&key).cloned().unwrap_or(NativeValue::Null)),
        other => Err(TaskError::InvalidInput(format!(
            "lookup expects a map input, got {}",
            other.kind_name()
        ))),
    }
}
