//! Task resolver — task type name + raw options → typed `Task`.
//!
//! Each supported type has one options struct. Raw options are first
//! canonicalised to a string map (the form a pipeline spec produces) and
//! then deserialized into that struct, so a step request and a parsed spec
//! build identical tasks.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown task type: {0:?}")]
    UnknownTaskType(String),

    #[error("invalid options for {task_type} task: {reason}")]
    InvalidOptions {
        task_type: &'static str,
        reason: String,
    },
}

// ── Task types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Http,
    Mean,
    Median,
    Mode,
    Sum,
    Multiply,
    Divide,
    LessThan,
    Length,
    Lowercase,
    Uppercase,
    Lookup,
    JsonParse,
    CborParse,
    Any,
}

impl TaskType {
    pub const ALL: [TaskType; 15] = [
        TaskType::Http,
        TaskType::Mean,
        TaskType::Median,
        TaskType::Mode,
        TaskType::Sum,
        TaskType::Multiply,
        TaskType::Divide,
        TaskType::LessThan,
        TaskType::Length,
        TaskType::Lowercase,
        TaskType::Uppercase,
        TaskType::Lookup,
        TaskType::JsonParse,
        TaskType::CborParse,
        TaskType::Any,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Http => "http",
            TaskType::Mean => "mean",
            TaskType::Median => "median",
            TaskType::Mode => "mode",
            TaskType::Sum => "sum",
            TaskType::Multiply => "multiply",
            TaskType::Divide => "divide",
            TaskType::LessThan => "lessthan",
            TaskType::Length => "length",
            TaskType::Lowercase => "lowercase",
            TaskType::Uppercase => "uppercase",
            TaskType::Lookup => "lookup",
            TaskType::JsonParse => "jsonparse",
            TaskType::CborParse => "cborparse",
            TaskType::Any => "any",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ResolveError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ResolveError::UnknownTaskType(s.to_string()))
    }
}

// ── Options ───────────────────────────────────────────────────────────────────
//
// Every field is a string as written in the pipeline; empty means "not set".
// Values may hold `$(path)` variable expressions, resolved at run time.

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HttpOptions {
    pub method: String,
    pub url: String,
    /// JSON request body.
    pub request_data: String,
    /// JSON object, or a flat JSON array of alternating names and values.
    pub headers: String,
    pub allow_unrestricted_network_access: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AggregateOptions {
    /// JSON array; empty means the positional inputs.
    pub values: String,
    pub allowed_faults: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct MeanOptions {
    pub values: String,
    pub allowed_faults: String,
    pub precision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct MultiplyOptions {
    pub input: String,
    pub times: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DivideOptions {
    pub input: String,
    pub divisor: String,
    pub precision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LessThanOptions {
    pub left: String,
    pub right: String,
}

/// Options of the single-input tasks: length, lowercase, uppercase.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct InputOptions {
    pub input: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LookupOptions {
    pub input: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct JsonParseOptions {
    pub data: String,
    pub path: String,
    /// Path separator, `,` when empty.
    pub separator: String,
    /// When true a missing key yields null instead of an error.
    pub lax: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CborParseOptions {
    pub data: String,
    /// `diet` (default) or `standard`.
    pub mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoOptions {}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A constructed task: its type plus validated options.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Http(HttpOptions),
    Mean(MeanOptions),
    Median(AggregateOptions),
    Mode(AggregateOptions),
    Sum(AggregateOptions),
    Multiply(MultiplyOptions),
    Divide(DivideOptions),
    LessThan(LessThanOptions),
    Length(InputOptions),
    Lowercase(InputOptions),
    Uppercase(InputOptions),
    Lookup(LookupOptions),
    JsonParse(JsonParseOptions),
    CborParse(CborParseOptions),
    Any,
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        match self {
            Task::Http(_) => TaskType::Http,
            Task::Mean(_) => TaskType::Mean,
            Task::Median(_) => TaskType::Median,
            Task::Mode(_) => TaskType::Mode,
            Task::Sum(_) => TaskType::Sum,
            Task::Multiply(_) => TaskType::Multiply,
            Task::Divide(_) => TaskType::Divide,
            Task::LessThan(_) => TaskType::LessThan,
            Task::Length(_) => TaskType::Length,
            Task::Lowercase(_) => TaskType::Lowercase,
            Task::Uppercase(_) => TaskType::Uppercase,
            Task::Lookup(_) => TaskType::Lookup,
            Task::JsonParse(_) => TaskType::JsonParse,
            Task::CborParse(_) => TaskType::CborParse,
            Task::Any => TaskType::Any,
        }
    }
}

/// Resolve a task type name and its raw options.
pub fn resolve(task_type: &str, options: &Map<String, Value>) -> Result<Task, ResolveError> {
    let ty: TaskType = task_type.parse()?;
    let canonical = canonical_options(options);

    Ok(match ty {
        TaskType::Http => Task::Http(typed(ty, &canonical)?),
        TaskType::Mean => Task::Mean(typed(ty, &canonical)?),
        TaskType::Median => Task::Median(typed(ty, &canonical)?),
        TaskType::Mode => Task::Mode(typed(ty, &canonical)?),
        TaskType::Sum => Task::Sum(typed(ty, &canonical)?),
        TaskType::Multiply => Task::Multiply(typed(ty, &canonical)?),
        TaskType::Divide => Task::Divide(typed(ty, &canonical)?),
        TaskType::LessThan => Task::LessThan(typed(ty, &canonical)?),
        TaskType::Length => Task::Length(typed(ty, &canonical)?),
        TaskType::Lowercase => Task::Lowercase(typed(ty, &canonical)?),
        TaskType::Uppercase => Task::Uppercase(typed(ty, &canonical)?),
        TaskType::Lookup => Task::Lookup(typed(ty, &canonical)?),
        TaskType::JsonParse => Task::JsonParse(typed(ty, &canonical)?),
        TaskType::CborParse => Task::CborParse(typed(ty, &canonical)?),
        TaskType::Any => {
            typed::<NoOptions>(ty, &canonical)?;
            Task::Any
        }
    })
}

/// Canonical form of a raw options map: strings kept, other scalars
/// stringified, arrays and objects re-serialized as JSON text, nulls dropped.
pub fn canonical_options(options: &Map<String, Value>) -> Map<String, Value> {
    options
        .iter()
        .filter_map(|(k, v)| {
            let text = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => v.to_string(),
            };
            Some((k.clone(), Value::String(text)))
        })
        .collect()
}

fn typed<T: DeserializeOwned>(ty: TaskType, canonical: &Map<String, Value>) -> Result<T, ResolveError> {
    serde_json::from_value(Value::Object(canonical.clone())).map_err(|e| {
        ResolveError::InvalidOptions {
            task_type: ty.as_str(),
            reason: e.to_string(),
        }
    })
}
