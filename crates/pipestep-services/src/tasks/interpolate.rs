//! Variable expressions in task options.
//!
//! `$(path)` refers to an environment value by dotted path. A whole option
//! of that form resolves to the native value itself. Inside a longer string
//! each expression is replaced with the value's display text. Inside JSON
//! options the native values are spliced in where the expressions stand.

use pipestep_core::{Environment, NativeValue};

use super::TaskError;

const PLACEHOLDER_PREFIX: &str = "__pipestep_var_";
const PLACEHOLDER_SUFFIX: &str = "__";

/// One `$(path)` occurrence: byte range in the source and the trimmed path.
struct Expr<'a> {
    start: usize,
    end: usize,
    path: &'a str,
}

fn expressions(raw: &str) -> Result<Vec<Expr<'_>>, TaskError> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(offset) = raw[from..].find("$(") {
        let start = from + offset;
        let close = raw[start..]
            .find(')')
            .ok_or_else(|| TaskError::InvalidInput(format!("unterminated variable in {raw:?}")))?;
        let end = start + close + 1;
        let path = raw[start + 2..end - 1].trim();
        if path.is_empty() {
            return Err(TaskError::InvalidInput(format!("empty variable in {raw:?}")));
        }
        out.push(Expr { start, end, path });
        from = end;
    }
    Ok(out)
}

/// Resolve a scalar option. `None` when the option is empty.
pub fn value(raw: &str, env: &Environment) -> Result<Option<NativeValue>, TaskError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let exprs = expressions(trimmed)?;
    match exprs.as_slice() {
        [] => Ok(Some(NativeValue::String(raw.to_string()))),
        [only] if only.start == 0 && only.end == trimmed.len() => {
            Ok(Some(env.lookup(only.path)?.clone()))
        }
        _ => text(trimmed, &exprs, env).map(|s| Some(NativeValue::String(s))),
    }
}

/// Resolve an option that must be present, falling back to the first
/// positional input when it is empty.
pub fn value_or_input(
    name: &str,
    raw: &str,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<NativeValue, TaskError> {
    match value(raw, env)? {
        Some(v) => Ok(v),
        None => inputs
            .first()
            .cloned()
            .ok_or_else(|| TaskError::MissingOption(name.to_string())),
    }
}

fn text(raw: &str, exprs: &[Expr<'_>], env: &Environment) -> Result<String, TaskError> {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for e in exprs {
        out.push_str(&raw[last..e.start]);
        out.push_str(&env.lookup(e.path)?.to_string());
        last = e.end;
    }
    out.push_str(&raw[last..]);
    Ok(out)
}

/// Resolve a JSON option with embedded expressions. `None` when empty.
pub fn json(raw: &str, env: &Environment) -> Result<Option<NativeValue>, TaskError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let exprs = expressions(trimmed)?;
    if let [only] = exprs.as_slice() {
        if only.start == 0 && only.end == trimmed.len() {
            return Ok(Some(env.lookup(only.path)?.clone()));
        }
    }

    let mut values = Vec::with_capacity(exprs.len());
    let mut source = String::with_capacity(trimmed.len());
    let mut last = 0;
    for (i, e) in exprs.iter().enumerate() {
        let before = &trimmed[last..e.start];
        source.push_str(before);
        let placeholder = format!("{PLACEHOLDER_PREFIX}{i}{PLACEHOLDER_SUFFIX}");
        if inside_string(&trimmed[..e.start]) {
            source.push_str(&placeholder);
        } else {
            source.push('"');
            source.push_str(&placeholder);
            source.push('"');
        }
        values.push(env.lookup(e.path)?.clone());
        last = e.end;
    }
    source.push_str(&trimmed[last..]);

    let parsed: serde_json::Value = serde_json::from_str(&source)
        .map_err(|err| TaskError::InvalidInput(format!("invalid JSON {trimmed:?}: {err}")))?;
    Ok(Some(splice(NativeValue::from_json(parsed), &values)))
}

/// Whether the end of `prefix` lies inside a JSON string literal.
fn inside_string(prefix: &str) -> bool {
    let mut inside = false;
    let mut escaped = false;
    for c in prefix.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if inside => escaped = true,
            '"' => inside = !inside,
            _ => {}
        }
    }
    inside
}

fn splice(v: NativeValue, values: &[NativeValue]) -> NativeValue {
    match v {
        NativeValue::String(s) => splice_text(s, values),
        NativeValue::Array(items) => {
            NativeValue::Array(items.into_iter().map(|i| splice(i, values)).collect())
        }
        NativeValue::Map(map) => NativeValue::Map(
            map.into_iter()
                .map(|(k, v)| (k, splice(v, values)))
                .collect(),
        ),
        other => other,
    }
}

fn splice_text(s: String, values: &[NativeValue]) -> NativeValue {
    if let Some(i) = placeholder_index(&s) {
        if let Some(v) = values.get(i) {
            return v.clone();
        }
    }
    if !s.contains(PLACEHOLDER_PREFIX) {
        return NativeValue::String(s);
    }
    let mut out = s;
    for (i, v) in values.iter().enumerate() {
        let placeholder = format!("{PLACEHOLDER_PREFIX}{i}{PLACEHOLDER_SUFFIX}");
        out = out.replace(&placeholder, &v.to_string());
    }
    NativeValue::String(out)
}

fn placeholder_index(s: &str) -> Option<usize> {
    s.strip_prefix(PLACEHOLDER_PREFIX)?
        .strip_suffix(PLACEHOLDER_SUFFIX)?
        .parse()
        .ok()
}

/// Resolve a list option, falling back to all positional inputs when empty.
/// A non-array value is a one-element list.
pub fn list(raw: &str, env: &Environment, inputs: &[NativeValue]) -> Result<Vec<NativeValue>, TaskError> {
    match json(raw, env)? {
        None => Ok(inputs.to_vec()),
        Some(NativeValue::Array(items)) => Ok(items),
        Some(other) => Ok(vec![other]),
    }
}
