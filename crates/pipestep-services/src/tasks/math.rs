//! Numeric tasks: aggregations over value lists, arithmetic and comparison.

use std::collections::HashMap;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use num_bigint::BigInt;
use pipestep_core::{Environment, NativeValue};

use super::interpolate;
use super::TaskError;
use crate::resolver::{
    AggregateOptions, DivideOptions, InputOptions, LessThanOptions, MeanOptions, MultiplyOptions,
};

// ── Aggregations ──────────────────────────────────────────────────────────────

/// Values that parsed as numbers, after checking the fault budget.
fn numeric_values(
    values: &str,
    allowed_faults: &str,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<Vec<BigDecimal>, TaskError> {
    let raw = interpolate::list(values, env, inputs)?;
    let total = raw.len();
    let parsed: Vec<BigDecimal> = raw.iter().filter_map(NativeValue::as_decimal).collect();
    check_faults(total, total - parsed.len(), allowed_faults)?;
    Ok(parsed)
}

/// Faults beyond the budget fail the task. The default budget is
/// `total - 1`: at least one value must be good.
fn check_faults(total: usize, faults: usize, allowed_faults: &str) -> Result<(), TaskError> {
    if total == 0 {
        return Err(TaskError::NoValues);
    }
    let allowed = match allowed_faults.trim() {
        "" => total - 1,
        s => s
            .parse::<usize>()
            .map_err(|_| TaskError::InvalidInput(format!("allowedFaults {s:?} is not a count")))?,
    };
    if faults > allowed || faults == total {
        return Err(TaskError::TooManyFaults {
            faults,
            total,
            allowed,
        });
    }
    Ok(())
}

/// Most decimal places a result may be rounded to.
pub const MAX_PRECISION: i64 = 100;

fn precision(raw: &str, env: &Environment) -> Result<Option<i64>, TaskError> {
    let Some(v) = interpolate::value(raw, env)? else {
        return Ok(None);
    };
    let p = v
        .as_decimal()
        .and_then(|d| d.to_string().parse::<i64>().ok())
        .ok_or_else(|| TaskError::InvalidInput(format!("precision {v} is not an integer")))?;
    if !(0..=MAX_PRECISION).contains(&p) {
        return Err(TaskError::InvalidInput(format!(
            "precision {p} is outside 0..={MAX_PRECISION}"
        )));
    }
    Ok(Some(p))
}

fn round(d: BigDecimal, precision: Option<i64>) -> BigDecimal {
    match precision {
        Some(p) => d.with_scale_round(p, RoundingMode::HalfUp),
        None => d,
    }
}

pub fn mean(opts: &MeanOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    let values = numeric_values(&opts.values, &opts.allowed_faults, env, inputs)?;
    let count = BigDecimal::from(values.len() as u64);
    let total: BigDecimal = values.into_iter().sum();
    Ok(NativeValue::Decimal(round(total / count, precision(&opts.precision, env)?)))
}

pub fn median(
    opts: &AggregateOptions,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<NativeValue, TaskError> {
    let mut values = numeric_values(&opts.values, &opts.allowed_faults, env, inputs)?;
    values.sort();
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 1 {
        values[mid].clone()
    } else {
        (&values[mid - 1] + &values[mid]) / BigDecimal::from(2)
    };
    Ok(NativeValue::Decimal(median))
}

pub fn sum(opts: &AggregateOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    let values = numeric_values(&opts.values, &opts.allowed_faults, env, inputs)?;
    Ok(NativeValue::Decimal(values.into_iter().sum()))
}

/// Most frequent values. Numbers compare by value, everything else by its
/// display text; nulls count as faults.
pub fn mode(opts: &AggregateOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    let raw = interpolate::list(&opts.values, env, inputs)?;
    let total = raw.len();
    let good: Vec<NativeValue> = raw.into_iter().filter(|v| !v.is_null()).collect();
    check_faults(total, total - good.len(), &opts.allowed_faults)?;

    let mut order: Vec<(String, NativeValue)> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for v in good {
        let key = match v.as_decimal() {
            Some(d) => d.normalized().to_string(),
            None => v.to_string(),
        };
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push((key, v));
        }
        *count += 1;
    }

    let occurrences = counts.values().copied().max().unwrap_or(0);
    let results = order
        .into_iter()
        .filter(|(key, _)| counts.get(key) == Some(&occurrences))
        .map(|(_, v)| v)
        .collect();

    let mut out = std::collections::BTreeMap::new();
    out.insert("results".to_string(), NativeValue::Array(results));
    out.insert("occurrences".to_string(), NativeValue::Int(BigInt::from(occurrences)));
    Ok(NativeValue::Map(out))
}

// ── Arithmetic ────────────────────────────────────────────────────────────────

fn decimal_option(
    name: &str,
    raw: &str,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<BigDecimal, TaskError> {
    let v = interpolate::value_or_input(name, raw, env, inputs)?;
    v.as_decimal()
        .ok_or_else(|| TaskError::InvalidInput(format!("{name} {v} is not a number")))
}

fn required_decimal(name: &str, raw: &str, env: &Environment) -> Result<BigDecimal, TaskError> {
    decimal_option(name, raw, env, &[])
}

pub fn multiply(
    opts: &MultiplyOptions,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<NativeValue, TaskError> {
    let input = decimal_option("input", &opts.input, env, inputs)?;
    let times = required_decimal("times", &opts.times, env)?;
    Ok(NativeValue::Decimal(input * times))
}

pub fn divide(opts: &DivideOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    let input = decimal_option("input", &opts.input, env, inputs)?;
    let divisor = required_decimal("divisor", &opts.divisor, env)?;
    if divisor.is_zero() {
        return Err(TaskError::DivideByZero);
    }
    Ok(NativeValue::Decimal(round(
        input / divisor,
        precision(&opts.precision, env)?,
    )))
}

pub fn less_than(
    opts: &LessThanOptions,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<NativeValue, TaskError> {
    let left = decimal_option("left", &opts.left, env, inputs)?;
    let right = required_decimal("right", &opts.right, env)?;
    Ok(NativeValue::Bool(left < right))
}

/// Byte length of the input.
pub fn length(opts: &InputOptions, env: &Environment, inputs: &[NativeValue]) -> Result<NativeValue, TaskError> {
    let input = interpolate::value_or_input("input", &opts.input, env, inputs)?;
    let len = match &input {
        NativeValue::Bytes(b) => b.len(),
        NativeValue::Bytes32(_) => 32,
        NativeValue::Address(_) => 20,
        NativeValue::String(s) => s.len(),
        other => other.to_string().len(),
    };
    Ok(NativeValue::Decimal(BigDecimal::from(len as u64)))
}
