//! Typed value conversion — turns string-tagged request fields into native values.
//!
//! A `TypedValue` carries a kind tag plus either a scalar string, an array of
//! strings, or a passthrough JSON value. Passthrough always wins. Unknown kinds
//! are not an error: they degrade to the raw scalar string so clients can send
//! kinds this build does not know yet.

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::value::{decimal_in_range, NativeValue, MAX_DECIMAL_SCALE};

// ── Kinds ─────────────────────────────────────────────────────────────────────

/// Kind tag of a typed value. Anything unrecognised is kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueKind {
    #[default]
    String,
    Bytes32,
    Bytes,
    Int,
    Float,
    Decimal,
    Bool,
    Address,
    Null,
    Other(String),
}

impl ValueKind {
    pub fn as_str(&self) -> &str {
        match self {
            ValueKind::String => "string",
            ValueKind::Bytes32 => "bytes32",
            ValueKind::Bytes => "bytes",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Decimal => "decimal",
            ValueKind::Bool => "bool",
            ValueKind::Address => "address",
            ValueKind::Null => "null",
            ValueKind::Other(s) => s,
        }
    }
}

impl From<String> for ValueKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "string" => ValueKind::String,
            "bytes32" => ValueKind::Bytes32,
            "bytes" => ValueKind::Bytes,
            "int" => ValueKind::Int,
            "float" => ValueKind::Float,
            "decimal" => ValueKind::Decimal,
            "bool" => ValueKind::Bool,
            "address" => ValueKind::Address,
            "null" => ValueKind::Null,
            _ => ValueKind::Other(s),
        }
    }
}

impl From<ValueKind> for String {
    fn from(kind: ValueKind) -> String {
        kind.as_str().to_string()
    }
}

/// How the scalar of a `bytes` value is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceEncoding {
    #[default]
    String,
    Hex,
}

// ── Typed value ───────────────────────────────────────────────────────────────

/// Loosely-typed description of one variable, as sent by clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypedValue {
    #[serde(rename = "type", default)]
    pub kind: ValueKind,
    #[serde(rename = "value", default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<String>,
    #[serde(rename = "values", default, skip_serializing_if = "Option::is_none")]
    pub array: Option<Vec<String>>,
    /// Only consulted for `bytes`.
    #[serde(rename = "fromType", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceEncoding>,
    /// Trusted, already native-shaped value. Skips conversion entirely.
    #[serde(default, alias = "keep", skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<serde_json::Value>,
}

impl TypedValue {
    pub fn scalar(kind: ValueKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            scalar: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn array<I, S>(kind: ValueKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            array: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("cannot convert {value:?} to {kind}: {reason}")]
    InvalidValue {
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error("value nests deeper than {} levels", crate::codec::MAX_DEPTH - 1)]
    TooDeep,

    #[error("variable {name:?}: {source}")]
    InVariable {
        name: String,
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    fn invalid(kind: &'static str, value: &str, reason: impl ToString) -> Self {
        ConversionError::InvalidValue {
            kind,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

/// Convert one typed value.
///
/// Precedence: passthrough, then a non-empty scalar, then a non-empty array.
/// Returns `Ok(None)` when a known kind has neither, meaning "absent".
pub fn convert(v: &TypedValue) -> Result<Option<NativeValue>, ConversionError> {
    if let Some(raw) = &v.passthrough {
        return Ok(Some(NativeValue::from_json(raw.clone())));
    }

    match &v.kind {
        ValueKind::Null => return Ok(Some(NativeValue::Null)),
        ValueKind::Other(_) => {
            return Ok(Some(NativeValue::String(
                v.scalar.clone().unwrap_or_default(),
            )))
        }
        _ => {}
    }

    let source = v.source.unwrap_or_default();

    if let Some(s) = v.scalar.as_deref().filter(|s| !s.is_empty()) {
        return convert_scalar(&v.kind, source, s).map(Some);
    }

    match v.array.as_deref() {
        Some(items) if !items.is_empty() => items
            .iter()
            .map(|s| convert_scalar(&v.kind, source, s))
            .collect::<Result<Vec<_>, _>>()
            .map(|values| Some(NativeValue::Array(values))),
        _ => Ok(None),
    }
}

/// Convert every variable of a request. Absent values are left out; the first
/// failure aborts and names the variable.
pub fn convert_all(
    vars: &BTreeMap<String, TypedValue>,
) -> Result<BTreeMap<String, NativeValue>, ConversionError> {
    let mut out = BTreeMap::new();
    for (name, typed) in vars {
        let converted = convert(typed).map_err(|e| ConversionError::InVariable {
            name: name.clone(),
            source: Box::new(e),
        })?;
        if let Some(value) = converted {
            out.insert(name.clone(), value);
        }
    }
    Ok(out)
}

fn convert_scalar(
    kind: &ValueKind,
    source: SourceEncoding,
    raw: &str,
) -> Result<NativeValue, ConversionError> {
    match kind {
        ValueKind::String | ValueKind::Other(_) => Ok(NativeValue::String(raw.to_string())),
        ValueKind::Bytes32 => Ok(NativeValue::Bytes32(to_bytes32(raw))),
        ValueKind::Bytes => to_bytes(raw, source).map(NativeValue::Bytes),
        ValueKind::Int => to_int(raw).map(NativeValue::Int),
        ValueKind::Float => to_float(raw).map(NativeValue::Float),
        ValueKind::Decimal => to_decimal(raw).map(NativeValue::Decimal),
        ValueKind::Bool => to_bool(raw).map(NativeValue::Bool),
        ValueKind::Address => to_address(raw).map(NativeValue::Address),
        ValueKind::Null => Ok(NativeValue::Null),
    }
}

// ── Scalar parsers ────────────────────────────────────────────────────────────

/// Copy the UTF-8 bytes of `s` into a 32-byte buffer. Longer input is
/// truncated, shorter input is zero-filled on the right.
pub fn to_bytes32(s: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    let bytes = s.as_bytes();
    let n = bytes.len().min(out.len());
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

pub fn to_bytes(s: &str, source: SourceEncoding) -> Result<Vec<u8>, ConversionError> {
    match source {
        SourceEncoding::String => Ok(s.as_bytes().to_vec()),
        SourceEncoding::Hex => {
            hex::decode(strip_hex_prefix(s)).map_err(|e| ConversionError::invalid("bytes", s, e))
        }
    }
}

pub fn to_int(s: &str) -> Result<BigInt, ConversionError> {
    BigInt::from_str(s.trim()).map_err(|e| ConversionError::invalid("int", s, e))
}

pub fn to_float(s: &str) -> Result<f64, ConversionError> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| ConversionError::invalid("float", s, e))
}

pub fn to_decimal(s: &str) -> Result<BigDecimal, ConversionError> {
    let d = BigDecimal::from_str(s.trim()).map_err(|e| ConversionError::invalid("decimal", s, e))?;
    if !decimal_in_range(&d) {
        return Err(ConversionError::invalid(
            "decimal",
            s,
            format!("exponent is outside ±{MAX_DECIMAL_SCALE}"),
        ));
    }
    Ok(d)
}

pub fn to_bool(s: &str) -> Result<bool, ConversionError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(ConversionError::invalid("bool", s, "expected true or false")),
    }
}

/// Parse a 20-byte address: optional `0x`, then exactly 40 hex digits.
/// No checksum validation.
pub fn to_address(s: &str) -> Result<[u8; 20], ConversionError> {
    let digits = strip_hex_prefix(s.trim());
    if digits.len() != 40 {
        return Err(ConversionError::invalid(
            "address",
            s,
            format!("expected 40 hex digits, got {}", digits.len()),
        ));
    }
    let mut out = [0u8; 20];
    hex::decode_to_slice(digits, &mut out).map_err(|e| ConversionError::invalid("address", s, e))?;
    Ok(out)
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
