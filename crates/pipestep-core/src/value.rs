//! Native values — the closed set of representations a pipeline variable can hold.
//!
//! Everything a step reads from or writes to the environment is a
//! `NativeValue`. The set is closed on purpose: the token codec knows how to
//! carry every variant and nothing else.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

/// Largest decimal exponent, either direction, that numeric views accept.
/// `1e2000000000` parses cheaply but aligning it with `1` does not.
pub const MAX_DECIMAL_SCALE: i64 = 1_000;

/// Whether `d` is small enough in exponent for arithmetic.
pub fn decimal_in_range(d: &BigDecimal) -> bool {
    let (_, scale) = d.as_bigint_and_exponent();
    scale.abs() <= MAX_DECIMAL_SCALE
}

/// A type-faithful pipeline value.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// UTF-8 text.
    String(String),
    /// Fixed 32-byte buffer (zero-filled on the right).
    Bytes32([u8; 32]),
    /// Variable-length byte sequence.
    Bytes(Vec<u8>),
    /// Arbitrary-precision signed integer.
    Int(BigInt),
    /// IEEE-754 double.
    Float(f64),
    /// Arbitrary-precision decimal.
    Decimal(BigDecimal),
    Bool(bool),
    /// 20-byte account address.
    Address([u8; 20]),
    Null,
    Array(Vec<NativeValue>),
    /// String-keyed map, e.g. the `jobRun` sub-environment.
    Map(BTreeMap<String, NativeValue>),
}

impl NativeValue {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NativeValue::String(_) => "string",
            NativeValue::Bytes32(_) => "bytes32",
            NativeValue::Bytes(_) => "bytes",
            NativeValue::Int(_) => "int",
            NativeValue::Float(_) => "float",
            NativeValue::Decimal(_) => "decimal",
            NativeValue::Bool(_) => "bool",
            NativeValue::Address(_) => "address",
            NativeValue::Null => "null",
            NativeValue::Array(_) => "array",
            NativeValue::Map(_) => "map",
        }
    }

    /// Map a caller-supplied JSON value onto native values without coercion.
    ///
    /// Integral numbers that fit in 64 bits become `Int`, every other number
    /// becomes `Float`. Objects become `Map` at any depth.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => NativeValue::Null,
            Value::Bool(b) => NativeValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    NativeValue::Int(BigInt::from(i))
                } else if let Some(u) = n.as_u64() {
                    NativeValue::Int(BigInt::from(u))
                } else {
                    n.as_f64().map_or(NativeValue::Null, NativeValue::Float)
                }
            }
            Value::String(s) => NativeValue::String(s),
            Value::Array(items) => {
                NativeValue::Array(items.into_iter().map(NativeValue::from_json).collect())
            }
            Value::Object(map) => NativeValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, NativeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Human-readable JSON rendering for responses.
    ///
    /// Big integers and decimals render as base-10 strings so JS clients do
    /// not lose precision; byte kinds and addresses render as `0x` hex.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            NativeValue::String(s) => Value::String(s.clone()),
            NativeValue::Bytes32(b) => Value::String(prefixed_hex(b)),
            NativeValue::Bytes(b) => Value::String(prefixed_hex(b)),
            NativeValue::Int(i) => Value::String(i.to_string()),
            NativeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            NativeValue::Decimal(d) => Value::String(d.to_string()),
            NativeValue::Bool(b) => Value::Bool(*b),
            NativeValue::Address(a) => Value::String(prefixed_hex(a)),
            NativeValue::Null => Value::Null,
            NativeValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            NativeValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Numeric view used by the arithmetic tasks. Decimals whose exponent
    /// exceeds `MAX_DECIMAL_SCALE` are not numeric.
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        let d = match self {
            NativeValue::Int(i) => Some(BigDecimal::new(i.clone(), 0)),
            NativeValue::Float(f) if f.is_finite() => BigDecimal::from_str(&f.to_string()).ok(),
            NativeValue::Decimal(d) => Some(d.clone()),
            NativeValue::String(_) | NativeValue::Bytes(_) => {
                self.as_text().and_then(|s| BigDecimal::from_str(s.trim()).ok())
            }
            _ => None,
        };
        d.filter(decimal_in_range)
    }

    /// Text view: strings, and byte sequences that are valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) => Some(s),
            NativeValue::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    /// Levels of nesting below this value: 0 for scalars and empty
    /// containers, otherwise one more than the deepest element.
    pub fn depth(&self) -> usize {
        match self {
            NativeValue::Array(items) => items.iter().map(|v| v.depth() + 1).max().unwrap_or(0),
            NativeValue::Map(map) => map.values().map(|v| v.depth() + 1).max().unwrap_or(0),
            _ => 0,
        }
    }
}

fn prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::String(s) => f.write_str(s),
            NativeValue::Bytes32(b) => f.write_str(&prefixed_hex(b)),
            NativeValue::Bytes(b) => f.write_str(&prefixed_hex(b)),
            NativeValue::Int(i) => write!(f, "{i}"),
            NativeValue::Float(x) => write!(f, "{x}"),
            NativeValue::Decimal(d) => write!(f, "{d}"),
            NativeValue::Bool(b) => write!(f, "{b}"),
            NativeValue::Address(a) => f.write_str(&prefixed_hex(a)),
            NativeValue::Null => f.write_str("null"),
            NativeValue::Array(_) | NativeValue::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<BigDecimal> for NativeValue {
    fn from(d: BigDecimal) -> Self {
        NativeValue::Decimal(d)
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::String(s)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.to_string())
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
