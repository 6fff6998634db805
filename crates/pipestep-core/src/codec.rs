//! Token codec — carries native values across stateless calls.
//!
//! A token is the standard base64 encoding of one version byte followed by a
//! CBOR document. The document is the serde form of `WireValue`, the closed
//! registry of every representable variant. Clients must treat tokens as
//! opaque: only `encode` produces them and only `decode` reads them.
//!
//! Changing `WireValue` tags is a breaking change for tokens already held by
//! clients. Bump `TOKEN_VERSION` when doing so.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::value::NativeValue;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current token format version. Tokens with any other leading byte are rejected.
pub const TOKEN_VERSION: u8 = 0x01;

/// Maximum nesting of arrays and maps a token may carry.
pub const MAX_DEPTH: usize = 64;

/// Whether `value` can sit in an environment, one level below its root map,
/// and still encode.
pub fn fits_environment(value: &NativeValue) -> bool {
    value.depth() < MAX_DEPTH
}

// ── Token ─────────────────────────────────────────────────────────────────────

/// Opaque encoded value, safe to embed in a JSON string field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Token> for String {
    fn from(t: Token) -> String {
        t.0
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token is empty")]
    Empty,

    #[error("unknown token version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("token body is malformed: {0}")]
    Malformed(String),

    #[error("token has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("{kind} must be {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("value nests deeper than {} levels", MAX_DEPTH)]
    TooDeep,

    #[error("failed to serialize value: {0}")]
    Serialize(String),

    #[error("expected an environment, token holds {0}")]
    NotAnEnvironment(&'static str),
}

// ── Wire registry ─────────────────────────────────────────────────────────────

/// The encodable types. Variant names are the on-wire tags.
#[derive(Debug, Serialize, Deserialize)]
enum WireValue {
    #[serde(rename = "s")]
    String(String),
    #[serde(rename = "b32")]
    Bytes32(#[serde(with = "serde_bytes")] Vec<u8>),
    #[serde(rename = "b")]
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Two's-complement big-endian.
    #[serde(rename = "i")]
    Int(#[serde(with = "serde_bytes")] Vec<u8>),
    #[serde(rename = "f")]
    Float(f64),
    /// `mantissa * 10^-scale`, mantissa as in `Int`.
    #[serde(rename = "d")]
    Decimal {
        #[serde(with = "serde_bytes")]
        mantissa: Vec<u8>,
        scale: i64,
    },
    #[serde(rename = "t")]
    Bool(bool),
    #[serde(rename = "a")]
    Address(#[serde(with = "serde_bytes")] Vec<u8>),
    #[serde(rename = "n")]
    Null,
    #[serde(rename = "l")]
    Array(Vec<WireValue>),
    #[serde(rename = "m")]
    Map(BTreeMap<String, WireValue>),
}

impl WireValue {
    fn from_native(value: &NativeValue, depth: usize) -> Result<Self, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        Ok(match value {
            NativeValue::String(s) => WireValue::String(s.clone()),
            NativeValue::Bytes32(b) => WireValue::Bytes32(b.to_vec()),
            NativeValue::Bytes(b) => WireValue::Bytes(b.clone()),
            NativeValue::Int(i) => WireValue::Int(i.to_signed_bytes_be()),
            NativeValue::Float(f) => WireValue::Float(*f),
            NativeValue::Decimal(d) => {
                let (mantissa, scale) = d.as_bigint_and_exponent();
                WireValue::Decimal {
                    mantissa: mantissa.to_signed_bytes_be(),
                    scale,
                }
            }
            NativeValue::Bool(b) => WireValue::Bool(*b),
            NativeValue::Address(a) => WireValue::Address(a.to_vec()),
            NativeValue::Null => WireValue::Null,
            NativeValue::Array(items) => WireValue::Array(
                items
                    .iter()
                    .map(|v| WireValue::from_native(v, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            NativeValue::Map(map) => WireValue::Map(Self::map_from_native(map, depth + 1)?),
        })
    }

    fn map_from_native(
        map: &BTreeMap<String, NativeValue>,
        depth: usize,
    ) -> Result<BTreeMap<String, WireValue>, CodecError> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), WireValue::from_native(v, depth)?)))
            .collect()
    }

    fn into_native(self, depth: usize) -> Result<NativeValue, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        Ok(match self {
            WireValue::String(s) => NativeValue::String(s),
            WireValue::Bytes32(b) => NativeValue::Bytes32(fixed::<32>("bytes32", &b)?),
            WireValue::Bytes(b) => NativeValue::Bytes(b),
            WireValue::Int(b) => NativeValue::Int(BigInt::from_signed_bytes_be(&b)),
            WireValue::Float(f) => NativeValue::Float(f),
            WireValue::Decimal { mantissa, scale } => NativeValue::Decimal(BigDecimal::new(
                BigInt::from_signed_bytes_be(&mantissa),
                scale,
            )),
            WireValue::Bool(b) => NativeValue::Bool(b),
            WireValue::Address(a) => NativeValue::Address(fixed::<20>("address", &a)?),
            WireValue::Null => NativeValue::Null,
            WireValue::Array(items) => NativeValue::Array(
                items
                    .into_iter()
                    .map(|v| v.into_native(depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            WireValue::Map(map) => NativeValue::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, v.into_native(depth + 1)?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
        })
    }
}

fn fixed<const N: usize>(kind: &'static str, bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes.try_into().map_err(|_| CodecError::InvalidLength {
        kind,
        expected: N,
        actual: bytes.len(),
    })
}

// ── Encode / decode ───────────────────────────────────────────────────────────

/// Encode one native value into a token.
pub fn encode(value: &NativeValue) -> Result<Token, CodecError> {
    seal(&WireValue::from_native(value, 0)?)
}

/// Encode a variable map as a token holding a `Map`, without cloning it.
pub fn encode_map(map: &BTreeMap<String, NativeValue>) -> Result<Token, CodecError> {
    seal(&WireValue::Map(WireValue::map_from_native(map, 1)?))
}

fn seal(wire: &WireValue) -> Result<Token, CodecError> {
    let mut buf = vec![TOKEN_VERSION];
    ciborium::into_writer(wire, &mut buf).map_err(|e| CodecError::Serialize(e.to_string()))?;
    Ok(Token(STANDARD.encode(buf)))
}

/// Decode a token produced by `encode`.
pub fn decode(token: &str) -> Result<NativeValue, CodecError> {
    let raw = STANDARD.decode(token.trim())?;
    let (version, body) = raw.split_first().ok_or(CodecError::Empty)?;
    if *version != TOKEN_VERSION {
        return Err(CodecError::UnknownVersion(*version));
    }

    let mut cursor = Cursor::new(body);
    let wire: WireValue =
        ciborium::from_reader(&mut cursor).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let consumed = cursor.position() as usize;
    if consumed != body.len() {
        return Err(CodecError::TrailingBytes(body.len() - consumed));
    }

    wire.into_native(0)
}

/// Decode a token that must hold an environment. An absent or blank token is
/// the empty environment.
pub fn decode_environment(token: Option<&str>) -> Result<Environment, CodecError> {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(Environment::new()),
        Some(t) => match decode(t)? {
            NativeValue::Map(map) => Ok(Environment::from_map(map)),
            other => Err(CodecError::NotAnEnvironment(other.kind_name())),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn round_trip(v: NativeValue) {
        let token = encode(&v).expect("encode");
        let back = decode(token.as_str()).expect("decode");
        assert_eq!(back, v);
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(NativeValue::from("chainlink"));
        round_trip(NativeValue::Bytes(vec![]));
        round_trip(NativeValue::Bytes(vec![0, 1, 2, 255]));
        round_trip(NativeValue::Float(-0.125));
        round_trip(NativeValue::Bool(false));
        round_trip(NativeValue::Null);
    }

    #[test]
    fn big_integers_keep_sign_and_magnitude() {
        for s in [
            "0",
            "-1",
            "255",
            "-256",
            "115792089237316195423570985008687907853269984665640564039457584007913129639935",
            "-57896044618658097711785492504343953926634992332820282019728792003956564819968",
        ] {
            round_trip(NativeValue::Int(BigInt::from_str(s).unwrap()));
        }
    }

    #[test]
    fn decimals_keep_scale() {
        let d = BigDecimal::from_str("-1234567890.000000000000000000012").unwrap();
        let token = encode(&NativeValue::Decimal(d.clone())).unwrap();
        let NativeValue::Decimal(back) = decode(token.as_str()).unwrap() else {
            panic!("expected decimal");
        };
        assert_eq!(back.as_bigint_and_exponent(), d.as_bigint_and_exponent());
    }

    #[test]
    fn fixed_byte_kinds_round_trip() {
        let mut b32 = [0u8; 32];
        b32[..9].copy_from_slice(b"chainlink");
        round_trip(NativeValue::Bytes32(b32));
        round_trip(NativeValue::Address([0xab; 20]));
    }

    #[test]
    fn bytes32_and_bytes_stay_distinct() {
        let token = encode(&NativeValue::Bytes(vec![7; 32])).unwrap();
        assert!(matches!(decode(token.as_str()).unwrap(), NativeValue::Bytes(_)));
    }

    #[test]
    fn arrays_and_maps_round_trip() {
        round_trip(NativeValue::Array(vec![
            NativeValue::Int(BigInt::from(192)),
            NativeValue::Int(BigInt::from(4182)),
        ]));

        let mut inner = BTreeMap::new();
        inner.insert("payment".to_string(), NativeValue::Int(BigInt::from(100)));
        inner.insert("requester".to_string(), NativeValue::Address([0x11; 20]));

        let mut outer = BTreeMap::new();
        outer.insert("jobRun".to_string(), NativeValue::Map(inner));
        outer.insert("flag".to_string(), NativeValue::Bool(true));
        outer.insert(
            "price".to_string(),
            NativeValue::Decimal(BigDecimal::from_str("10.23").unwrap()),
        );
        outer.insert("ids".to_string(), NativeValue::Array(vec![NativeValue::Bytes32([1; 32])]));
        round_trip(NativeValue::Map(outer));
    }

    #[test]
    fn encoding_is_deterministic() {
        let v = NativeValue::Int(BigInt::from_str("-99999999999999999999").unwrap());
        assert_eq!(encode(&v).unwrap(), encode(&v).unwrap());

        let a = NativeValue::Address([0x42; 20]);
        assert_eq!(encode(&a).unwrap(), encode(&a.clone()).unwrap());
    }

    #[test]
    fn encode_map_matches_encode_of_map_value() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), NativeValue::Bool(true));
        assert_eq!(
            encode_map(&map).unwrap(),
            encode(&NativeValue::Map(map.clone())).unwrap()
        );
    }

    #[test]
    fn over_deep_values_are_rejected() {
        let mut v = NativeValue::Null;
        for _ in 0..=MAX_DEPTH + 1 {
            v = NativeValue::Array(vec![v]);
        }
        assert!(matches!(encode(&v), Err(CodecError::TooDeep)));
    }

    #[test]
    fn over_deep_tokens_are_rejected_on_decode() {
        let mut wire = WireValue::Null;
        for _ in 0..=MAX_DEPTH {
            wire = WireValue::Array(vec![wire]);
        }
        let token = seal(&wire).unwrap();
        assert!(matches!(decode(token.as_str()), Err(CodecError::TooDeep)));
    }

    #[test]
    fn environment_values_one_level_short_of_the_limit_fit() {
        let mut v = NativeValue::Null;
        for _ in 0..MAX_DEPTH - 1 {
            v = NativeValue::Array(vec![v]);
        }
        assert!(fits_environment(&v));
        let mut env = Environment::new();
        env.insert("deep", v.clone());
        assert!(env.encode().is_ok());

        let v = NativeValue::Array(vec![v]);
        assert!(!fits_environment(&v));
    }

    #[test]
    fn garbage_tokens_are_errors() {
        assert!(matches!(decode("not base64!!"), Err(CodecError::Base64(_))));
        assert!(matches!(decode(""), Err(CodecError::Empty)));

        let wrong_version = STANDARD.encode([0x7f, 0xf6]);
        assert!(matches!(
            decode(&wrong_version),
            Err(CodecError::UnknownVersion(0x7f))
        ));
    }

    #[test]
    fn truncated_token_is_an_error() {
        let token = encode(&NativeValue::from("a fairly long string value")).unwrap();
        let mut raw = STANDARD.decode(token.as_str()).unwrap();
        raw.truncate(raw.len() - 4);
        let truncated = STANDARD.encode(raw);
        assert!(matches!(decode(&truncated), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let token = encode(&NativeValue::Bool(true)).unwrap();
        let mut raw = STANDARD.decode(token.as_str()).unwrap();
        raw.push(0x00);
        assert!(matches!(
            decode(&STANDARD.encode(raw)),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn wrong_fixed_length_is_an_error() {
        let mut raw = vec![TOKEN_VERSION];
        ciborium::into_writer(&WireValue::Address(vec![1, 2, 3]), &mut raw).unwrap();
        assert!(matches!(
            decode(&STANDARD.encode(raw)),
            Err(CodecError::InvalidLength { kind: "address", expected: 20, actual: 3 })
        ));
    }

    #[test]
    fn decode_environment_handles_absent_and_non_map_tokens() {
        assert!(decode_environment(None).unwrap().is_empty());
        assert!(decode_environment(Some("  ")).unwrap().is_empty());

        let scalar = encode(&NativeValue::Bool(true)).unwrap();
        assert!(matches!(
            decode_environment(Some(scalar.as_str())),
            Err(CodecError::NotAnEnvironment("bool"))
        ));
    }
}
