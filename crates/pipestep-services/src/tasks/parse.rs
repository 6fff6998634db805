//! Parsing tasks: JSON path extraction and CBOR decoding.

use std::collections::BTreeMap;

use num_bigint::{BigInt, Sign};
use pipestep_core::convert::to_bool;
use pipestep_core::{Environment, NativeValue};

use super::interpolate;
use super::TaskError;
use crate::resolver::{CborParseOptions, JsonParseOptions};

// ── jsonparse ─────────────────────────────────────────────────────────────────

pub fn json_parse(
    opts: &JsonParseOptions,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<NativeValue, TaskError> {
    let data = interpolate::value_or_input("data", &opts.data, env, inputs)?;
    let lax = match opts.lax.trim() {
        "" => false,
        s => to_bool(s).map_err(|e| TaskError::InvalidInput(e.to_string()))?,
    };

    let mut current = match data {
        NativeValue::Map(_) | NativeValue::Array(_) => data,
        other => {
            let text = other.as_text().ok_or_else(|| {
                TaskError::InvalidInput(format!("jsonparse expects text, got {}", other.kind_name()))
            })?;
            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| TaskError::InvalidInput(format!("data is not JSON: {e}")))?;
            NativeValue::from_json(parsed)
        }
    };

    let separator = match opts.separator.as_str() {
        "" => ",",
        s => s,
    };
    let path = match interpolate::value(&opts.path, env)? {
        Some(p) => p.to_string(),
        None => return Ok(current),
    };

    for segment in path.split(separator).map(str::trim).filter(|s| !s.is_empty()) {
        let next = match &current {
            NativeValue::Map(map) => map.get(segment).cloned(),
            NativeValue::Array(items) => array_index(items.len(), segment).map(|i| items[i].clone()),
            _ => None,
        };
        current = match next {
            Some(v) => v,
            None if lax => return Ok(NativeValue::Null),
            None => {
                return Err(TaskError::InvalidInput(format!(
                    "no value at {segment:?} in path {path:?}"
                )))
            }
        };
    }
    Ok(current)
}

/// Array index; negative counts from the end.
fn array_index(len: usize, segment: &str) -> Option<usize> {
    let i: i64 = segment.parse().ok()?;
    let i = if i < 0 { len as i64 + i } else { i };
    usize::try_from(i).ok().filter(|&i| i < len)
}

// ── cborparse ─────────────────────────────────────────────────────────────────

pub fn cbor_parse(
    opts: &CborParseOptions,
    env: &Environment,
    inputs: &[NativeValue],
) -> Result<NativeValue, TaskError> {
    let data = interpolate::value_or_input("data", &opts.data, env, inputs)?;
    let bytes = match data {
        NativeValue::Bytes(b) => b,
        NativeValue::Bytes32(b) => b.to_vec(),
        NativeValue::String(s) => match s.strip_prefix("0x") {
            Some(digits) => hex::decode(digits)
                .map_err(|e| TaskError::InvalidInput(format!("data is not hex: {e}")))?,
            None => s.into_bytes(),
        },
        other => {
            return Err(TaskError::InvalidInput(format!(
                "cborparse expects bytes, got {}",
                other.kind_name()
            )))
        }
    };

    let document = match opts.mode.trim() {
        // A bare key/value sequence: frame it as an indefinite-length map.
        "" | "diet" => {
            let mut framed = Vec::with_capacity(bytes.len() + 2);
            framed.push(0xbf);
            framed.extend_from_slice(&bytes);
            framed.push(0xff);
            framed
        }
        "standard" => bytes,
        other => {
            return Err(TaskError::InvalidInput(format!(
                "unknown cborparse mode {other:?}"
            )))
        }
    };

    let value: ciborium::Value = ciborium::from_reader(document.as_slice())
        .map_err(|e| TaskError::InvalidInput(format!("data is not CBOR: {e}")))?;
    Ok(from_cbor(value))
}

fn from_cbor(value: ciborium::Value) -> NativeValue {
    use ciborium::Value;

    match value {
        Value::Integer(i) => NativeValue::Int(BigInt::from(i128::from(i))),
        Value::Bytes(b) => NativeValue::Bytes(b),
        Value::Float(f) => NativeValue::Float(f),
        Value::Text(s) => NativeValue::String(s),
        Value::Bool(b) => NativeValue::Bool(b),
        Value::Null => NativeValue::Null,
        // RFC 8949 bignums.
        Value::Tag(2, inner) => match *inner {
            Value::Bytes(b) => NativeValue::Int(BigInt::from_bytes_be(Sign::Plus, &b)),
            other => from_cbor(other),
        },
        Value::Tag(3, inner) => match *inner {
            Value::Bytes(b) => {
                NativeValue::Int(-BigInt::from(1) - BigInt::from_bytes_be(Sign::Plus, &b))
            }
            other => from_cbor(other),
        },
        Value::Tag(_, inner) => from_cbor(*inner),
        Value::Array(items) => NativeValue::Array(items.into_iter().map(from_cbor).collect()),
        Value::Map(pairs) => {
            let map: BTreeMap<String, NativeValue> = pairs
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::Text(s) => s,
                        other => from_cbor(other).to_string(),
                    };
                    (key, from_cbor(v))
                })
                .collect();
            NativeValue::Map(map)
        }
        _ => NativeValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_opts(data: &str, path: &str) -> JsonParseOptions {
        JsonParseOptions {
            data: data.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    #[test]
    fn json_path_walks_objects_and_arrays() {
        let body = r#"{"data": {"prices": [1.5, 2.5, {"usd": 3}]}}"#;
        let inputs = [NativeValue::from(body)];
        let env = Environment::new();

        assert_eq!(
            json_parse(&json_opts("", "data,prices,0"), &env, &inputs).unwrap(),
            NativeValue::Float(1.5)
        );
        assert_eq!(
            json_parse(&json_opts("", "data,prices,-1,usd"), &env, &inputs).unwrap(),
            NativeValue::Int(BigInt::from(3))
        );
    }

    #[test]
    fn json_missing_key_is_error_unless_lax() {
        let env = Environment::new();
        let inputs = [NativeValue::from(r#"{"a": 1}"#)];
        assert!(json_parse(&json_opts("", "b"), &env, &inputs).is_err());

        let lax = JsonParseOptions {
            path: "b".into(),
            lax: "true".into(),
            ..Default::default()
        };
        assert_eq!(json_parse(&lax, &env, &inputs).unwrap(), NativeValue::Null);
    }

    #[test]
    fn json_custom_separator_and_variable_data() {
        let mut env = Environment::new();
        env.insert("fetch", NativeValue::from(r#"{"a": {"b": "deep"}}"#));
        let opts = JsonParseOptions {
            data: "$(fetch)".into(),
            path: "a.b".into(),
            separator: ".".into(),
            lax: String::new(),
        };
        assert_eq!(json_parse(&opts, &env, &[]).unwrap(), NativeValue::from("deep"));
    }

    #[test]
    fn json_rejects_non_json_text() {
        let inputs = [NativeValue::from("<html>")];
        assert!(json_parse(&json_opts("", ""), &Environment::new(), &inputs).is_err());
    }

    #[test]
    fn cbor_diet_mode_reads_bare_pairs() {
        let map = ciborium::Value::Map(vec![
            (ciborium::Value::Text("path".into()), ciborium::Value::Text("USD".into())),
            (ciborium::Value::Text("times".into()), ciborium::Value::Integer(100.into())),
        ]);
        let mut encoded = Vec::new();
        ciborium::into_writer(&map, &mut encoded).unwrap();
        // Drop the definite-length map header.
        let bare = format!("0x{}", hex::encode(&encoded[1..]));

        let opts = CborParseOptions {
            data: bare,
            mode: String::new(),
        };
        let NativeValue::Map(out) = cbor_parse(&opts, &Environment::new(), &[]).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(out["path"], NativeValue::from("USD"));
        assert_eq!(out["times"], NativeValue::Int(BigInt::from(100)));
    }

    #[test]
    fn cbor_standard_mode_decodes_bignums() {
        // 2^128, one byte wider than a native CBOR integer.
        let mut magnitude = vec![1u8];
        magnitude.extend_from_slice(&[0u8; 16]);
        let big = ciborium::Value::Tag(2, Box::new(ciborium::Value::Bytes(magnitude.clone())));
        let neg = ciborium::Value::Tag(3, Box::new(ciborium::Value::Bytes(magnitude)));
        let mut encoded = Vec::new();
        ciborium::into_writer(&ciborium::Value::Array(vec![big, neg]), &mut encoded).unwrap();

        let opts = CborParseOptions {
            data: String::new(),
            mode: "standard".into(),
        };
        let out = cbor_parse(&opts, &Environment::new(), &[NativeValue::Bytes(encoded)]).unwrap();
        assert_eq!(
            out,
            NativeValue::Array(vec![
                NativeValue::Int(BigInt::from(1u8) << 128),
                NativeValue::Int(-(BigInt::from(1u8) << 128u32) - 1),
            ])
        );
    }

    #[test]
    fn cbor_unknown_mode_is_error() {
        let opts = CborParseOptions {
            data: "0x00".into(),
            mode: "compact".into(),
        };
        assert!(cbor_parse(&opts, &Environment::new(), &[]).is_err());
    }
}
