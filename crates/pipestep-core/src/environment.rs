//! Per-call environment: variable name → native value.
//!
//! Rebuilt from the caller's token at the start of every step, mutated by
//! folding in one result, re-encoded for the response and dropped.

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::codec::{self, CodecError, Token};
use crate::value::NativeValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, NativeValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("variable {0:?} is not defined")]
    Undefined(String),
    #[error("{path:?}: no key {segment:?} in map")]
    MissingKey { path: String, segment: String },
    #[error("{path:?}: index {segment:?} out of range for array of {len}")]
    OutOfRange {
        path: String,
        segment: String,
        len: usize,
    },
    #[error("{path:?}: cannot index into {kind} with {segment:?}")]
    NotIndexable {
        path: String,
        segment: String,
        kind: &'static str,
    },
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: BTreeMap<String, NativeValue>) -> Self {
        Self { vars }
    }

    /// Decode a client-held token. Absent or blank is the empty environment.
    pub fn decode(token: Option<&str>) -> Result<Self, CodecError> {
        codec::decode_environment(token)
    }

    pub fn encode(&self) -> Result<Token, CodecError> {
        codec::encode_map(&self.vars)
    }

    /// Insert, overwriting any existing entry. Returns the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: NativeValue) -> Option<NativeValue> {
        self.vars.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.vars.get(name)
    }

    /// Resolve a dotted path such as `jobRun.payment` or `parse.data.0`.
    ///
    /// The first segment names a variable; later segments walk map keys and
    /// array indices.
    pub fn lookup(&self, path: &str) -> Result<&NativeValue, LookupError> {
        let path = path.trim();
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or_default();
        let mut current = self
            .vars
            .get(head)
            .ok_or_else(|| LookupError::Undefined(head.to_string()))?;

        for segment in segments {
            current = match current {
                NativeValue::Map(map) => {
                    map.get(segment).ok_or_else(|| LookupError::MissingKey {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })?
                }
                NativeValue::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| LookupError::OutOfRange {
                        path: path.to_string(),
                        segment: segment.to_string(),
                        len: items.len(),
                    })?,
                other => {
                    return Err(LookupError::NotIndexable {
                        path: path.to_string(),
                        segment: segment.to_string(),
                        kind: other.kind_name(),
                    })
                }
            };
        }
        Ok(current)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, NativeValue> {
        self.vars.iter()
    }

    /// Human-readable view for responses.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Environment {
    type Item = (&'a String, &'a NativeValue);
    type IntoIter = btree_map::Iter<'a, String, NativeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}
