// src/abi/value.rs

use ethers_core::types::{Address, I256, U256};
use ethers_core::utils::to_checksum;
use serde_json::{json, Value as Json};
use std::str::FromStr;

use crate::abi::ParamKind;
use crate::rpc::error::GatewayError;

/// Closed union of decoded ABI values.
///
/// Integers carry their declared bit width so callers can tell a `uint8`
/// from a `uint256` after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Uint(U256, usize),
    Int(I256, usize),
    Address(Address),
    Bool(bool),
    Bytes(Vec<u8>),
    FixedBytes(Vec<u8>),
    String(String),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Render for tool output: integers as decimal strings (JSON numbers
    /// cannot hold 256 bits), addresses checksummed, byte strings
    /// 0x-prefixed.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Uint(v, _) => json!(v.to_string()),
            Self::Int(v, _) => json!(v.to_string()),
            Self::Address(a) => json!(to_checksum(a, None)),
            Self::Bool(b) => json!(b),
            Self::Bytes(b) | Self::FixedBytes(b) => json!(format!("0x{}", hex::encode(b))),
            Self::String(s) => json!(s),
            Self::Array(items) | Self::Tuple(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Coerce a JSON tool argument into a typed value. `param` names the
    /// parameter in error messages.
    pub fn from_json(kind: &ParamKind, raw: &Json, param: &str) -> Result<Self, GatewayError> {
        let mismatch = |expected: &str| {
            GatewayError::invalid_argument(format!(
                "parameter '{param}' expects {expected}, got {raw}"
            ))
        };

        match kind {
            ParamKind::Uint(w) => {
                let v = match raw {
                    Json::String(s) => parse_u256(s)
                        .ok_or_else(|| mismatch("a decimal or 0x-hex unsigned integer"))?,
                    Json::Number(n) => {
                        U256::from(n.as_u64().ok_or_else(|| mismatch("an unsigned integer"))?)
                    }
                    _ => return Err(mismatch("an unsigned integer")),
                };
                Ok(Self::Uint(v, *w))
            }
            ParamKind::Int(w) => {
                let v = match raw {
                    Json::String(s) => I256::from_dec_str(s.trim())
                        .map_err(|_| mismatch("a decimal signed integer"))?,
                    Json::Number(n) => {
                        I256::from(n.as_i64().ok_or_else(|| mismatch("a signed integer"))?)
                    }
                    _ => return Err(mismatch("a signed integer")),
                };
                Ok(Self::Int(v, *w))
            }
            ParamKind::Address => {
                let s = raw.as_str().ok_or_else(|| mismatch("a 0x-prefixed address"))?;
                let a = Address::from_str(s).map_err(|_| mismatch("a 0x-prefixed address"))?;
                Ok(Self::Address(a))
            }
            ParamKind::Bool => match raw {
                Json::Bool(b) => Ok(Self::Bool(*b)),
                Json::String(s) if s == "true" => Ok(Self::Bool(true)),
                Json::String(s) if s == "false" => Ok(Self::Bool(false)),
                _ => Err(mismatch("a boolean")),
            },
            ParamKind::Bytes => Ok(Self::Bytes(parse_hex_bytes(raw).ok_or_else(|| {
                mismatch("a 0x-prefixed byte string")
            })?)),
            ParamKind::FixedBytes(n) => {
                let bytes =
                    parse_hex_bytes(raw).ok_or_else(|| mismatch("a 0x-prefixed byte string"))?;
                if bytes.len() != *n {
                    return Err(GatewayError::invalid_argument(format!(
                        "parameter '{param}' expects bytes{n}, got {} bytes",
                        bytes.len()
                    )));
                }
                Ok(Self::FixedBytes(bytes))
            }
            ParamKind::String => {
                Ok(Self::String(raw.as_str().ok_or_else(|| mismatch("a string"))?.to_string()))
            }
            ParamKind::Array(inner) => {
                let items = raw.as_array().ok_or_else(|| mismatch("an array"))?;
                let values = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::from_json(inner, item, &format!("{param}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Array(values))
            }
            ParamKind::FixedArray(inner, n) => {
                let items = raw.as_array().ok_or_else(|| mismatch("an array"))?;
                if items.len() != *n {
                    return Err(GatewayError::invalid_argument(format!(
                        "parameter '{param}' expects {n} elements, got {}",
                        items.len()
                    )));
                }
                let values = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::from_json(inner, item, &format!("{param}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Array(values))
            }
            ParamKind::Tuple(kinds) => {
                let items = raw.as_array().ok_or_else(|| mismatch("a tuple array"))?;
                if items.len() != kinds.len() {
                    return Err(GatewayError::invalid_argument(format!(
                        "parameter '{param}' expects a {}-element tuple, got {}",
                        kinds.len(),
                        items.len()
                    )));
                }
                let values = kinds
                    .iter()
                    .zip(items)
                    .enumerate()
                    .map(|(i, (k, item))| Self::from_json(k, item, &format!("{param}.{i}")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Tuple(values))
            }
        }
    }
}

fn parse_u256(s: &str) -> Option<U256> {
    let s = s.trim();
    if let Some(hexpart) = s.strip_prefix("0x") {
        U256::from_str_radix(hexpart, 16).ok()
    } else {
        U256::from_dec_str(s).ok()
    }
}

fn parse_hex_bytes(raw: &Json) -> Option<Vec<u8>> {
    let s = raw.as_str()?;
    let s = s.strip_prefix("0x")?;
    hex::decode(s).ok()
}
