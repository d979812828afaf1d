// src/abi/mod.rs
//
// Contract interface fragments and the binary codec for call data, return
// data, and log payloads.

pub mod codec;
pub mod erc20;
pub mod event;
pub mod value;

use ethers_core::types::H256;
use ethers_core::utils::keccak256;
use serde_json::Value as Json;
use std::fmt;

use crate::rpc::error::GatewayError;

pub use codec::{decode_output, decode_values, encode_call, encode_values};
pub use event::{decode_log, DecodedEvent, DecodedEventParam, EventAbi, EventParam};
pub use value::Value;

/// Closed union of ABI parameter types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Unsigned integer, width in bits (8..=256, multiple of 8).
    Uint(usize),
    /// Signed integer, width in bits (8..=256, multiple of 8).
    Int(usize),
    Address,
    Bool,
    /// Dynamic byte string.
    Bytes,
    /// `bytesN`, 1..=32.
    FixedBytes(usize),
    /// UTF-8 string.
    String,
    /// Dynamic-length array.
    Array(Box<ParamKind>),
    /// Fixed-length array.
    FixedArray(Box<ParamKind>, usize),
    Tuple(Vec<ParamKind>),
}

impl ParamKind {
    /// Parse a canonical type string, e.g. `uint256`, `address[]`,
    /// `(uint8,string)[4]`.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(GatewayError::invalid_argument("empty ABI type"));
        }

        // Array suffixes bind last.
        if s.ends_with(']') {
            let open = s.rfind('[').ok_or_else(|| {
                GatewayError::invalid_argument(format!("malformed ABI type '{s}'"))
            })?;
            let inner = Self::parse(&s[..open])?;
            let len = &s[open + 1..s.len() - 1];
            return if len.is_empty() {
                Ok(Self::Array(Box::new(inner)))
            } else {
                let n: usize = len.parse().map_err(|_| {
                    GatewayError::invalid_argument(format!("bad array length in '{s}'"))
                })?;
                Ok(Self::FixedArray(Box::new(inner), n))
            };
        }

        if s.starts_with('(') && s.ends_with(')') {
            let kinds = split_top_level(&s[1..s.len() - 1])?
                .into_iter()
                .map(Self::parse)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Tuple(kinds));
        }

        match s {
            "address" => Ok(Self::Address),
            "bool" => Ok(Self::Bool),
            "bytes" => Ok(Self::Bytes),
            "string" => Ok(Self::String),
            "uint" => Ok(Self::Uint(256)),
            "int" => Ok(Self::Int(256)),
            _ => {
                if let Some(w) = s.strip_prefix("uint") {
                    Ok(Self::Uint(parse_width(w, s)?))
                } else if let Some(w) = s.strip_prefix("int") {
                    Ok(Self::Int(parse_width(w, s)?))
                } else if let Some(n) = s.strip_prefix("bytes") {
                    let n: usize = n.parse().map_err(|_| {
                        GatewayError::invalid_argument(format!("unknown ABI type '{s}'"))
                    })?;
                    if (1..=32).contains(&n) {
                        Ok(Self::FixedBytes(n))
                    } else {
                        Err(GatewayError::invalid_argument(format!(
                            "bytes{n} is out of range (1..=32)"
                        )))
                    }
                } else {
                    Err(GatewayError::invalid_argument(format!("unknown ABI type '{s}'")))
                }
            }
        }
    }

    /// Whether values of this type live in the tail of the head/tail
    /// layout.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Bytes | Self::String | Self::Array(_) => true,
            Self::FixedArray(inner, _) => inner.is_dynamic(),
            Self::Tuple(kinds) => kinds.iter().any(ParamKind::is_dynamic),
            _ => false,
        }
    }

    /// Bytes this type occupies in the head of its frame. Dynamic types
    /// contribute one offset word.
    pub fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return 32;
        }
        match self {
            Self::FixedArray(inner, n) => inner.head_size() * n,
            Self::Tuple(kinds) => kinds.iter().map(ParamKind::head_size).sum(),
            _ => 32,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(w) => write!(f, "uint{w}"),
            Self::Int(w) => write!(f, "int{w}"),
            Self::Address => write!(f, "address"),
            Self::Bool => write!(f, "bool"),
            Self::Bytes => write!(f, "bytes"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::String => write!(f, "string"),
            Self::Array(inner) => write!(f, "{inner}[]"),
            Self::FixedArray(inner, n) => write!(f, "{inner}[{n}]"),
            Self::Tuple(kinds) => {
                let parts: Vec<String> = kinds.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(","))
            }
        }
    }
}

fn parse_width(w: &str, full: &str) -> Result<usize, GatewayError> {
    let w: usize = w
        .parse()
        .map_err(|_| GatewayError::invalid_argument(format!("unknown ABI type '{full}'")))?;
    if w == 0 || w > 256 || w % 8 != 0 {
        return Err(GatewayError::invalid_argument(format!(
            "integer width {w} must be a multiple of 8 in 8..=256"
        )));
    }
    Ok(w)
}

/// Split a tuple body on commas, respecting nested parens and brackets.
fn split_top_level(s: &str) -> Result<Vec<&str>, GatewayError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(GatewayError::invalid_argument(format!("unbalanced parens in '{s}'")));
    }
    if !s.is_empty() {
        parts.push(&s[start..]);
    }
    Ok(parts)
}

/// A named parameter in a function or event fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), kind }
    }

    fn from_json(entry: &Json) -> Result<Self, GatewayError> {
        let name = entry.get("name").and_then(Json::as_str).unwrap_or_default().to_string();
        let ty = entry
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| GatewayError::invalid_argument("ABI parameter missing 'type'"))?;
        let kind = kind_from_json(ty, entry.get("components"))?;
        Ok(Self { name, kind })
    }
}

/// Resolve a JSON-ABI type string, expanding `tuple` via `components`.
fn kind_from_json(ty: &str, components: Option<&Json>) -> Result<ParamKind, GatewayError> {
    if let Some(suffix) = ty.strip_prefix("tuple") {
        let comps = components.and_then(Json::as_array).ok_or_else(|| {
            GatewayError::invalid_argument("tuple ABI parameter missing 'components'")
        })?;
        let kinds = comps
            .iter()
            .map(|c| Param::from_json(c).map(|p| p.kind))
            .collect::<Result<Vec<_>, _>>()?;
        let mut kind = ParamKind::Tuple(kinds);
        let mut rest = suffix;
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| {
                GatewayError::invalid_argument(format!("malformed tuple suffix '{ty}'"))
            })?;
            let len = &rest[1..close];
            kind = if len.is_empty() {
                ParamKind::Array(Box::new(kind))
            } else {
                let n: usize = len.parse().map_err(|_| {
                    GatewayError::invalid_argument(format!("bad array length in '{ty}'"))
                })?;
                ParamKind::FixedArray(Box::new(kind), n)
            };
            rest = &rest[close + 1..];
        }
        Ok(kind)
    } else {
        ParamKind::parse(ty)
    }
}

/// A function fragment of a contract interface. Immutable after parse.
#[derive(Debug, Clone)]
pub struct FunctionAbi {
    pub name: String,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    pub state_mutability: String,
}

impl FunctionAbi {
    /// Canonical signature, e.g. `balanceOf(address)`.
    pub fn signature(&self) -> String {
        let types: Vec<String> = self.inputs.iter().map(|p| p.kind.to_string()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// Four-byte call-data selector.
    pub fn selector(&self) -> [u8; 4] {
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&keccak256(self.signature().as_bytes())[0..4]);
        sel
    }

    pub fn from_json(entry: &Json) -> Result<Self, GatewayError> {
        let name = entry
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| GatewayError::invalid_argument("ABI function missing 'name'"))?
            .to_string();
        let inputs = params_from_json(entry.get("inputs"))?;
        let outputs = params_from_json(entry.get("outputs"))?;
        let state_mutability = entry
            .get("stateMutability")
            .and_then(Json::as_str)
            .unwrap_or("nonpayable")
            .to_string();
        Ok(Self { name, inputs, outputs, state_mutability })
    }

    /// Locate a function by name in a JSON ABI array.
    pub fn find_in_abi(abi: &Json, name: &str) -> Result<Self, GatewayError> {
        let entries = abi
            .as_array()
            .ok_or_else(|| GatewayError::invalid_argument("ABI must be a JSON array"))?;
        entries
            .iter()
            .find(|e| {
                e.get("type").and_then(Json::as_str) == Some("function")
                    && e.get("name").and_then(Json::as_str) == Some(name)
            })
            .map(Self::from_json)
            .transpose()?
            .ok_or_else(|| {
                GatewayError::invalid_argument(format!("function '{name}' not found in ABI"))
            })
    }
}

fn params_from_json(list: Option<&Json>) -> Result<Vec<Param>, GatewayError> {
    match list.and_then(Json::as_array) {
        Some(items) => items.iter().map(Param::from_json).collect(),
        None => Ok(Vec::new()),
    }
}

/// Hash of an event's canonical signature (topic zero for non-anonymous
/// events).
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_types() {
        assert_eq!(ParamKind::parse("uint256").unwrap(), ParamKind::Uint(256));
        assert_eq!(ParamKind::parse("uint").unwrap(), ParamKind::Uint(256));
        assert_eq!(ParamKind::parse("int8").unwrap(), ParamKind::Int(8));
        assert_eq!(ParamKind::parse("bytes32").unwrap(), ParamKind::FixedBytes(32));
        assert_eq!(ParamKind::parse("address").unwrap(), ParamKind::Address);
        assert!(ParamKind::parse("uint7").is_err());
        assert!(ParamKind::parse("uint264").is_err());
        assert!(ParamKind::parse("bytes33").is_err());
        assert!(ParamKind::parse("float").is_err());
    }

    #[test]
    fn parses_compound_types() {
        assert_eq!(
            ParamKind::parse("uint8[4][]").unwrap(),
            ParamKind::Array(Box::new(ParamKind::FixedArray(Box::new(ParamKind::Uint(8)), 4)))
        );
        assert_eq!(
            ParamKind::parse("(uint256,address)[2]").unwrap(),
            ParamKind::FixedArray(
                Box::new(ParamKind::Tuple(vec![ParamKind::Uint(256), ParamKind::Address])),
                2
            )
        );
    }

    #[test]
    fn display_round_trips() {
        for ty in ["uint256", "int128", "address[]", "(bool,string)[3]", "bytes4"] {
            let kind = ParamKind::parse(ty).unwrap();
            assert_eq!(kind.to_string(), ty);
            assert_eq!(ParamKind::parse(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn dynamic_and_head_size() {
        assert!(ParamKind::String.is_dynamic());
        assert!(ParamKind::parse("uint8[]").unwrap().is_dynamic());
        assert!(ParamKind::parse("string[2]").unwrap().is_dynamic());
        assert!(!ParamKind::parse("uint8[2]").unwrap().is_dynamic());

        assert_eq!(ParamKind::parse("uint8[2]").unwrap().head_size(), 64);
        assert_eq!(ParamKind::parse("string").unwrap().head_size(), 32);
        assert_eq!(
            ParamKind::Tuple(vec![ParamKind::Uint(8), ParamKind::Bool]).head_size(),
            64
        );
    }

    #[test]
    fn selector_matches_known_value() {
        let f = FunctionAbi {
            name: "transfer".into(),
            inputs: vec![
                Param::new("to", ParamKind::Address),
                Param::new("value", ParamKind::Uint(256)),
            ],
            outputs: vec![],
            state_mutability: "nonpayable".into(),
        };
        assert_eq!(f.signature(), "transfer(address,uint256)");
        assert_eq!(f.selector(), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn parses_json_abi_fragment() {
        let abi = serde_json::json!([
            {
                "type": "function",
                "name": "balanceOf",
                "stateMutability": "view",
                "inputs": [{"name": "owner", "type": "address"}],
                "outputs": [{"name": "", "type": "uint256"}]
            },
            {"type": "event", "name": "Transfer", "inputs": []}
        ]);
        let f = FunctionAbi::find_in_abi(&abi, "balanceOf").unwrap();
        assert_eq!(f.inputs.len(), 1);
        assert_eq!(f.outputs[0].kind, ParamKind::Uint(256));
        assert!(FunctionAbi::find_in_abi(&abi, "missing").is_err());
    }

    #[test]
    fn parses_tuple_components() {
        let entry = serde_json::json!({
            "type": "function",
            "name": "submit",
            "inputs": [{
                "name": "order",
                "type": "tuple[]",
                "components": [
                    {"name": "maker", "type": "address"},
                    {"name": "amount", "type": "uint256"}
                ]
            }],
            "outputs": []
        });
        let f = FunctionAbi::from_json(&entry).unwrap();
        assert_eq!(
            f.inputs[0].kind,
            ParamKind::Array(Box::new(ParamKind::Tuple(vec![
                ParamKind::Address,
                ParamKind::Uint(256)
            ])))
        );
        assert_eq!(f.signature(), "submit((address,uint256)[])");
    }
}
