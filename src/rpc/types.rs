// src/rpc/types.rs

use ethers_core::types::H256;
use serde::Serialize;
use serde_json::{json, Value};

/// Which point of the chain a request is scoped to.
///
/// `Latest`/`Pending` track the moving head; `Number`/`Hash` pin an
/// immutable historical point and make the result cacheable forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRef {
    Latest,
    Pending,
    Number(u64),
    Hash(H256),
}

impl BlockRef {
    pub fn is_pinned(&self) -> bool {
        matches!(self, Self::Number(_) | Self::Hash(_))
    }

    /// Render as a JSON-RPC block parameter. Hash scope uses the EIP-1898
    /// object form so nodes resolve it atomically.
    pub fn as_param(&self) -> Value {
        match self {
            Self::Latest => json!("latest"),
            Self::Pending => json!("pending"),
            Self::Number(n) => json!(format!("0x{n:x}")),
            Self::Hash(h) => json!({ "blockHash": format!("{h:?}") }),
        }
    }

    /// Stable tag used in the cache fingerprint.
    pub fn fingerprint_tag(&self) -> String {
        match self {
            Self::Latest => "latest".to_string(),
            Self::Pending => "pending".to_string(),
            Self::Number(n) => format!("n:{n}"),
            Self::Hash(h) => format!("h:{h:?}"),
        }
    }
}

/// A single upstream node call: method, ordered params, block scope.
/// Immutable once built; combined with the chain id it identifies a cache
/// fingerprint.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub block: BlockRef,
}

impl CallRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self { method: method.into(), params, block: BlockRef::Latest }
    }

    pub fn at(mut self, block: BlockRef) -> Self {
        self.block = block;
        self
    }
}

/// Successful outcome of a gateway call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Raw decoded JSON value from the upstream (hex quantities intact).
    pub value: Value,
    /// Whether this result was served without an upstream round-trip.
    pub served_from_cache: bool,
    /// Head height observed when the value was fetched, when known.
    pub block_height: Option<u64>,
}

// --- JSON-RPC wire envelope ---

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: &'a [Value],
    pub id: u64,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(method: &'a str, params: &'a [Value], id: u64) -> Self {
        Self { jsonrpc: "2.0", method, params, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn block_ref_params() {
        assert_eq!(BlockRef::Latest.as_param(), json!("latest"));
        assert_eq!(BlockRef::Number(255).as_param(), json!("0xff"));

        let h = H256::from_str(
            "0x1111111111111111111111111111111111111111111111111111111111111111",
        )
        .unwrap();
        let param = BlockRef::Hash(h).as_param();
        assert_eq!(
            param["blockHash"],
            json!("0x1111111111111111111111111111111111111111111111111111111111111111")
        );
        assert!(BlockRef::Hash(h).is_pinned());
        assert!(BlockRef::Number(1).is_pinned());
        assert!(!BlockRef::Latest.is_pinned());
    }

    #[test]
    fn fingerprint_tags_distinguish_scopes() {
        let tags = [
            BlockRef::Latest.fingerprint_tag(),
            BlockRef::Pending.fingerprint_tag(),
            BlockRef::Number(7).fingerprint_tag(),
            BlockRef::Number(8).fingerprint_tag(),
        ];
        for (i, a) in tags.iter().enumerate() {
            for b in tags.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
