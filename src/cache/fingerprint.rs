// src/cache/fingerprint.rs

use std::fmt;

use sha2::{Digest, Sha256};

use crate::rpc::types::CallRequest;

/// Deterministic identity of a cacheable request: chain id, method,
/// canonicalized params, and block scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

pub fn fingerprint_for(chain_id: u64, req: &CallRequest) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(chain_id.to_be_bytes());
    hasher.update(req.method.as_bytes());
    hasher.update([0u8]);
    // Params are built by the dispatcher from typed inputs, so their JSON
    // rendering is stable for identical requests.
    hasher.update(serde_json::to_vec(&req.params).unwrap_or_default());
    hasher.update([0u8]);
    hasher.update(req.block.fingerprint_tag().as_bytes());
    Fingerprint(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::BlockRef;
    use serde_json::json;

    #[test]
    fn identical_requests_share_a_fingerprint() {
        let a = CallRequest::new("eth_getBalance", vec![json!("0xabc"), json!("latest")]);
        let b = CallRequest::new("eth_getBalance", vec![json!("0xabc"), json!("latest")]);
        assert_eq!(fingerprint_for(1, &a), fingerprint_for(1, &b));
    }

    #[test]
    fn any_component_changes_the_fingerprint() {
        let base = CallRequest::new("eth_getBalance", vec![json!("0xabc"), json!("latest")]);
        let fp = fingerprint_for(1, &base);

        let other_chain = fingerprint_for(5, &base);
        assert_ne!(fp, other_chain);

        let other_method =
            CallRequest::new("eth_getCode", vec![json!("0xabc"), json!("latest")]);
        assert_ne!(fp, fingerprint_for(1, &other_method));

        let other_params =
            CallRequest::new("eth_getBalance", vec![json!("0xdef"), json!("latest")]);
        assert_ne!(fp, fingerprint_for(1, &other_params));

        let other_scope = base.clone().at(BlockRef::Number(100));
        assert_ne!(fp, fingerprint_for(1, &other_scope));
    }
}
