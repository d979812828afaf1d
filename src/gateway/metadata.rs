// src/gateway/metadata.rs

use dashmap::DashMap;
use ethers_core::types::Address;

/// Human-readable description of one contract function, supplied by an
/// external content-fetch collaborator.
#[derive(Debug, Clone)]
pub struct FunctionDoc {
    pub label: String,
    pub param_labels: Vec<String>,
    pub summary: Option<String>,
}

/// Registry of contract function docs keyed by (contract, selector).
///
/// The collaborator populates it out of band; an empty registry is the
/// normal state and never blocks decoding — lookups just come back empty
/// and output stays unlabeled.
#[derive(Default)]
pub struct MetadataRegistry {
    entries: DashMap<(Address, [u8; 4]), FunctionDoc>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, contract: Address, selector: [u8; 4], doc: FunctionDoc) {
        self.entries.insert((contract, selector), doc);
    }

    pub fn lookup(&self, contract: Address, selector: [u8; 4]) -> Option<FunctionDoc> {
        self.entries.get(&(contract, selector)).map(|d| d.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
