// src/gateway/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rpc::error::GatewayError;
use crate::utils::{hex_field_to_decimal, hex_field_to_u64, optional_hex_u64};

// --- Network ---

/// Snapshot of the chain and the gateway's endpoint pool.
#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub chain_id: u64,
    pub latest_block: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price_wei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    pub endpoints: Vec<EndpointStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub url: String,
    pub health: String,
    pub budget_tokens: f64,
}

// --- Accounts ---

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: String,
    pub balance_wei: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_contract: Option<bool>,
}

// --- Blocks ---

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: DateTime<Utc>,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub miner: String,
    pub transaction_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<TxInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hashes: Option<Vec<String>>,
}

impl BlockInfo {
    /// Build from an `eth_getBlockBy*` result object.
    pub fn from_rpc(block: &Value, include_transactions: bool) -> Result<Self, GatewayError> {
        let number = hex_field_to_u64(block, "number")?;
        let timestamp_secs = hex_field_to_u64(block, "timestamp")?;
        let timestamp = DateTime::<Utc>::from_timestamp(timestamp_secs as i64, 0)
            .ok_or_else(|| GatewayError::protocol("block timestamp out of range"))?;

        let txs = block.get("transactions").and_then(Value::as_array);
        let transaction_count = txs.map(Vec::len).unwrap_or(0);

        let (transactions, transaction_hashes) = if include_transactions {
            let parsed = txs
                .map(|items| items.iter().map(TxInfo::from_rpc).collect::<Result<Vec<_>, _>>())
                .transpose()?;
            (parsed, None)
        } else {
            let hashes = txs.map(|items| {
                items
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            });
            (None, hashes)
        };

        Ok(Self {
            number,
            hash: str_field(block, "hash")?,
            parent_hash: str_field(block, "parentHash")?,
            timestamp,
            gas_used: hex_field_to_u64(block, "gasUsed")?,
            gas_limit: hex_field_to_u64(block, "gasLimit")?,
            miner: block
                .get("miner")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            transaction_count,
            transactions,
            transaction_hashes,
        })
    }
}

// --- Transactions ---

#[derive(Debug, Serialize, Deserialize)]
pub struct TxInfo {
    pub hash: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub value_wei: String,
    pub gas: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price_wei: Option<String>,
    pub nonce: u64,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_index: Option<u64>,
    /// 1 = success, 0 = reverted. Absent while pending or when the receipt
    /// lookup failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
}

impl TxInfo {
    /// Build from an `eth_getTransactionByHash` result object.
    pub fn from_rpc(tx: &Value) -> Result<Self, GatewayError> {
        Ok(Self {
            hash: str_field(tx, "hash")?,
            from: str_field(tx, "from")?,
            to: tx.get("to").and_then(Value::as_str).map(str::to_string),
            value_wei: hex_field_to_decimal(tx, "value")?,
            gas: hex_field_to_u64(tx, "gas")?,
            gas_price_wei: match tx.get("gasPrice").and_then(Value::as_str) {
                Some(_) => Some(hex_field_to_decimal(tx, "gasPrice")?),
                None => None,
            },
            nonce: hex_field_to_u64(tx, "nonce")?,
            input: tx
                .get("input")
                .and_then(Value::as_str)
                .unwrap_or("0x")
                .to_string(),
            block_number: optional_hex_u64(tx, "blockNumber")?,
            block_hash: tx.get("blockHash").and_then(Value::as_str).map(str::to_string),
            transaction_index: optional_hex_u64(tx, "transactionIndex")?,
            status: None,
            gas_used: None,
        })
    }

    /// Fold receipt fields in; called only when the receipt lookup
    /// succeeded.
    pub fn apply_receipt(&mut self, receipt: &Value) {
        self.status = receipt
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
        self.gas_used = receipt
            .get("gasUsed")
            .and_then(Value::as_str)
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
    }
}

// --- Tokens ---

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_supply_formatted: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenBalanceInfo {
    pub token_address: String,
    pub account_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_decimals: Option<u8>,
    /// Raw balance in the token's smallest unit.
    pub balance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_formatted: Option<String>,
}

fn str_field(obj: &Value, field: &str) -> Result<String, GatewayError> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::protocol(format!("response missing '{field}' field")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_block(with_full_txs: bool) -> Value {
        let txs = if with_full_txs {
            json!([{
                "hash": "0xaaa1",
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "value": "0xde0b6b3a7640000",
                "gas": "0x5208",
                "gasPrice": "0x3b9aca00",
                "nonce": "0x1",
                "input": "0x",
                "blockNumber": "0x10",
                "blockHash": "0xbbb1",
                "transactionIndex": "0x0"
            }])
        } else {
            json!(["0xaaa1"])
        };
        json!({
            "number": "0x10",
            "hash": "0xbbb1",
            "parentHash": "0xbbb0",
            "timestamp": "0x64000000",
            "gasUsed": "0x5208",
            "gasLimit": "0x1c9c380",
            "miner": "0x3333333333333333333333333333333333333333",
            "transactions": txs
        })
    }

    #[test]
    fn parses_block_with_hashes_only() {
        let block = BlockInfo::from_rpc(&sample_block(false), false).unwrap();
        assert_eq!(block.number, 16);
        assert_eq!(block.transaction_count, 1);
        assert!(block.transactions.is_none());
        assert_eq!(block.transaction_hashes.as_ref().unwrap()[0], "0xaaa1");
    }

    #[test]
    fn parses_block_with_full_transactions() {
        let block = BlockInfo::from_rpc(&sample_block(true), true).unwrap();
        let txs = block.transactions.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].value_wei, "1000000000000000000");
        assert_eq!(txs[0].gas, 21000);
    }

    #[test]
    fn malformed_block_is_a_protocol_error() {
        let err = BlockInfo::from_rpc(&json!({"hash": "0x1"}), false).unwrap_err();
        assert_eq!(err.kind(), crate::rpc::error::ErrorKind::Protocol);
    }

    #[test]
    fn receipt_fields_fold_into_tx() {
        let block = sample_block(true);
        let mut tx = TxInfo::from_rpc(&block["transactions"][0]).unwrap();
        assert!(tx.status.is_none());
        tx.apply_receipt(&json!({"status": "0x1", "gasUsed": "0x5200"}));
        assert_eq!(tx.status, Some(1));
        assert_eq!(tx.gas_used, Some(20992));
    }
}
