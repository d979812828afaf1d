// src/gateway/dispatcher.rs
//
// The orchestration layer: resolves a typed tool request into upstream
// calls through the cache-then-fetch path, applies the ABI codec, and
// assembles normalized results. Composite operations tolerate partial
// metadata failure rather than failing the whole request.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::{Address, H256, U256};
use ethers_core::utils::to_checksum;
use serde_json::{json, Value as Json};
use tokio::time::Instant;

use crate::abi::{self, codec, erc20, EventAbi, FunctionAbi, Value as AbiValue};
use crate::cache::{fingerprint_for, ResponseCache};
use crate::gateway::metadata::MetadataRegistry;
use crate::gateway::models::{
    AccountInfo, BlockInfo, EndpointStatus, NetworkStatus, TokenBalanceInfo, TokenInfo, TxInfo,
};
use crate::rpc::{
    error::GatewayError, BlockRef, CallOutcome, CallRequest, HealthState, RpcTransport,
};
use crate::utils::{self, hex_to_decimal, hex_to_u64};

/// Closed set of supported tool methods. Unknown names are rejected up
/// front instead of falling through to any dynamic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMethod {
    GetNetworkStatus,
    GetBlock,
    GetLatestBlocks,
    GetTransaction,
    GetAccount,
    GetTokenInfo,
    GetTokenBalance,
    CallContract,
    GetEvents,
    EstimateGas,
}

impl ToolMethod {
    pub const ALL: [ToolMethod; 10] = [
        Self::GetNetworkStatus,
        Self::GetBlock,
        Self::GetLatestBlocks,
        Self::GetTransaction,
        Self::GetAccount,
        Self::GetTokenInfo,
        Self::GetTokenBalance,
        Self::CallContract,
        Self::GetEvents,
        Self::EstimateGas,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetNetworkStatus => "get_network_status",
            Self::GetBlock => "get_block",
            Self::GetLatestBlocks => "get_latest_blocks",
            Self::GetTransaction => "get_transaction",
            Self::GetAccount => "get_account",
            Self::GetTokenInfo => "get_token_info",
            Self::GetTokenBalance => "get_token_balance",
            Self::CallContract => "call_contract",
            Self::GetEvents => "get_events",
            Self::EstimateGas => "estimate_gas",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, GatewayError> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == name)
            .ok_or_else(|| GatewayError::invalid_argument(format!("unknown tool method '{name}'")))
    }
}

/// Cache categories with distinct TTLs. Pinned block scope overrides the
/// category: those entries are permanent regardless.
#[derive(Debug, Clone, Copy)]
enum CacheClass {
    /// Data that tracks the chain head (balances, latest blocks).
    Volatile,
    /// Slow-moving data (token metadata, mined transactions).
    Metadata,
}

/// The gateway dispatcher. Shared across all inbound surfaces via `Arc`.
pub struct Gateway {
    chain_id: u64,
    transport: Arc<RpcTransport>,
    cache: Arc<ResponseCache>,
    metadata: Arc<MetadataRegistry>,
    latest_ttl: Duration,
    metadata_ttl: Duration,
    request_deadline: Duration,
}

impl Gateway {
    pub fn new(
        chain_id: u64,
        transport: Arc<RpcTransport>,
        cache: Arc<ResponseCache>,
        metadata: Arc<MetadataRegistry>,
        latest_ttl: Duration,
        metadata_ttl: Duration,
        request_deadline: Duration,
    ) -> Self {
        Self { chain_id, transport, cache, metadata, latest_ttl, metadata_ttl, request_deadline }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn metadata(&self) -> &Arc<MetadataRegistry> {
        &self.metadata
    }

    /// Handle one tool request under the per-request deadline.
    ///
    /// The outer timeout is a backstop with a small grace period past the
    /// transport-level deadline, so admission and retry failures surface
    /// with their precise kind instead of a generic timeout.
    pub async fn handle(&self, method: ToolMethod, args: &Json) -> Result<Json, GatewayError> {
        let backstop = self.request_deadline + Duration::from_millis(100);
        match tokio::time::timeout(backstop, self.dispatch(method, args)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Network(format!(
                "request deadline of {}ms exceeded",
                self.request_deadline.as_millis()
            ))),
        }
    }

    async fn dispatch(&self, method: ToolMethod, args: &Json) -> Result<Json, GatewayError> {
        match method {
            ToolMethod::GetNetworkStatus => self.network_status().await,
            ToolMethod::GetBlock => self.get_block(args).await,
            ToolMethod::GetLatestBlocks => self.get_latest_blocks(args).await,
            ToolMethod::GetTransaction => self.get_transaction(args).await,
            ToolMethod::GetAccount => self.get_account(args).await,
            ToolMethod::GetTokenInfo => self.get_token_info(args).await,
            ToolMethod::GetTokenBalance => self.get_token_balance(args).await,
            ToolMethod::CallContract => self.call_contract(args).await,
            ToolMethod::GetEvents => self.get_events(args).await,
            ToolMethod::EstimateGas => self.estimate_gas(args).await,
        }
    }

    fn ttl_for(&self, class: CacheClass) -> Duration {
        match class {
            CacheClass::Volatile => self.latest_ttl,
            CacheClass::Metadata => self.metadata_ttl,
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.request_deadline
    }

    fn height_hint(&self) -> Option<u64> {
        match self.cache.head() {
            0 => None,
            h => Some(h),
        }
    }

    /// Cache-then-fetch for a raw JSON-RPC call.
    async fn fetch(
        &self,
        req: CallRequest,
        class: CacheClass,
    ) -> Result<CallOutcome, GatewayError> {
        let fp = fingerprint_for(self.chain_id, &req);
        let ttl = self.ttl_for(class);
        let transport = Arc::clone(&self.transport);
        let deadline = self.deadline();
        let hint = self.height_hint();
        let scope = req.block;
        self.cache
            .lookup_or_fetch(fp, scope, ttl, move || async move {
                let value = transport.execute(&req, deadline).await?;
                let height = match scope {
                    BlockRef::Number(n) => Some(n),
                    _ => hint,
                };
                Ok((value, height))
            })
            .await
    }

    /// Like `fetch`, but a `null` result is an error and never cached.
    /// An absent block or transaction may well exist later.
    async fn fetch_non_null(
        &self,
        req: CallRequest,
        class: CacheClass,
        what: String,
    ) -> Result<CallOutcome, GatewayError> {
        let fp = fingerprint_for(self.chain_id, &req);
        let ttl = self.ttl_for(class);
        let transport = Arc::clone(&self.transport);
        let deadline = self.deadline();
        let hint = self.height_hint();
        let scope = req.block;
        self.cache
            .lookup_or_fetch(fp, scope, ttl, move || async move {
                let value = transport.execute(&req, deadline).await?;
                if value.is_null() {
                    return Err(GatewayError::invalid_argument(format!("{what} not found")));
                }
                let height = match scope {
                    BlockRef::Number(n) => Some(n),
                    _ => hint,
                };
                Ok((value, height))
            })
            .await
    }

    /// Encode, call, and decode one contract function. The decode runs
    /// inside the fetch, so a decode failure surfaces as `Decode` and the
    /// fingerprint stays uncached; what gets cached is the decoded result.
    async fn call_function(
        &self,
        to: Address,
        func: &FunctionAbi,
        args: &[AbiValue],
        block: BlockRef,
        class: CacheClass,
    ) -> Result<CallOutcome, GatewayError> {
        let data = codec::encode_call(func, args)?;
        let call_obj = json!({
            "to": to_checksum(&to, None),
            "data": format!("0x{}", hex::encode(&data)),
        });
        let req =
            CallRequest::new("eth_call", vec![call_obj, block.as_param()]).at(block);

        let fp = fingerprint_for(self.chain_id, &req);
        let ttl = self.ttl_for(class);
        let transport = Arc::clone(&self.transport);
        let deadline = self.deadline();
        let hint = self.height_hint();
        let func = func.clone();
        self.cache
            .lookup_or_fetch(fp, block, ttl, move || async move {
                let raw = transport.execute(&req, deadline).await?;
                let hex_str = raw.as_str().ok_or_else(|| {
                    GatewayError::protocol("eth_call result is not a hex string")
                })?;
                let bytes = hex::decode(hex_str.trim_start_matches("0x")).map_err(|e| {
                    GatewayError::protocol(format!("eth_call returned non-hex data: {e}"))
                })?;
                let decoded = codec::decode_output(&func, &bytes)?;
                let rendered = Json::Array(decoded.iter().map(AbiValue::to_json).collect());
                let height = match req.block {
                    BlockRef::Number(n) => Some(n),
                    _ => hint,
                };
                Ok((rendered, height))
            })
            .await
    }

    /// Fetch the current head and record it for staleness checks.
    async fn latest_height(&self) -> Result<u64, GatewayError> {
        let outcome =
            self.fetch(CallRequest::new("eth_blockNumber", vec![]), CacheClass::Volatile).await?;
        let raw = outcome
            .value
            .as_str()
            .ok_or_else(|| GatewayError::protocol("eth_blockNumber result is not a string"))?;
        let height = hex_to_u64(raw, "block number")?;
        self.cache.note_head(height);
        Ok(height)
    }

    // --- tool operations ---

    async fn network_status(&self) -> Result<Json, GatewayError> {
        let (height, chain, gas, version) = tokio::join!(
            self.latest_height(),
            self.fetch(CallRequest::new("eth_chainId", vec![]), CacheClass::Volatile),
            self.fetch(CallRequest::new("eth_gasPrice", vec![]), CacheClass::Volatile),
            self.fetch(CallRequest::new("web3_clientVersion", vec![]), CacheClass::Metadata),
        );
        let latest_block = height?;

        if let Ok(outcome) = &chain {
            if let Some(raw) = outcome.value.as_str() {
                if let Ok(upstream_chain) = hex_to_u64(raw, "chain id") {
                    if upstream_chain != self.chain_id {
                        tracing::warn!(
                            configured = self.chain_id,
                            upstream = upstream_chain,
                            "upstream chain id does not match configuration"
                        );
                    }
                }
            }
        }

        let gas_price_wei = gas
            .ok()
            .and_then(|o| o.value.as_str().and_then(|s| hex_to_decimal(s, "gas price").ok()));
        let client_version =
            version.ok().and_then(|o| o.value.as_str().map(str::to_string));

        let endpoints = self
            .transport
            .endpoints()
            .iter()
            .map(|ep| EndpointStatus {
                url: ep.url.to_string(),
                health: match ep.health() {
                    HealthState::Healthy => "healthy".to_string(),
                    HealthState::Degraded => "degraded".to_string(),
                    HealthState::Unreachable => "unreachable".to_string(),
                },
                budget_tokens: self.transport.budget_tokens(ep.id),
            })
            .collect();

        let status = NetworkStatus {
            chain_id: self.chain_id,
            latest_block,
            gas_price_wei,
            client_version,
            endpoints,
        };
        to_json(&status)
    }

    async fn get_block(&self, args: &Json) -> Result<Json, GatewayError> {
        let identifier = args
            .get("block_identifier")
            .ok_or_else(|| GatewayError::invalid_argument("missing 'block_identifier'"))?;
        let include = utils::get_optional_arg::<bool>(args, "include_transactions").unwrap_or(false);
        let scope = parse_block_identifier(identifier)?;

        let outcome = self.block_outcome(scope, include).await?;
        let info = BlockInfo::from_rpc(&outcome.value, include)?;
        if matches!(scope, BlockRef::Latest | BlockRef::Pending) {
            self.cache.note_head(info.number);
        }
        to_json(&info)
    }

    async fn block_outcome(
        &self,
        scope: BlockRef,
        include: bool,
    ) -> Result<CallOutcome, GatewayError> {
        let (method, params) = match scope {
            BlockRef::Hash(h) => {
                ("eth_getBlockByHash", vec![json!(format!("{h:?}")), json!(include)])
            }
            other => ("eth_getBlockByNumber", vec![other.as_param(), json!(include)]),
        };
        let class = if scope.is_pinned() { CacheClass::Metadata } else { CacheClass::Volatile };
        self.fetch_non_null(CallRequest::new(method, params).at(scope), class, "block".to_string())
            .await
    }

    async fn get_latest_blocks(&self, args: &Json) -> Result<Json, GatewayError> {
        let count = utils::get_optional_arg::<u64>(args, "count").unwrap_or(10);
        if !(1..=100).contains(&count) {
            return Err(GatewayError::invalid_argument("'count' must be between 1 and 100"));
        }

        let head = self.latest_height().await?;
        let start = head.saturating_sub(count - 1);
        let numbers: Vec<u64> = (start..=head).rev().collect();
        let results =
            futures::future::join_all(numbers.iter().map(|n| self.block_by_number(*n))).await;

        let mut blocks = Vec::with_capacity(numbers.len());
        for (number, result) in numbers.iter().zip(results) {
            match result {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    tracing::warn!(block = *number, error = %e, "skipping unfetchable block");
                }
            }
        }

        Ok(json!({
            "latest_height": head,
            "count": blocks.len(),
            "blocks": blocks.iter().map(to_json).collect::<Result<Vec<_>, _>>()?,
        }))
    }

    async fn block_by_number(&self, number: u64) -> Result<BlockInfo, GatewayError> {
        let outcome = self.block_outcome(BlockRef::Number(number), false).await?;
        BlockInfo::from_rpc(&outcome.value, false)
    }

    async fn get_transaction(&self, args: &Json) -> Result<Json, GatewayError> {
        let hash_str = require_str(args, "tx_hash")?;
        let hash = H256::from_str(&hash_str).map_err(|_| {
            GatewayError::invalid_argument(format!("'{hash_str}' is not a transaction hash"))
        })?;
        let hash_param = json!(format!("{hash:?}"));

        let (tx, receipt) = tokio::join!(
            self.fetch_non_null(
                CallRequest::new("eth_getTransactionByHash", vec![hash_param.clone()]),
                CacheClass::Metadata,
                format!("transaction {hash:?}"),
            ),
            // A pending transaction has no receipt yet, so the null must
            // not linger under the long metadata TTL.
            self.fetch(
                CallRequest::new("eth_getTransactionReceipt", vec![hash_param]),
                CacheClass::Volatile,
            ),
        );

        let tx = tx?;
        let mut info = TxInfo::from_rpc(&tx.value)?;
        match receipt {
            Ok(outcome) if !outcome.value.is_null() => info.apply_receipt(&outcome.value),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "receipt lookup failed; status fields omitted");
            }
        }
        to_json(&info)
    }

    async fn get_account(&self, args: &Json) -> Result<Json, GatewayError> {
        let address = require_address(args, "address")?;
        let checksum = to_checksum(&address, None);
        let params = vec![json!(checksum), json!("latest")];

        let (balance, nonce, code) = tokio::join!(
            self.fetch(
                CallRequest::new("eth_getBalance", params.clone()),
                CacheClass::Volatile,
            ),
            self.fetch(
                CallRequest::new("eth_getTransactionCount", params.clone()),
                CacheClass::Volatile,
            ),
            self.fetch(CallRequest::new("eth_getCode", params), CacheClass::Volatile),
        );

        // Balance is the primary value; nonce and code degrade to absent.
        let balance = balance?;
        let balance_wei = balance
            .value
            .as_str()
            .ok_or_else(|| GatewayError::protocol("eth_getBalance result is not a string"))
            .and_then(|s| hex_to_decimal(s, "balance"))?;

        let nonce = match nonce {
            Ok(o) => o.value.as_str().and_then(|s| hex_to_u64(s, "nonce").ok()),
            Err(e) => {
                tracing::warn!(error = %e, "nonce lookup failed; field omitted");
                None
            }
        };
        let is_contract = match code {
            Ok(o) => o.value.as_str().map(|c| c != "0x" && c != "0x0"),
            Err(e) => {
                tracing::warn!(error = %e, "code lookup failed; is_contract omitted");
                None
            }
        };

        to_json(&AccountInfo { address: checksum, balance_wei, nonce, is_contract })
    }

    async fn get_token_info(&self, args: &Json) -> Result<Json, GatewayError> {
        let token = require_address(args, "token_address")?;

        let (name, symbol, decimals, total) = tokio::join!(
            self.call_function(token, &erc20::ERC20_NAME, &[], BlockRef::Latest, CacheClass::Metadata),
            self.call_function(token, &erc20::ERC20_SYMBOL, &[], BlockRef::Latest, CacheClass::Metadata),
            self.call_function(token, &erc20::ERC20_DECIMALS, &[], BlockRef::Latest, CacheClass::Metadata),
            self.call_function(token, &erc20::ERC20_TOTAL_SUPPLY, &[], BlockRef::Latest, CacheClass::Metadata),
        );

        if name.is_err() && symbol.is_err() && decimals.is_err() && total.is_err() {
            // Nothing resolved; surface the first failure.
            return Err(name.expect_err("checked above"));
        }

        let name = first_output_str(name, "name");
        let symbol = first_output_str(symbol, "symbol");
        let decimals =
            first_output_str(decimals, "decimals").and_then(|s| s.parse::<u8>().ok());
        let total_supply = first_output_str(total, "totalSupply");
        let total_supply_formatted = match (&total_supply, decimals) {
            (Some(raw), Some(d)) => utils::format_units(raw, d),
            _ => None,
        };

        to_json(&TokenInfo {
            address: to_checksum(&token, None),
            name,
            symbol,
            decimals,
            total_supply,
            total_supply_formatted,
        })
    }

    async fn get_token_balance(&self, args: &Json) -> Result<Json, GatewayError> {
        let token = require_address(args, "token_address")?;
        let account = require_address(args, "account_address")?;

        let balance_args = [AbiValue::Address(account)];
        let (balance, decimals, symbol, name) = tokio::join!(
            self.call_function(
                token,
                &erc20::ERC20_BALANCE_OF,
                &balance_args,
                BlockRef::Latest,
                CacheClass::Volatile,
            ),
            self.call_function(token, &erc20::ERC20_DECIMALS, &[], BlockRef::Latest, CacheClass::Metadata),
            self.call_function(token, &erc20::ERC20_SYMBOL, &[], BlockRef::Latest, CacheClass::Metadata),
            self.call_function(token, &erc20::ERC20_NAME, &[], BlockRef::Latest, CacheClass::Metadata),
        );

        // The balance is the primary value and must succeed; metadata
        // fields degrade to absent rather than failing the request.
        let balance = balance?;
        let balance_raw = balance
            .value
            .as_array()
            .and_then(|a| a.first())
            .and_then(Json::as_str)
            .ok_or_else(|| GatewayError::protocol("balanceOf returned no value"))?
            .to_string();

        let token_decimals =
            first_output_str(decimals, "decimals").and_then(|s| s.parse::<u8>().ok());
        let balance_formatted =
            token_decimals.and_then(|d| utils::format_units(&balance_raw, d));

        to_json(&TokenBalanceInfo {
            token_address: to_checksum(&token, None),
            account_address: to_checksum(&account, None),
            token_name: first_output_str(name, "name"),
            token_symbol: first_output_str(symbol, "symbol"),
            token_decimals,
            balance: balance_raw,
            balance_formatted,
        })
    }

    async fn call_contract(&self, args: &Json) -> Result<Json, GatewayError> {
        let contract = require_address(args, "contract_address")?;
        let abi = args
            .get("abi")
            .ok_or_else(|| GatewayError::invalid_argument("missing 'abi' (JSON ABI array)"))?;
        let function = require_str(args, "function")?;
        let func = FunctionAbi::find_in_abi(abi, &function)?;

        let empty = Vec::new();
        let raw_args = match args.get("args") {
            Some(Json::Array(items)) => items,
            None => &empty,
            Some(_) => {
                return Err(GatewayError::invalid_argument("'args' must be an array"));
            }
        };
        if raw_args.len() != func.inputs.len() {
            return Err(GatewayError::invalid_argument(format!(
                "function '{}' expects {} argument(s), got {}",
                func.name,
                func.inputs.len(),
                raw_args.len()
            )));
        }
        let values = func
            .inputs
            .iter()
            .enumerate()
            .zip(raw_args)
            .map(|((i, p), raw)| {
                let label =
                    if p.name.is_empty() { format!("#{i}") } else { p.name.clone() };
                AbiValue::from_json(&p.kind, raw, &label)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let scope = match args.get("block") {
            Some(v) => parse_block_identifier(v)?,
            None => BlockRef::Latest,
        };
        let class = if scope.is_pinned() { CacheClass::Metadata } else { CacheClass::Volatile };
        let outcome = self.call_function(contract, &func, &values, scope, class).await?;

        let rendered = outcome.value.as_array().cloned().unwrap_or_default();
        let outputs: Vec<Json> = func
            .outputs
            .iter()
            .zip(&rendered)
            .map(|(p, v)| {
                json!({
                    "name": p.name,
                    "type": p.kind.to_string(),
                    "value": v,
                })
            })
            .collect();

        let mut result = json!({
            "contract": to_checksum(&contract, None),
            "function": func.signature(),
            "outputs": outputs,
        });
        // Optional enrichment from the external metadata collaborator.
        if let Some(doc) = self.metadata.lookup(contract, func.selector()) {
            result["label"] = json!(doc.label);
            if let Some(summary) = doc.summary {
                result["summary"] = json!(summary);
            }
        }
        Ok(result)
    }

    async fn get_events(&self, args: &Json) -> Result<Json, GatewayError> {
        let contract = require_address(args, "contract_address")?;
        let abi = args
            .get("abi")
            .ok_or_else(|| GatewayError::invalid_argument("missing 'abi' (JSON ABI array)"))?;
        let event_name = require_str(args, "event")?;
        let event = EventAbi::find_in_abi(abi, &event_name)?;

        let mut filter = json!({
            "address": to_checksum(&contract, None),
            "topics": [format!("{:?}", event.topic0())],
        });
        let mut scope = BlockRef::Latest;
        if let Some(v) = args.get("from_block") {
            filter["fromBlock"] = log_range_param(v, "from_block")?;
        }
        if let Some(v) = args.get("to_block") {
            let to_ref = parse_block_identifier(v)?;
            filter["toBlock"] = log_range_param(v, "to_block")?;
            // A bounded range addresses immutable history.
            if let BlockRef::Number(n) = to_ref {
                scope = BlockRef::Number(n);
            }
        }

        let class = if scope.is_pinned() { CacheClass::Metadata } else { CacheClass::Volatile };
        let outcome =
            self.fetch(CallRequest::new("eth_getLogs", vec![filter]).at(scope), class).await?;
        let logs = outcome
            .value
            .as_array()
            .ok_or_else(|| GatewayError::protocol("eth_getLogs result is not an array"))?;

        // Per-log decode problems are reported inline; one bad log does not
        // fail the page.
        let decoded: Vec<Json> = logs.iter().map(|log| decode_one_log(&event, log)).collect();

        Ok(json!({
            "contract": to_checksum(&contract, None),
            "event": event.signature(),
            "count": decoded.len(),
            "logs": decoded,
        }))
    }

    async fn estimate_gas(&self, args: &Json) -> Result<Json, GatewayError> {
        let to = require_address(args, "to")?;
        let mut call = json!({ "to": to_checksum(&to, None) });
        if args.get("from").is_some() {
            let from = require_address(args, "from")?;
            call["from"] = json!(to_checksum(&from, None));
        }
        if let Some(value) = utils::get_optional_arg::<String>(args, "value_wei") {
            let v = U256::from_dec_str(&value).map_err(|_| {
                GatewayError::invalid_argument("'value_wei' must be a decimal wei amount")
            })?;
            call["value"] = json!(format!("0x{v:x}"));
        }
        if let Some(data) = utils::get_optional_arg::<String>(args, "data") {
            hex::decode(data.trim_start_matches("0x")).map_err(|_| {
                GatewayError::invalid_argument("'data' must be a 0x-prefixed hex string")
            })?;
            call["data"] = json!(data);
        }

        // Estimates depend on transient state; bypass the cache entirely.
        let req = CallRequest::new("eth_estimateGas", vec![call]);
        let value = self.transport.execute(&req, self.deadline()).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| GatewayError::protocol("eth_estimateGas result is not a string"))?;
        Ok(json!({ "estimated_gas": hex_to_decimal(raw, "gas estimate")? }))
    }
}

// --- shared helpers ---

fn to_json<T: serde::Serialize>(value: &T) -> Result<Json, GatewayError> {
    serde_json::to_value(value)
        .map_err(|e| GatewayError::protocol(format!("failed to serialize result: {e}")))
}

fn require_str(args: &Json, key: &str) -> Result<String, GatewayError> {
    args.get(key)
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::invalid_argument(format!("missing required string '{key}'")))
}

fn require_address(args: &Json, key: &str) -> Result<Address, GatewayError> {
    let raw = require_str(args, key)?;
    Address::from_str(&raw).map_err(|_| {
        GatewayError::invalid_argument(format!("'{key}' is not a valid 0x-prefixed address"))
    })
}

/// Accepts a number, a decimal string, a hex quantity, a 32-byte hash, or
/// the tags latest/pending/earliest.
pub fn parse_block_identifier(v: &Json) -> Result<BlockRef, GatewayError> {
    if let Some(n) = v.as_u64() {
        return Ok(BlockRef::Number(n));
    }
    if let Some(s) = v.as_str() {
        return match s {
            "latest" => Ok(BlockRef::Latest),
            "pending" => Ok(BlockRef::Pending),
            "earliest" => Ok(BlockRef::Number(0)),
            _ if s.starts_with("0x") && s.len() == 66 => H256::from_str(s)
                .map(BlockRef::Hash)
                .map_err(|_| GatewayError::invalid_argument(format!("'{s}' is not a block hash"))),
            _ if s.starts_with("0x") => hex_to_u64(s, "block number")
                .map(BlockRef::Number)
                .map_err(|_| {
                    GatewayError::invalid_argument(format!("'{s}' is not a block number"))
                }),
            _ => s.parse::<u64>().map(BlockRef::Number).map_err(|_| {
                GatewayError::invalid_argument(format!("'{s}' is not a block identifier"))
            }),
        };
    }
    Err(GatewayError::invalid_argument(
        "block identifier must be a number, hash, or 'latest'/'pending'/'earliest'",
    ))
}

/// Log range bounds accept tags and numbers, but not hashes.
fn log_range_param(v: &Json, key: &str) -> Result<Json, GatewayError> {
    match parse_block_identifier(v)? {
        BlockRef::Hash(_) => Err(GatewayError::invalid_argument(format!(
            "'{key}' must be a block number or tag, not a hash"
        ))),
        other => Ok(other.as_param()),
    }
}

/// Pull the first decoded output out of a call result, logging the failure
/// that made it absent.
fn first_output_str(result: Result<CallOutcome, GatewayError>, field: &str) -> Option<String> {
    match result {
        Ok(outcome) => outcome
            .value
            .as_array()
            .and_then(|a| a.first())
            .and_then(Json::as_str)
            .map(str::to_string),
        Err(e) => {
            tracing::warn!(field, error = %e, "token metadata lookup failed; field omitted");
            None
        }
    }
}

fn decode_one_log(event: &EventAbi, log: &Json) -> Json {
    let meta = json!({
        "block_number": log.get("blockNumber").cloned().unwrap_or(Json::Null),
        "transaction_hash": log.get("transactionHash").cloned().unwrap_or(Json::Null),
        "log_index": log.get("logIndex").cloned().unwrap_or(Json::Null),
    });

    let topics: Result<Vec<H256>, GatewayError> = log
        .get("topics")
        .and_then(Json::as_array)
        .map(|items| {
            items
                .iter()
                .map(|t| {
                    t.as_str()
                        .and_then(|s| H256::from_str(s).ok())
                        .ok_or_else(|| GatewayError::decode(0, "log topic is not a 32-byte hash"))
                })
                .collect()
        })
        .unwrap_or_else(|| Err(GatewayError::decode(0, "log has no topics array")));

    let data = log
        .get("data")
        .and_then(Json::as_str)
        .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok());

    let decoded = topics.and_then(|topics| {
        let data = data.ok_or_else(|| GatewayError::decode(0, "log data is not hex"))?;
        abi::decode_log(event, &topics, &data)
    });

    match decoded {
        Ok(ev) => {
            let mut out = ev.to_json();
            out["meta"] = meta;
            out
        }
        Err(e) => json!({
            "decode_error": e.to_string(),
            "meta": meta,
            "raw": log,
        }),
    }
}
