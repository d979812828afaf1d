//! # MCP Handler Module
//!
//! Implements the Model Context Protocol surface of the gateway. Incoming
//! requests are parsed here and dispatched to the gateway's closed tool
//! set.
//!
//! ## Supported Tools
//!
//! - `get_network_status` - Chain head, gas price, endpoint health
//! - `get_block` - Block by number, hash, or tag
//! - `get_latest_blocks` - The most recent N blocks
//! - `get_transaction` - Transaction with receipt status
//! - `get_account` - Balance, nonce, and contract flag
//! - `get_token_info` - ERC-20 metadata
//! - `get_token_balance` - ERC-20 balance with metadata
//! - `call_contract` - Read-only contract call via a supplied ABI
//! - `get_events` - Decoded event logs
//! - `estimate_gas` - Gas estimation for a prospective call

use serde_json::{json, Value};
use tracing::info;

use crate::gateway::ToolMethod;
use crate::mcp::protocol::{error_codes, Request, Response};
use crate::rpc::error::{ErrorKind, GatewayError};
use crate::{utils, AppState};

/// This is the main dispatcher for all incoming MCP requests.
pub async fn handle_mcp_request(req: Request, state: AppState) -> Option<Response> {
    info!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "tools/list" => handle_tools_list(&req),
        "tools/call" => handle_tool_call(req, state).await,
        // Convenience aliases to support direct method calls from CLI
        // clients; rewritten into tools/call to reuse the same logic.
        name if ToolMethod::from_name(name).is_ok() => {
            let wrapped = Request {
                jsonrpc: req.jsonrpc.clone(),
                id: req.id.clone(),
                method: "tools/call".to_string(),
                params: Some(json!({
                    "name": name,
                    "arguments": req.params.clone().unwrap_or_else(|| json!({}))
                })),
            };
            handle_tool_call(wrapped, state).await
        }
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

fn handle_initialize(req: &Request) -> Response {
    Response::success(
        req.id.clone(),
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "evm-gateway-mcp",
                "version": env!("CARGO_PKG_VERSION"),
            }
        }),
    )
}

/// Handles a 'tools/call' request by dispatching it to the gateway.
async fn handle_tool_call(req: Request, state: AppState) -> Response {
    let params = match req.params.as_ref() {
        Some(p) => p,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'params' object".into(),
            )
        }
    };

    let tool_name = match utils::get_required_arg::<String>(params, "name", &req.id) {
        Ok(name) => name,
        Err(err_resp) => return err_resp,
    };

    let method = match ToolMethod::from_name(&tool_name) {
        Ok(m) => m,
        Err(e) => {
            return Response::error(req.id, error_codes::INVALID_PARAMS, e.to_string());
        }
    };

    let empty_args = json!({});
    let args = params.get("arguments").unwrap_or(&empty_args);

    match state.gateway.handle(method, args).await {
        Ok(payload) => {
            let summary = summarize(method, &payload);
            Response::tool_result(req.id, summary, payload)
        }
        Err(e) => error_response(req.id, &e),
    }
}

/// Map a gateway failure onto the wire: argument problems are the caller's
/// fault, everything else is a server error carrying the kind and
/// retryability so callers can tell "try again later" from "this request
/// is wrong".
fn error_response(id: Value, err: &GatewayError) -> Response {
    let code = match err.kind() {
        ErrorKind::InvalidArgument => error_codes::INVALID_PARAMS,
        _ => error_codes::SERVER_ERROR,
    };
    Response::error_with_data(
        id,
        code,
        err.to_string(),
        json!({ "kind": err.kind().as_str(), "retryable": err.retryable() }),
    )
}

/// One-line human-readable summary per tool for text-only MCP clients.
fn summarize(method: ToolMethod, payload: &Value) -> String {
    // Render strings bare rather than as quoted JSON.
    let field = |key: &str| match payload.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    };
    match method {
        ToolMethod::GetNetworkStatus => {
            format!("Chain {} at block {}", field("chain_id"), field("latest_block"))
        }
        ToolMethod::GetBlock => format!(
            "Block {} with {} transaction(s)",
            field("number"),
            field("transaction_count")
        ),
        ToolMethod::GetLatestBlocks => {
            format!("{} block(s) up to height {}", field("count"), field("latest_height"))
        }
        ToolMethod::GetTransaction => format!("Transaction {}", field("hash")),
        ToolMethod::GetAccount => {
            format!("Account {} holds {} wei", field("address"), field("balance_wei"))
        }
        ToolMethod::GetTokenInfo => format!(
            "Token {} ({})",
            field("address"),
            payload.get("symbol").and_then(Value::as_str).unwrap_or("symbol unknown")
        ),
        ToolMethod::GetTokenBalance => format!(
            "Token balance {} (raw {})",
            payload
                .get("balance_formatted")
                .and_then(Value::as_str)
                .unwrap_or("unformatted"),
            field("balance")
        ),
        ToolMethod::CallContract => format!("Called {}", field("function")),
        ToolMethod::GetEvents => {
            format!("{} log(s) for {}", field("count"), field("event"))
        }
        ToolMethod::EstimateGas => format!("Estimated {} gas", field("estimated_gas")),
    }
}

fn handle_tools_list(req: &Request) -> Response {
    Response::success(req.id.clone(), json!({ "tools": tool_schemas() }))
}

fn tool_schemas() -> Value {
    json!([
        {
            "name": "get_network_status",
            "description": "Retrieve the current status of the configured network: latest block height, gas price, client version, and the health of each upstream endpoint.",
            "inputSchema": { "type": "object", "properties": {}, "required": [] }
        },
        {
            "name": "get_block",
            "description": "Fetch detailed information about a specific block using its number, hash, or the keyword 'latest'. Optionally include full transaction details.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "block_identifier": {
                        "type": ["string", "integer"],
                        "description": "Block number, 32-byte block hash, or 'latest'."
                    },
                    "include_transactions": {
                        "type": "boolean",
                        "description": "Whether to include full transaction objects instead of hashes.",
                        "default": false
                    }
                },
                "required": ["block_identifier"]
            }
        },
        {
            "name": "get_latest_blocks",
            "description": "Get information about the most recent blocks on the chain.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "description": "Number of latest blocks to retrieve (default 10, maximum 100).",
                        "default": 10,
                        "minimum": 1,
                        "maximum": 100
                    }
                },
                "required": []
            }
        },
        {
            "name": "get_transaction",
            "description": "Obtain detailed information about a transaction by hash, including its receipt status when available.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tx_hash": { "type": "string", "description": "The transaction hash." }
                },
                "required": ["tx_hash"]
            }
        },
        {
            "name": "get_account",
            "description": "Retrieve account details: balance in wei, nonce, and whether the address holds contract code.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "address": { "type": "string", "description": "The account address." }
                },
                "required": ["address"]
            }
        },
        {
            "name": "get_token_info",
            "description": "Get ERC-20 token metadata: name, symbol, decimals, and total supply. Fields the contract does not expose are omitted.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "token_address": { "type": "string", "description": "The token contract address." }
                },
                "required": ["token_address"]
            }
        },
        {
            "name": "get_token_balance",
            "description": "Get an account's ERC-20 token balance, with the token's metadata when available.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "token_address": { "type": "string", "description": "The token contract address." },
                    "account_address": { "type": "string", "description": "The account to query." }
                },
                "required": ["token_address", "account_address"]
            }
        },
        {
            "name": "call_contract",
            "description": "Execute a read-only contract call. Arguments are encoded and the return data decoded using the supplied JSON ABI.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "contract_address": { "type": "string", "description": "The contract address." },
                    "abi": { "type": "array", "description": "The contract's JSON ABI (or the relevant fragment)." },
                    "function": { "type": "string", "description": "Name of the function to call." },
                    "args": { "type": "array", "description": "Positional arguments for the function.", "default": [] },
                    "block": {
                        "type": ["string", "integer"],
                        "description": "Optional block number, hash, or tag to execute against (default 'latest')."
                    }
                },
                "required": ["contract_address", "abi", "function"]
            }
        },
        {
            "name": "get_events",
            "description": "Fetch and decode a contract's event logs. Indexed dynamic values are reported as their topic hash, marked 'hashed'.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "contract_address": { "type": "string", "description": "The contract address." },
                    "abi": { "type": "array", "description": "The contract's JSON ABI (or the relevant fragment)." },
                    "event": { "type": "string", "description": "Name of the event to decode." },
                    "from_block": { "type": ["string", "integer"], "description": "Start of the block range." },
                    "to_block": { "type": ["string", "integer"], "description": "End of the block range." }
                },
                "required": ["contract_address", "abi", "event"]
            }
        },
        {
            "name": "estimate_gas",
            "description": "Estimate the gas required for a prospective call or transfer.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "to": { "type": "string", "description": "The target address." },
                    "from": { "type": "string", "description": "Optional sender address." },
                    "value_wei": { "type": "string", "description": "Optional value to send, in wei (decimal)." },
                    "data": { "type": "string", "description": "Optional call data as 0x-prefixed hex." }
                },
                "required": ["to"]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_cover_every_tool() {
        let schemas = tool_schemas();
        let names: Vec<&str> = schemas
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        for method in ToolMethod::ALL {
            assert!(names.contains(&method.name()), "missing schema for {}", method.name());
        }
        assert_eq!(names.len(), ToolMethod::ALL.len());
    }

    #[test]
    fn error_responses_carry_kind_and_retryability() {
        let resp = error_response(json!(7), &GatewayError::Throttled("budget".into()));
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::SERVER_ERROR);
        let data = err.data.unwrap();
        assert_eq!(data["kind"], "throttled");
        assert_eq!(data["retryable"], true);

        let resp = error_response(json!(7), &GatewayError::invalid_argument("bad address"));
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }
}
