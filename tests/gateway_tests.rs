//! End-to-end tests for the gateway dispatcher against mock upstream
//! nodes: request coalescing, cache validity, partial composite results,
//! throttling, and endpoint failover.

use std::time::Duration;

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

use evm_gateway_mcp::{
    build_gateway,
    config::{Config, EndpointSettings},
    gateway::ToolMethod,
    mcp::{
        handler::handle_mcp_request,
        protocol::{error_codes, Request},
    },
    rpc::error::ErrorKind,
    AppState,
};

const OWNER: &str = "0x1111111111111111111111111111111111111111";
const TOKEN: &str = "0x2222222222222222222222222222222222222222";

fn test_config(urls: &[String]) -> Config {
    let mut config = Config::default();
    config.endpoints = urls
        .iter()
        .map(|u| EndpointSettings {
            url: u.clone(),
            api_key: None,
            capacity: Some(1_000.0),
            refill_per_sec: Some(1_000.0),
        })
        .collect();
    config.retry_max_attempts = 2;
    config.retry_base_backoff = Duration::from_millis(10);
    config.retry_max_backoff = Duration::from_millis(20);
    config.attempt_timeout = Duration::from_secs(2);
    config.request_deadline = Duration::from_secs(5);
    config.cache_latest_ttl = Duration::from_secs(60);
    config
}

/// Register a mock responding to any request whose body matches `marker`
/// (a method name or a call-data selector), expecting exactly `hits` of
/// them.
async fn rpc_mock(server: &mut ServerGuard, marker: &str, result: Value, hits: usize) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::Regex(marker.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
        .expect(hits)
        .create_async()
        .await
}

fn word_hex(value: u64) -> String {
    format!("0x{value:064x}")
}

/// ABI-encoded string return data: offset word, length word, padded data.
fn abi_string_hex(s: &str) -> String {
    let mut out = String::from("0x");
    out.push_str(&format!("{:064x}", 32));
    out.push_str(&format!("{:064x}", s.len()));
    let mut data = hex::encode(s.as_bytes());
    while data.len() % 64 != 0 {
        data.push('0');
    }
    out.push_str(&data);
    out
}

fn sample_block(number: u64) -> Value {
    json!({
        "number": format!("0x{number:x}"),
        "hash": format!("0x{:064x}", number + 0xb10c),
        "parentHash": format!("0x{:064x}", number + 0xb10b),
        "timestamp": "0x64000000",
        "gasUsed": "0x5208",
        "gasLimit": "0x1c9c380",
        "miner": "0x3333333333333333333333333333333333333333",
        "transactions": []
    })
}

#[tokio::test]
async fn concurrent_account_requests_share_one_upstream_fetch() {
    let mut server = Server::new_async().await;
    let balance =
        rpc_mock(&mut server, "eth_getBalance", json!("0xde0b6b3a7640000"), 1).await;
    let nonce = rpc_mock(&mut server, "eth_getTransactionCount", json!("0x5"), 1).await;
    let code = rpc_mock(&mut server, "eth_getCode", json!("0x"), 1).await;

    let gateway = build_gateway(&test_config(&[server.url()])).unwrap();
    let args = json!({ "address": OWNER });

    let (a, b) = tokio::join!(
        gateway.handle(ToolMethod::GetAccount, &args),
        gateway.handle(ToolMethod::GetAccount, &args),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a["balance_wei"], "1000000000000000000");
    assert_eq!(a["nonce"], 5);
    assert_eq!(a["is_contract"], false);
    assert_eq!(a, b);

    balance.assert_async().await;
    nonce.assert_async().await;
    code.assert_async().await;
}

#[tokio::test]
async fn pinned_block_is_fetched_once() {
    let mut server = Server::new_async().await;
    let block = rpc_mock(&mut server, "eth_getBlockByNumber", sample_block(16), 1).await;

    let gateway = build_gateway(&test_config(&[server.url()])).unwrap();
    let args = json!({ "block_identifier": 16 });

    let first = gateway.handle(ToolMethod::GetBlock, &args).await.unwrap();
    let second = gateway.handle(ToolMethod::GetBlock, &args).await.unwrap();
    let third = gateway.handle(ToolMethod::GetBlock, &args).await.unwrap();

    assert_eq!(first["number"], 16);
    assert_eq!(first, second);
    assert_eq!(second, third);
    block.assert_async().await;
}

#[tokio::test]
async fn head_advance_triggers_refetch_of_latest_scoped_data() {
    let mut server = Server::new_async().await;
    let balance = rpc_mock(&mut server, "eth_getBalance", json!("0x64"), 2).await;
    let nonce = rpc_mock(&mut server, "eth_getTransactionCount", json!("0x1"), 2).await;
    let code = rpc_mock(&mut server, "eth_getCode", json!("0x"), 2).await;

    let gateway = build_gateway(&test_config(&[server.url()])).unwrap();
    let args = json!({ "address": OWNER });

    gateway.cache().note_head(100);
    gateway.handle(ToolMethod::GetAccount, &args).await.unwrap();

    // Same head: served from cache, no new upstream calls.
    gateway.handle(ToolMethod::GetAccount, &args).await.unwrap();

    // Head moved past the staleness margin: everything refetches.
    gateway.cache().note_head(101);
    gateway.handle(ToolMethod::GetAccount, &args).await.unwrap();

    balance.assert_async().await;
    nonce.assert_async().await;
    code.assert_async().await;
}

#[tokio::test]
async fn token_balance_survives_failing_metadata_calls() {
    let mut server = Server::new_async().await;
    // Selector routing: balanceOf, symbol, and name succeed; decimals
    // keeps failing with a server error until the retry budget is spent.
    let balance = rpc_mock(&mut server, "70a08231", json!(word_hex(1_000_000)), 1).await;
    let symbol = rpc_mock(&mut server, "95d89b41", json!(abi_string_hex("TKN")), 1).await;
    let name = rpc_mock(&mut server, "06fdde03", json!(abi_string_hex("Token")), 1).await;
    let decimals = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("313ce567".to_string()))
        .with_status(500)
        .expect_at_least(1)
        .create_async()
        .await;

    let gateway = build_gateway(&test_config(&[server.url()])).unwrap();
    let args = json!({ "token_address": TOKEN, "account_address": OWNER });
    let result = gateway.handle(ToolMethod::GetTokenBalance, &args).await.unwrap();

    // Primary value present, metadata partially absent: still a success.
    assert_eq!(result["balance"], "1000000");
    assert_eq!(result["token_symbol"], "TKN");
    assert_eq!(result["token_name"], "Token");
    assert!(result.get("token_decimals").is_none());
    assert!(result.get("balance_formatted").is_none());

    balance.assert_async().await;
    symbol.assert_async().await;
    name.assert_async().await;
    decimals.assert_async().await;
}

#[tokio::test]
async fn exhausted_rate_budget_surfaces_throttled_then_recovers() {
    let mut server = Server::new_async().await;
    let estimate = rpc_mock(&mut server, "eth_estimateGas", json!("0x5208"), 2).await;

    let mut config = test_config(&[server.url()]);
    config.endpoints[0].capacity = Some(1.0);
    config.endpoints[0].refill_per_sec = Some(5.0);
    config.request_deadline = Duration::from_millis(50);
    let gateway = build_gateway(&config).unwrap();
    let args = json!({ "to": TOKEN });

    gateway.handle(ToolMethod::EstimateGas, &args).await.unwrap();

    // Bucket is empty and one token takes 200ms to refill, past the 50ms
    // deadline: the second call must be rejected as throttled.
    let err = gateway.handle(ToolMethod::EstimateGas, &args).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Throttled);
    assert!(err.retryable());

    // After a full refill interval admission succeeds again.
    tokio::time::sleep(Duration::from_millis(300)).await;
    gateway.handle(ToolMethod::EstimateGas, &args).await.unwrap();

    estimate.assert_async().await;
}

#[tokio::test]
async fn failing_endpoint_rotates_to_healthy_alternate() {
    let mut bad_server = Server::new_async().await;
    let bad = bad_server
        .mock("POST", "/")
        .match_body(Matcher::Regex("eth_estimateGas".to_string()))
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let mut good_server = Server::new_async().await;
    let good = rpc_mock(&mut good_server, "eth_estimateGas", json!("0x5208"), 1).await;

    let mut config = test_config(&[bad_server.url(), good_server.url()]);
    // A fuller budget makes the failing endpoint the first choice.
    config.endpoints[0].capacity = Some(2_000.0);
    config.endpoints[1].capacity = Some(1_000.0);
    let gateway = build_gateway(&config).unwrap();

    let args = json!({ "to": TOKEN });
    let result = gateway.handle(ToolMethod::EstimateGas, &args).await.unwrap();
    assert_eq!(result["estimated_gas"], "21000");

    bad.assert_async().await;
    good.assert_async().await;
}

#[tokio::test]
async fn call_contract_round_trips_a_full_width_uint() {
    let mut server = Server::new_async().await;
    let call = rpc_mock(
        &mut server,
        "eth_call",
        json!(format!("0x{}", "ff".repeat(32))),
        1,
    )
    .await;

    let gateway = build_gateway(&test_config(&[server.url()])).unwrap();
    let args = json!({
        "contract_address": TOKEN,
        "abi": [{
            "type": "function",
            "name": "maxValue",
            "stateMutability": "view",
            "inputs": [],
            "outputs": [{ "name": "value", "type": "uint256" }]
        }],
        "function": "maxValue",
    });

    let result = gateway.handle(ToolMethod::CallContract, &args).await.unwrap();
    assert_eq!(result["function"], "maxValue()");
    assert_eq!(
        result["outputs"][0]["value"],
        "115792089237316195423570985008687907853269984665640564039457584007913129639935"
    );
    call.assert_async().await;
}

#[tokio::test]
async fn malformed_call_arguments_are_rejected_without_upstream_traffic() {
    let mut server = Server::new_async().await;
    let never = server.mock("POST", "/").expect(0).create_async().await;

    let gateway = build_gateway(&test_config(&[server.url()])).unwrap();

    // Bad address.
    let err = gateway
        .handle(ToolMethod::GetAccount, &json!({ "address": "zebra" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // Argument count mismatch against the supplied ABI.
    let err = gateway
        .handle(
            ToolMethod::CallContract,
            &json!({
                "contract_address": TOKEN,
                "abi": [{
                    "type": "function",
                    "name": "balanceOf",
                    "stateMutability": "view",
                    "inputs": [{ "name": "owner", "type": "address" }],
                    "outputs": [{ "name": "", "type": "uint256" }]
                }],
                "function": "balanceOf",
                "args": [],
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("balanceOf"));

    never.assert_async().await;
}

#[tokio::test]
async fn decoded_events_mark_hashed_dynamic_topics() {
    let transfer_topic0 = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
    let from_topic = format!("0x{:0>64}", &OWNER[2..]);
    let to_topic = format!("0x{:0>64}", &TOKEN[2..]);

    let mut server = Server::new_async().await;
    let logs = rpc_mock(
        &mut server,
        "eth_getLogs",
        json!([{
            "address": TOKEN,
            "topics": [transfer_topic0, from_topic, to_topic],
            "data": word_hex(42),
            "blockNumber": "0x10",
            "transactionHash": format!("0x{:064x}", 1),
            "logIndex": "0x0"
        }]),
        1,
    )
    .await;

    let gateway = build_gateway(&test_config(&[server.url()])).unwrap();
    let args = json!({
        "contract_address": TOKEN,
        "abi": [{
            "type": "event",
            "name": "Transfer",
            "inputs": [
                { "name": "from", "type": "address", "indexed": true },
                { "name": "to", "type": "address", "indexed": true },
                { "name": "value", "type": "uint256", "indexed": false }
            ]
        }],
        "event": "Transfer",
        "from_block": 1,
        "to_block": 16,
    });

    let result = gateway.handle(ToolMethod::GetEvents, &args).await.unwrap();
    assert_eq!(result["count"], 1);
    let log = &result["logs"][0];
    assert_eq!(log["event"], "Transfer");
    assert_eq!(log["params"][2]["value"], "42");
    assert_eq!(log["params"][0]["hashed"], false);
    assert_eq!(log["meta"]["block_number"], "0x10");
    logs.assert_async().await;
}

#[tokio::test]
async fn mcp_surface_lists_tools_and_rejects_unknown_ones() {
    let config = test_config(&["http://localhost:1/".to_string()]);
    let gateway = build_gateway(&config).unwrap();
    let state = AppState { config, gateway };

    let list = handle_mcp_request(
        Request {
            jsonrpc: "2.0".into(),
            id: json!(1),
            method: "tools/list".into(),
            params: None,
        },
        state.clone(),
    )
    .await
    .unwrap();
    let tools = list.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, 10);

    let unknown = handle_mcp_request(
        Request {
            jsonrpc: "2.0".into(),
            id: json!(2),
            method: "tools/call".into(),
            params: Some(json!({ "name": "transfer_funds", "arguments": {} })),
        },
        state,
    )
    .await
    .unwrap();
    assert_eq!(unknown.error.unwrap().code, error_codes::INVALID_PARAMS);
}
