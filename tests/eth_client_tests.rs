//! Unit tests for the Ethereum client and event decoding.

mod common;

use common::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wpokt_validator::eth_client::{
    decode_burn_and_bridge_event, decode_minted_event, EthClient, EvmLog,
};

fn test_client(url: &str) -> EthClient {
    let config = build_test_config("http://localhost:1", url).ethereum;
    EthClient::new(&config).expect("client")
}

async fn mock_rpc(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result })),
        )
        .mount(server)
        .await;
}

/// Test that block numbers come back parsed from hex.
#[tokio::test]
async fn test_get_block_number() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", json!("0x10d4f")).await;
    let client = test_client(&server.uri());
    assert_eq!(client.get_block_number().await.unwrap(), 68943);
}

/// Test that the chain id is rendered as a decimal string.
#[tokio::test]
async fn test_get_chain_id() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_chainId", json!("0x1")).await;
    let client = test_client(&server.uri());
    assert_eq!(client.get_chain_id().await.unwrap(), "1");
}

/// Test that a JSON-RPC error is surfaced as an error, not an empty
/// result.
#[tokio::test]
async fn test_rpc_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "header not found" },
        })))
        .mount(&server)
        .await;
    let client = test_client(&server.uri());
    let err = client.get_block_number().await.unwrap_err();
    assert!(err.to_string().contains("header not found"));
}

/// Test that logs are fetched and decodable end to end.
#[tokio::test]
async fn test_get_logs_returns_decodable_events() {
    let server = MockServer::start().await;
    let log = build_burn_log(
        "64",
        DUMMY_ETH_SENDER,
        "0000000000000000000000000000001234567890",
        50,
        3,
        DUMMY_ETH_TX_HASH,
    );
    mock_rpc(&server, "eth_getLogs", serde_json::to_value(vec![&log]).unwrap()).await;
    let client = test_client(&server.uri());
    let logs = client
        .get_logs(
            DUMMY_WPOKT_ADDRESS,
            &wpokt_validator::eth_client::burn_and_bridge_topic(),
            1,
            100,
        )
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    let event = decode_burn_and_bridge_event(&logs[0]).unwrap();
    assert_eq!(event.amount, "100");
    assert_eq!(event.log_index, 3);
}

/// Test that the per-recipient nonce counter is read through eth_call.
#[tokio::test]
async fn test_get_user_nonce() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_call", json!(format!("0x{:0>64}", "5"))).await;
    let client = test_client(&server.uri());
    let nonce = client
        .get_user_nonce(DUMMY_MINT_CONTROLLER_ADDRESS, DUMMY_RECIPIENT_ADDRESS)
        .await
        .unwrap();
    assert_eq!(nonce, "5");
}

/// Test decoding of a `Minted` log, including the indexed recipient.
#[test]
fn test_decode_minted_event() {
    let log = build_minted_log(DUMMY_RECIPIENT_ADDRESS, "64", "0", 42, DUMMY_ETH_TX_HASH);
    let event = decode_minted_event(&log).unwrap();
    assert_eq!(event.recipient, DUMMY_RECIPIENT_ADDRESS);
    assert_eq!(event.amount, "100");
    assert_eq!(event.nonce, "0");
    assert_eq!(event.block_number, 42);
    assert_eq!(event.transaction_hash, DUMMY_ETH_TX_HASH);
}

/// Test decoding of a `BurnAndBridge` log, with the payout address
/// rendered lowercase without a prefix.
#[test]
fn test_decode_burn_and_bridge_event() {
    let log = build_burn_log(
        "64",
        "0x0000000000000000000000000000000000ABCDEF",
        "00000000000000000000000000000012345678AB",
        50,
        3,
        DUMMY_ETH_TX_HASH,
    );
    let event = decode_burn_and_bridge_event(&log).unwrap();
    assert_eq!(event.amount, "100");
    assert_eq!(event.from, "0x0000000000000000000000000000000000abcdef");
    assert_eq!(event.pokt_address, "00000000000000000000000000000012345678ab");
    assert_eq!(event.block_number, 50);
    assert_eq!(event.log_index, 3);
}

/// Test that truncated logs are rejected instead of mis-decoded.
#[test]
fn test_decode_rejects_malformed_logs() {
    let mut minted = build_minted_log(DUMMY_RECIPIENT_ADDRESS, "64", "0", 42, DUMMY_ETH_TX_HASH);
    minted.data = "0x00".to_string();
    assert!(decode_minted_event(&minted).is_err());

    let burn = EvmLog {
        address: DUMMY_WPOKT_ADDRESS.to_string(),
        topics: vec![wpokt_validator::eth_client::burn_and_bridge_topic()],
        data: "0x".to_string(),
        block_number: "0x1".to_string(),
        transaction_hash: DUMMY_ETH_TX_HASH.to_string(),
        log_index: "0x0".to_string(),
    };
    assert!(decode_burn_and_bridge_event(&burn).is_err());
}
