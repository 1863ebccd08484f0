//! Unit tests for the Pocket client.

mod common;

use common::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wpokt_validator::pocket_client::PocketClient;

fn test_client(url: &str) -> PocketClient {
    let config = build_test_config(url, "http://localhost:1").pocket;
    PocketClient::new(&config).expect("client")
}

/// Test that the chain height is read from the query endpoint.
#[tokio::test]
async fn test_get_height() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/query/height"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "height": 12345 })))
        .mount(&server)
        .await;
    let client = test_client(&server.uri());
    assert_eq!(client.get_height().await.unwrap(), 12345);
}

/// Test that the transfer scan keeps only successful sends to the vault
/// inside the open height window.
#[tokio::test]
async fn test_get_account_transfer_txs_filters() {
    let server = MockServer::start().await;
    let vault = DUMMY_VAULT_ADDRESS;

    let in_window = build_transfer_tx("0xaaa", 12, "100", "{}", vault);
    let at_window_start = build_transfer_tx("0xbbb", 10, "100", "{}", vault);
    let above_window = build_transfer_tx("0xccc", 13, "100", "{}", vault);
    let mut failed = build_transfer_tx("0xddd", 12, "100", "{}", vault);
    failed.tx_result.code = 1;
    let mut wrong_type = build_transfer_tx("0xeee", 12, "100", "{}", vault);
    wrong_type.std_tx.msg.msg_type = "pos/Stake".to_string();
    let other_recipient = build_transfer_tx("0xfff", 12, "100", "{}", "feedfacefeedfacefeedfacefeedfacefeedface");

    let txs = vec![
        &above_window,
        &in_window,
        &failed,
        &wrong_type,
        &other_recipient,
        &at_window_start,
    ];
    Mock::given(method("POST"))
        .and(path("/v1/query/accounttxs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "txs": txs, "total_txs": txs.len() })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let transfers = client
        .get_account_transfer_txs(vault, 10, 12)
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].hash, "0xaaa");
}

/// Test that broadcasting returns the node's transaction hash.
#[tokio::test]
async fn test_submit_raw_tx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/rawtx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "txhash": "CAFEBABE",
            "raw_log": "",
            "code": 0,
        })))
        .mount(&server)
        .await;
    let client = test_client(&server.uri());
    let hash = client
        .submit_raw_tx(DUMMY_VAULT_ADDRESS, "deadbeef")
        .await
        .unwrap();
    assert_eq!(hash, "CAFEBABE");
}

/// Test that a rejected broadcast surfaces the node's log.
#[tokio::test]
async fn test_submit_raw_tx_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/rawtx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "txhash": "",
            "raw_log": "insufficient funds",
            "code": 5,
        })))
        .mount(&server)
        .await;
    let client = test_client(&server.uri());
    let err = client
        .submit_raw_tx(DUMMY_VAULT_ADDRESS, "deadbeef")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("insufficient funds"));
}

/// Test that an unknown transaction reads as absent, not as an error.
#[tokio::test]
async fn test_get_tx_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/query/tx"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "tx not found" })),
        )
        .mount(&server)
        .await;
    let client = test_client(&server.uri());
    assert!(client.get_tx("0xmissing").await.unwrap().is_none());
}

/// Test that an included transaction is returned with its height.
#[tokio::test]
async fn test_get_tx_found() {
    let server = MockServer::start().await;
    let tx = build_transfer_tx("0xaaa", 77, "100", "{}", DUMMY_VAULT_ADDRESS);
    Mock::given(method("POST"))
        .and(path("/v1/query/tx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&tx))
        .mount(&server)
        .await;
    let client = test_client(&server.uri());
    let found = client.get_tx("0xaaa").await.unwrap().expect("tx");
    assert_eq!(found.height, 77);
}
