//! Pocket Client Module
//!
//! This module provides a client for communicating with a Pocket (POKT)
//! node over its REST RPC. It covers the four operations the pipeline
//! consumes: reading the chain height, listing transfers received by the
//! vault address, fetching a transaction by hash, and broadcasting a raw
//! signed transaction.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PocketConfig;

/// Message type of a plain token transfer on the Pocket network.
const MSG_TYPE_SEND: &str = "pos/Send";

/// Page size used when walking an account's received transactions.
const TXS_PER_PAGE: u64 = 100;

// ============================================================================
// RPC RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct HeightResponse {
    height: u64,
}

/// One page of an account's transactions.
#[derive(Debug, Clone, Deserialize)]
struct AccountTxsResponse {
    #[serde(default)]
    txs: Vec<TxResponse>,
    #[serde(default)]
    total_txs: u64,
}

/// A transaction as returned by `/v1/query/tx` and `/v1/query/accounttxs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResponse {
    pub hash: String,
    pub height: u64,
    #[serde(rename = "tx_result", default)]
    pub tx_result: TxResult,
    #[serde(rename = "stdTx", default)]
    pub std_tx: StdTx,
}

/// Execution result of an included transaction; `code` zero means success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdTx {
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub msg: Msg,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Msg {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub value: MsgValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MsgValue {
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub to_address: String,
    #[serde(default)]
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTxResponse {
    #[serde(rename = "txhash")]
    transaction_hash: String,
    #[serde(default)]
    raw_log: String,
    #[serde(default)]
    code: i64,
}

// ============================================================================
// POCKET CLIENT IMPLEMENTATION
// ============================================================================

/// Client for a Pocket node's REST RPC.
#[derive(Debug, Clone)]
pub struct PocketClient {
    client: Client,
    base_url: String,
}

impl PocketClient {
    /// Creates a new client for the configured node URL with the
    /// configured request timeout.
    pub fn new(config: &PocketConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .context("failed to create HTTP client")?;
        Ok(PocketClient {
            client,
            base_url: config.rpc_url.trim_end_matches('/').to_string(),
        })
    }

    /// Reads the current chain height.
    pub async fn get_height(&self) -> Result<u64> {
        let response: HeightResponse = self
            .post("/v1/query/height", &serde_json::json!({}))
            .await?;
        Ok(response.height)
    }

    /// Lists successful transfer transactions received by `address` with
    /// height in the open interval `(from_height, to_height]`.
    ///
    /// The node returns transactions newest-first, so pagination stops as
    /// soon as a page reaches below the window.
    pub async fn get_account_transfer_txs(
        &self,
        address: &str,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<TxResponse>> {
        let mut transfers = Vec::new();
        let mut page: u64 = 1;
        loop {
            let body = serde_json::json!({
                "address": address,
                "page": page,
                "per_page": TXS_PER_PAGE,
                "received": true,
                "prove": false,
                "order": "desc",
            });
            let response: AccountTxsResponse = self.post("/v1/query/accounttxs", &body).await?;
            if response.txs.is_empty() {
                break;
            }
            let mut below_window = false;
            for tx in &response.txs {
                if tx.height <= from_height {
                    below_window = true;
                    continue;
                }
                if tx.height > to_height {
                    continue;
                }
                if tx.tx_result.code != 0 {
                    continue;
                }
                if tx.std_tx.msg.msg_type != MSG_TYPE_SEND {
                    continue;
                }
                if !tx.std_tx.msg.value.to_address.eq_ignore_ascii_case(address) {
                    continue;
                }
                transfers.push(tx.clone());
            }
            if below_window || page * TXS_PER_PAGE >= response.total_txs {
                break;
            }
            page += 1;
        }
        Ok(transfers)
    }

    /// Fetches a transaction by hash. Returns `Ok(None)` when the node
    /// does not know the transaction yet.
    pub async fn get_tx(&self, hash: &str) -> Result<Option<TxResponse>> {
        let body = serde_json::json!({ "hash": hash, "prove": false });
        let url = format!("{}/v1/query/tx", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to query tx from {}", url))?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let tx: TxResponse = response
            .json()
            .await
            .with_context(|| format!("failed to parse tx response from {}", url))?;
        Ok(Some(tx))
    }

    /// Broadcasts a raw signed transaction and returns its hash.
    ///
    /// The node deduplicates by transaction hash, so re-broadcasting an
    /// already submitted transaction is harmless.
    pub async fn submit_raw_tx(&self, signer_address: &str, raw_hex: &str) -> Result<String> {
        let body = serde_json::json!({
            "address": signer_address,
            "raw_hex_bytes": raw_hex,
        });
        let response: RawTxResponse = self.post("/v1/client/rawtx", &body).await?;
        if response.code != 0 {
            return Err(anyhow!(
                "raw tx rejected with code {}: {}",
                response.code,
                response.raw_log
            ));
        }
        Ok(response.transaction_hash)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to send request to {}", url))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("request to {} failed ({}): {}", url, status, text));
        }
        response
            .json()
            .await
            .with_context(|| format!("failed to parse response from {}", url))
    }
}
