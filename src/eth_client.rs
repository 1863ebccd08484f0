//! Ethereum Client Module
//!
//! This module provides a client for communicating with an Ethereum node
//! via its JSON-RPC API, plus decoding of the two wrapped
//! token events the pipeline consumes: `Minted` and `BurnAndBridge`.
//!
//! Log queries over wide block spans are split into chunks of
//! [`MAX_QUERY_BLOCKS`] blocks, since nodes cap the range a single
//! `eth_getLogs` call may cover.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::time::Duration;

use crate::config::EthereumConfig;
use crate::util::{parse_hex_u64, strip_hex_prefix, word_to_decimal};

/// Widest block span a single log query may cover.
pub const MAX_QUERY_BLOCKS: u64 = 100_000;

// ============================================================================
// JSON-RPC TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Raw event log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmLog {
    /// Address of the contract that emitted the event
    pub address: String,
    /// Indexed event parameters; `topics[0]` is the event signature
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed parameters
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
}

// ============================================================================
// DECODED EVENTS
// ============================================================================

/// `Minted(address indexed recipient, uint256 amount, uint256 nonce)`
#[derive(Debug, Clone, PartialEq)]
pub struct MintedEvent {
    pub recipient: String,
    pub amount: String,
    pub nonce: String,
    pub block_number: u64,
    pub transaction_hash: String,
}

/// `BurnAndBridge(uint256 indexed amount, address indexed from,
/// address indexed poktAddress)`
#[derive(Debug, Clone, PartialEq)]
pub struct BurnAndBridgeEvent {
    pub amount: String,
    pub from: String,
    /// Payout address on Pocket, rendered lowercase hex without `0x`
    pub pokt_address: String,
    pub contract_address: String,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: String,
}

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Topic hash of an event signature string such as
/// `"Minted(address,uint256,uint256)"`.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

pub fn minted_topic() -> String {
    event_topic("Minted(address,uint256,uint256)")
}

pub fn burn_and_bridge_topic() -> String {
    event_topic("BurnAndBridge(uint256,address,address)")
}

/// Extracts the 20-byte address packed into a 32-byte topic.
fn topic_to_address(topic: &str) -> Result<String> {
    let topic = strip_hex_prefix(topic);
    if topic.len() != 64 {
        return Err(anyhow!("invalid address topic length: {}", topic.len()));
    }
    Ok(format!("0x{}", topic[24..].to_lowercase()))
}

/// Decodes a `Minted` log.
pub fn decode_minted_event(log: &EvmLog) -> Result<MintedEvent> {
    if log.topics.len() < 2 {
        return Err(anyhow!("Minted log has {} topics", log.topics.len()));
    }
    let data = strip_hex_prefix(&log.data);
    if data.len() < 128 {
        return Err(anyhow!("Minted log data too short: {}", data.len()));
    }
    Ok(MintedEvent {
        recipient: topic_to_address(&log.topics[1])?,
        amount: word_to_decimal(&data[0..64])?,
        nonce: word_to_decimal(&data[64..128])?,
        block_number: parse_hex_u64(&log.block_number)?,
        transaction_hash: log.transaction_hash.to_lowercase(),
    })
}

/// Decodes a `BurnAndBridge` log.
pub fn decode_burn_and_bridge_event(log: &EvmLog) -> Result<BurnAndBridgeEvent> {
    if log.topics.len() < 4 {
        return Err(anyhow!("BurnAndBridge log has {} topics", log.topics.len()));
    }
    let pokt_address = topic_to_address(&log.topics[3])?;
    Ok(BurnAndBridgeEvent {
        amount: word_to_decimal(&log.topics[1])?,
        from: topic_to_address(&log.topics[2])?,
        pokt_address: strip_hex_prefix(&pokt_address).to_string(),
        contract_address: log.address.to_lowercase(),
        block_number: parse_hex_u64(&log.block_number)?,
        log_index: parse_hex_u64(&log.log_index)?,
        transaction_hash: log.transaction_hash.to_lowercase(),
    })
}

/// Splits the open interval `(start, end]` into inclusive `[from, to]`
/// block ranges no wider than `max_blocks`.
pub fn block_ranges(start: u64, end: u64, max_blocks: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut from = start + 1;
    while from <= end {
        let to = end.min(from + max_blocks - 1);
        ranges.push((from, to));
        from = to + 1;
    }
    ranges
}

// ============================================================================
// ETHEREUM CLIENT IMPLEMENTATION
// ============================================================================

/// Client for the Ethereum node's JSON-RPC API.
#[derive(Debug, Clone)]
pub struct EthClient {
    client: Client,
    rpc_url: String,
}

impl EthClient {
    /// Creates a new client for the configured node URL with the
    /// configured request timeout.
    pub fn new(config: &EthereumConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .context("failed to create HTTP client")?;
        Ok(EthClient {
            client,
            rpc_url: config.rpc_url.clone(),
        })
    }

    /// Gets the current block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        let result: String = self.call_rpc("eth_blockNumber", serde_json::json!([])).await?;
        parse_hex_u64(&result)
    }

    /// Gets the node's chain id as a decimal string.
    pub async fn get_chain_id(&self) -> Result<String> {
        let result: String = self.call_rpc("eth_chainId", serde_json::json!([])).await?;
        Ok(parse_hex_u64(&result)?.to_string())
    }

    /// Queries logs emitted by `contract_address` with the given first
    /// topic, over the inclusive block range `[from_block, to_block]`.
    pub async fn get_logs(
        &self,
        contract_address: &str,
        topic: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EvmLog>> {
        let params = serde_json::json!([{
            "address": contract_address,
            "topics": [topic],
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
        }]);
        self.call_rpc("eth_getLogs", params).await
    }

    /// Reads the wrapped token's per-recipient mint nonce counter via
    /// `getUserNonce(address)` on the mint controller.
    pub async fn get_user_nonce(&self, mint_controller: &str, recipient: &str) -> Result<String> {
        let selector = &keccak256(b"getUserNonce(address)")[..4];
        let recipient = strip_hex_prefix(recipient);
        if recipient.len() != 40 {
            return Err(anyhow!("invalid recipient address: {}", recipient));
        }
        let data = format!("0x{}{:0>64}", hex::encode(selector), recipient.to_lowercase());
        let params = serde_json::json!([{ "to": mint_controller, "data": data }, "latest"]);
        let result: String = self.call_rpc("eth_call", params).await?;
        word_to_decimal(strip_hex_prefix(&result))
    }

    async fn call_rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };
        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to send {} request to {}", method, self.rpc_url))?
            .json()
            .await
            .with_context(|| format!("failed to parse {} response from {}", method, self.rpc_url))?;
        if let Some(error) = response.error {
            return Err(anyhow!(
                "JSON-RPC error from {}: {} (code: {})",
                self.rpc_url,
                error.message,
                error.code
            ));
        }
        response
            .result
            .ok_or_else(|| anyhow!("no result in {} response", method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ranges_chunk_exactly() {
        // span of 2 * MAX + 1 blocks must produce three sub-queries
        let start = 1_000;
        let end = start + 2 * MAX_QUERY_BLOCKS + 1;
        let ranges = block_ranges(start, end, MAX_QUERY_BLOCKS);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], (start + 1, start + MAX_QUERY_BLOCKS));
        assert_eq!(ranges[1], (start + MAX_QUERY_BLOCKS + 1, start + 2 * MAX_QUERY_BLOCKS));
        assert_eq!(ranges[2], (start + 2 * MAX_QUERY_BLOCKS + 1, end));
    }

    #[test]
    fn block_ranges_empty_when_no_new_blocks() {
        assert!(block_ranges(10, 10, MAX_QUERY_BLOCKS).is_empty());
        assert!(block_ranges(10, 9, MAX_QUERY_BLOCKS).is_empty());
    }

    #[test]
    fn block_ranges_single_chunk_for_small_span() {
        assert_eq!(block_ranges(5, 10, MAX_QUERY_BLOCKS), vec![(6, 10)]);
    }
}
