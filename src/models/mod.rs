//! Bridge record model.
//!
//! Every bridge operation in flight is a document in one of three MongoDB
//! collections: `mints` (Pocket deposits awaiting wrapped issuance),
//! `invalid_mints` (deposits with an unusable memo, refunded on Pocket)
//! and `burns` (Ethereum burns awaiting a Pocket payout). A fourth
//! collection, `healthchecks`, holds the per-validator heartbeat document.
//!
//! Records are created once by a monitor, mutated by signers and executors
//! through conditional updates, and never deleted here. Uniqueness of the
//! originating transaction hash (plus log index for burns) is enforced by
//! the store and makes re-observation of the same on-chain event a no-op.

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::eth_client::BurnAndBridgeEvent;
use crate::pocket_client::TxResponse;

pub const COLLECTION_MINTS: &str = "mints";
pub const COLLECTION_INVALID_MINTS: &str = "invalid_mints";
pub const COLLECTION_BURNS: &str = "burns";
pub const COLLECTION_HEALTHCHECKS: &str = "healthchecks";

// ============================================================================
// STATUS
// ============================================================================

/// Lifecycle status of a bridge record.
///
/// Progression is strictly `pending -> confirmed -> signed -> submitted ->
/// success`; `failed` is terminal. No service ever moves a record backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Confirmed,
    Signed,
    Submitted,
    Success,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Confirmed => "confirmed",
            Status::Signed => "signed",
            Status::Submitted => "submitted",
            Status::Success => "success",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MINT MEMO
// ============================================================================

/// Routing header carried in the memo field of a Pocket deposit.
///
/// The memo must be a strict JSON object with exactly these two fields;
/// anything else makes the deposit an invalid mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MintMemo {
    /// Destination address on Ethereum (0x-prefixed 20-byte hex)
    pub address: String,
    /// Destination chain id as a decimal string
    pub chain_id: String,
}

/// Returns true if `s` is a 0x-prefixed 20-byte hex address.
pub fn is_valid_eth_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parses and validates a deposit memo against the configured Ethereum id.
///
/// Returns the memo with the address normalized to lowercase, or `None`
/// when the memo is malformed, carries extra fields, has an invalid
/// address, or routes to a different chain.
pub fn validate_memo(raw: &str, eth_chain_id: &str) -> Option<MintMemo> {
    let mut memo: MintMemo = serde_json::from_str(raw).ok()?;
    if !is_valid_eth_address(&memo.address) {
        return None;
    }
    if memo.chain_id != eth_chain_id {
        return None;
    }
    memo.address = memo.address.to_lowercase();
    Some(memo)
}

// ============================================================================
// RECORDS
// ============================================================================

/// EIP-712 mint authorization payload, derived once per mint at signing
/// time and shared verbatim by every cosigner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintData {
    pub recipient: String,
    pub amount: String,
    pub nonce: String,
}

/// A Pocket deposit with a valid memo, awaiting wrapped issuance on
/// Ethereum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mint {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub height: String,
    pub confirmations: String,
    pub transaction_hash: String,
    pub sender_address: String,
    pub sender_chain_id: String,
    pub recipient_address: String,
    pub recipient_chain_id: String,
    pub wpokt_address: String,
    pub vault_address: String,
    pub amount: String,
    pub memo: MintMemo,
    pub nonce: Option<String>,
    pub data: Option<MintData>,
    pub signers: Vec<String>,
    pub signatures: Vec<String>,
    pub mint_tx_hash: Option<String>,
    pub status: Status,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Mint {
    /// Builds a pending mint from an observed vault deposit and its parsed
    /// memo.
    pub fn from_deposit(
        tx: &TxResponse,
        memo: MintMemo,
        pokt_chain_id: &str,
        wpokt_address: &str,
        vault_address: &str,
    ) -> Self {
        let now = DateTime::now();
        Mint {
            id: None,
            height: tx.height.to_string(),
            confirmations: "0".to_string(),
            transaction_hash: tx.hash.to_lowercase(),
            sender_address: tx.std_tx.msg.value.from_address.to_lowercase(),
            sender_chain_id: pokt_chain_id.to_string(),
            recipient_address: memo.address.clone(),
            recipient_chain_id: memo.chain_id.clone(),
            wpokt_address: wpokt_address.to_lowercase(),
            vault_address: vault_address.to_lowercase(),
            amount: tx.std_tx.msg.value.amount.clone(),
            memo,
            nonce: None,
            data: None,
            signers: Vec::new(),
            signatures: Vec::new(),
            mint_tx_hash: None,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A Pocket deposit whose memo could not be used for routing; the funds
/// are returned to the sender through the vault multisig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidMint {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub height: String,
    pub confirmations: String,
    pub transaction_hash: String,
    pub sender_address: String,
    pub sender_chain_id: String,
    pub memo: String,
    pub amount: String,
    pub vault_address: String,
    pub return_tx: Option<String>,
    pub return_tx_hash: Option<String>,
    pub signers: Vec<String>,
    pub status: Status,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl InvalidMint {
    pub fn from_deposit(tx: &TxResponse, pokt_chain_id: &str, vault_address: &str) -> Self {
        let now = DateTime::now();
        InvalidMint {
            id: None,
            height: tx.height.to_string(),
            confirmations: "0".to_string(),
            transaction_hash: tx.hash.to_lowercase(),
            sender_address: tx.std_tx.msg.value.from_address.to_lowercase(),
            sender_chain_id: pokt_chain_id.to_string(),
            memo: tx.std_tx.memo.clone(),
            amount: tx.std_tx.msg.value.amount.clone(),
            vault_address: vault_address.to_lowercase(),
            return_tx: None,
            return_tx_hash: None,
            signers: Vec::new(),
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A Ethereum burn-and-bridge awaiting its Pocket payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Burn {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub transaction_hash: String,
    pub log_index: String,
    pub block_number: String,
    pub confirmations: String,
    pub sender_address: String,
    pub sender_chain_id: String,
    pub recipient_address: String,
    pub recipient_chain_id: String,
    pub wpokt_address: String,
    pub amount: String,
    pub return_tx: Option<String>,
    pub return_tx_hash: Option<String>,
    pub signers: Vec<String>,
    pub status: Status,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Burn {
    /// Builds a burn record from a decoded `BurnAndBridge` event. When the
    /// configured confirmation depth is zero the record is created already
    /// confirmed.
    pub fn from_event(
        event: &BurnAndBridgeEvent,
        eth_chain_id: &str,
        pokt_chain_id: &str,
        required_confirmations: u64,
    ) -> Self {
        let now = DateTime::now();
        let status = if required_confirmations == 0 {
            Status::Confirmed
        } else {
            Status::Pending
        };
        Burn {
            id: None,
            transaction_hash: event.transaction_hash.to_lowercase(),
            log_index: event.log_index.to_string(),
            block_number: event.block_number.to_string(),
            confirmations: "0".to_string(),
            sender_address: event.from.to_lowercase(),
            sender_chain_id: eth_chain_id.to_string(),
            recipient_address: event.pokt_address.clone(),
            recipient_chain_id: pokt_chain_id.to_string(),
            wpokt_address: event.contract_address.to_lowercase(),
            amount: event.amount.clone(),
            return_tx: None,
            return_tx_hash: None,
            signers: Vec::new(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// HEALTH
// ============================================================================

/// Snapshot of one service's sync state, embedded in the heartbeat
/// document and used to restore chain cursors across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub last_sync_time: DateTime,
    pub next_sync_time: DateTime,
    pub pokt_height: String,
    pub eth_block_number: String,
    pub healthy: bool,
}

impl ServiceHealth {
    pub fn new(name: &str) -> Self {
        let now = DateTime::now();
        ServiceHealth {
            name: name.to_string(),
            last_sync_time: now,
            next_sync_time: now,
            pokt_height: String::new(),
            eth_block_number: String::new(),
            healthy: true,
        }
    }
}

/// Singleton heartbeat document, one per validator identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub pokt_vault_address: String,
    pub eth_validator_address: String,
    pub service_healths: Vec<ServiceHealth>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
