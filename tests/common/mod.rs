//! Shared test helpers.
//!
//! Dummy constants, configuration builders and event/transaction builders
//! used across the integration tests.
#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use wpokt_validator::config::{Config, EthereumConfig, MongoConfig, PocketConfig};
use wpokt_validator::eth_client::EvmLog;
use wpokt_validator::multisig::{signer_address, MultisigKey};
use wpokt_validator::pocket_client::{Msg, MsgValue, StdTx, TxResponse, TxResult};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dummy Pocket deposit hash
pub const DUMMY_POKT_TX_HASH: &str = "0xaaa1111111111111111111111111111111111111";

/// Dummy Pocket vault address (overridden by multisig-derived configs)
pub const DUMMY_VAULT_ADDRESS: &str = "abc123def0000000000000000000000000000000";

/// Dummy Ethereum recipient (20 bytes, lowercase)
pub const DUMMY_RECIPIENT_ADDRESS: &str = "0x0000000000000000000000000000001234567890";

/// Dummy wrapped token contract address
pub const DUMMY_WPOKT_ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

/// Dummy mint controller contract address
pub const DUMMY_MINT_CONTROLLER_ADDRESS: &str = "0x00000000000000000000000000000000000000bb";

/// Dummy Ethereum transaction hash (32 bytes)
pub const DUMMY_ETH_TX_HASH: &str =
    "0x0000000000000000000000000000000000000000000000001234567890abcdef";

/// Dummy Ethereum sender address
pub const DUMMY_ETH_SENDER: &str = "0x0000000000000000000000000000000000abcdef";

/// Test secp256k1 private key
pub const DUMMY_ETH_PRIVATE_KEY: &str =
    "0x0101010101010101010101010101010101010101010101010101010101010101";

// ============================================================================
// CONFIG BUILDERS
// ============================================================================

/// Baseline config pointing both chains at the given URLs.
pub fn build_test_config(pokt_rpc_url: &str, eth_rpc_url: &str) -> Config {
    let (keys, multisig) = test_multisig_keys(3, 2);
    Config {
        mongodb: MongoConfig {
            uri: "mongodb://localhost:27017".to_string(),
            database: "wpokt-test".to_string(),
            timeout_secs: 2,
        },
        ethereum: EthereumConfig {
            rpc_url: eth_rpc_url.to_string(),
            chain_id: "1".to_string(),
            private_key: DUMMY_ETH_PRIVATE_KEY.to_string(),
            start_block_number: 1,
            confirmations: 0,
            rpc_timeout_secs: 2,
            wrapped_pocket_address: DUMMY_WPOKT_ADDRESS.to_string(),
            mint_controller_address: DUMMY_MINT_CONTROLLER_ADDRESS.to_string(),
            validator_addresses: vec![
                "0x0000000000000000000000000000000000000001".to_string(),
                "0x0000000000000000000000000000000000000002".to_string(),
                "0x0000000000000000000000000000000000000003".to_string(),
            ],
        },
        pocket: PocketConfig {
            rpc_url: pokt_rpc_url.to_string(),
            chain_id: "0001".to_string(),
            private_key: hex::encode(keys[0].to_bytes()),
            tx_fee: 10_000,
            start_height: 1,
            confirmations: 0,
            rpc_timeout_secs: 2,
            vault_address: multisig.address(),
            multisig_public_keys: keys
                .iter()
                .map(|k| hex::encode(k.verifying_key().as_bytes()))
                .collect(),
            multisig_threshold: 2,
        },
        ..Config::default()
    }
}

/// Deterministic multisig member keys, sorted by signer address.
pub fn test_multisig_keys(members: u8, threshold: usize) -> (Vec<SigningKey>, MultisigKey) {
    let mut keys: Vec<SigningKey> = (1..=members)
        .map(|i| SigningKey::from_bytes(&[i; 32]))
        .collect();
    keys.sort_by_key(|k| signer_address(&k.verifying_key()));
    let hex_keys: Vec<String> = keys
        .iter()
        .map(|k| hex::encode(k.verifying_key().as_bytes()))
        .collect();
    let multisig = MultisigKey::new(&hex_keys, threshold).expect("test multisig");
    (keys, multisig)
}

// ============================================================================
// EVENT AND TRANSACTION BUILDERS
// ============================================================================

/// A successful vault transfer with the given memo.
pub fn build_transfer_tx(hash: &str, height: u64, amount: &str, memo: &str, to: &str) -> TxResponse {
    TxResponse {
        hash: hash.to_string(),
        height,
        tx_result: TxResult {
            code: 0,
            message_type: "send".to_string(),
        },
        std_tx: StdTx {
            memo: memo.to_string(),
            msg: Msg {
                msg_type: "pos/Send".to_string(),
                value: MsgValue {
                    from_address: "abcdef0000000000000000000000000000000000".to_string(),
                    to_address: to.to_string(),
                    amount: amount.to_string(),
                },
            },
        },
    }
}

fn pad_word(hex_value: &str) -> String {
    format!("{:0>64}", hex_value)
}

/// Raw `BurnAndBridge(uint256,address,address)` log.
pub fn build_burn_log(
    amount_hex: &str,
    from: &str,
    pokt_address: &str,
    block_number: u64,
    log_index: u64,
    tx_hash: &str,
) -> EvmLog {
    EvmLog {
        address: DUMMY_WPOKT_ADDRESS.to_string(),
        topics: vec![
            wpokt_validator::eth_client::burn_and_bridge_topic(),
            format!("0x{}", pad_word(amount_hex)),
            format!("0x{}", pad_word(from.trim_start_matches("0x"))),
            format!("0x{}", pad_word(pokt_address.trim_start_matches("0x"))),
        ],
        data: "0x".to_string(),
        block_number: format!("0x{:x}", block_number),
        transaction_hash: tx_hash.to_string(),
        log_index: format!("0x{:x}", log_index),
    }
}

/// Raw `Minted(address,uint256,uint256)` log.
pub fn build_minted_log(
    recipient: &str,
    amount_hex: &str,
    nonce_hex: &str,
    block_number: u64,
    tx_hash: &str,
) -> EvmLog {
    EvmLog {
        address: DUMMY_WPOKT_ADDRESS.to_string(),
        topics: vec![
            wpokt_validator::eth_client::minted_topic(),
            format!("0x{}", pad_word(recipient.trim_start_matches("0x"))),
        ],
        data: format!("0x{}{}", pad_word(amount_hex), pad_word(nonce_hex)),
        block_number: format!("0x{:x}", block_number),
        transaction_hash: tx_hash.to_string(),
        log_index: "0x0".to_string(),
    }
}
