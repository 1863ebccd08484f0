//! Configuration loading and validation.
//!
//! Configuration is assembled in three layers: an optional YAML file, an
//! optional env file of `KEY=VALUE` lines loaded into the process
//! environment, and finally recognized environment variables that override
//! individual fields (so secrets never have to live in the YAML file).
//! Validation runs after all layers and any missing required value aborts
//! startup.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Top-level configuration for the validator daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mongodb: MongoConfig,
    pub ethereum: EthereumConfig,
    pub pocket: PocketConfig,
    pub mint_monitor: ServiceConfig,
    pub mint_signer: ServiceConfig,
    pub mint_executor: ServiceConfig,
    pub burn_monitor: ServiceConfig,
    pub burn_signer: ServiceConfig,
    pub burn_executor: ServiceConfig,
    pub health: HealthConfig,
}

/// Record store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    /// Deadline applied to every store operation, in seconds
    pub timeout_secs: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        MongoConfig {
            uri: String::new(),
            database: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Ethereum connection and contract settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EthereumConfig {
    pub rpc_url: String,
    /// Chain id as a decimal string; must match the node at startup
    pub chain_id: String,
    /// secp256k1 private key for EIP-712 mint authorizations (hex)
    pub private_key: String,
    /// First block to scan; zero or negative means start from the tip
    pub start_block_number: i64,
    /// Blocks that must build on top of an event before it is acted on
    pub confirmations: u64,
    pub rpc_timeout_secs: u64,
    pub wrapped_pocket_address: String,
    pub mint_controller_address: String,
    /// Ethereum addresses of the full validator set
    pub validator_addresses: Vec<String>,
}

impl Default for EthereumConfig {
    fn default() -> Self {
        EthereumConfig {
            rpc_url: String::new(),
            chain_id: String::new(),
            private_key: String::new(),
            start_block_number: 0,
            confirmations: 0,
            rpc_timeout_secs: 30,
            wrapped_pocket_address: String::new(),
            mint_controller_address: String::new(),
            validator_addresses: Vec::new(),
        }
    }
}

/// Pocket connection and multisig settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketConfig {
    pub rpc_url: String,
    pub chain_id: String,
    /// ed25519 private key of this validator's multisig slot (hex)
    pub private_key: String,
    /// Network fee charged on return transactions, in the smallest unit
    pub tx_fee: u64,
    /// First height to scan; zero or negative means start from the tip
    pub start_height: i64,
    pub confirmations: u64,
    pub rpc_timeout_secs: u64,
    /// Multisig-owned address that holds bridged deposits
    pub vault_address: String,
    /// Ordered ed25519 public keys of the vault multisig (hex). The order
    /// is authoritative: the keys must hash to `vault_address` as listed.
    pub multisig_public_keys: Vec<String>,
    pub multisig_threshold: usize,
}

impl Default for PocketConfig {
    fn default() -> Self {
        PocketConfig {
            rpc_url: String::new(),
            chain_id: String::new(),
            private_key: String::new(),
            tx_fee: 10_000,
            start_height: 0,
            confirmations: 0,
            rpc_timeout_secs: 30,
            vault_address: String::new(),
            multisig_public_keys: Vec::new(),
            multisig_threshold: 0,
        }
    }
}

/// Per-service toggle and tick interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            enabled: true,
            interval_secs: 300,
        }
    }
}

/// Heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_secs: u64,
    /// Restore chain cursors from the last heartbeat on startup
    pub read_last_health: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            interval_secs: 60,
            read_last_health: true,
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
    /// Loads configuration from the given YAML file and env file, then
    /// applies environment overrides and validates the result.
    pub fn load(config_path: Option<&str>, env_path: Option<&str>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path))?;
                serde_yaml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {}", path))?
            }
            None => Config::default(),
        };
        if let Some(path) = env_path {
            load_env_file(path)?;
        }
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overrides individual fields from recognized environment variables.
    fn apply_env_overrides(&mut self) {
        override_string("MONGODB_URI", &mut self.mongodb.uri);
        override_string("MONGODB_DATABASE", &mut self.mongodb.database);
        override_parsed("MONGODB_TIMEOUT_SECS", &mut self.mongodb.timeout_secs);

        override_string("ETH_RPC_URL", &mut self.ethereum.rpc_url);
        override_string("ETH_CHAIN_ID", &mut self.ethereum.chain_id);
        override_string("ETH_PRIVATE_KEY", &mut self.ethereum.private_key);
        override_parsed("ETH_START_BLOCK_NUMBER", &mut self.ethereum.start_block_number);
        override_parsed("ETH_CONFIRMATIONS", &mut self.ethereum.confirmations);
        override_parsed("ETH_RPC_TIMEOUT_SECS", &mut self.ethereum.rpc_timeout_secs);
        override_string(
            "ETH_WRAPPED_POCKET_ADDRESS",
            &mut self.ethereum.wrapped_pocket_address,
        );
        override_string(
            "ETH_MINT_CONTROLLER_ADDRESS",
            &mut self.ethereum.mint_controller_address,
        );
        override_list("ETH_VALIDATOR_ADDRESSES", &mut self.ethereum.validator_addresses);

        override_string("POKT_RPC_URL", &mut self.pocket.rpc_url);
        override_string("POKT_CHAIN_ID", &mut self.pocket.chain_id);
        override_string("POKT_PRIVATE_KEY", &mut self.pocket.private_key);
        override_parsed("POKT_TX_FEE", &mut self.pocket.tx_fee);
        override_parsed("POKT_START_HEIGHT", &mut self.pocket.start_height);
        override_parsed("POKT_CONFIRMATIONS", &mut self.pocket.confirmations);
        override_parsed("POKT_RPC_TIMEOUT_SECS", &mut self.pocket.rpc_timeout_secs);
        override_string("POKT_VAULT_ADDRESS", &mut self.pocket.vault_address);
        override_list("POKT_MULTISIG_PUBLIC_KEYS", &mut self.pocket.multisig_public_keys);
        override_parsed("POKT_MULTISIG_THRESHOLD", &mut self.pocket.multisig_threshold);
    }

    /// Checks every required field; any failure here is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.mongodb.uri.is_empty() {
            return Err(anyhow!("mongodb.uri is required"));
        }
        if self.mongodb.database.is_empty() {
            return Err(anyhow!("mongodb.database is required"));
        }

        if self.ethereum.rpc_url.is_empty() {
            return Err(anyhow!("ethereum.rpc_url is required"));
        }
        if self.ethereum.chain_id.is_empty() {
            return Err(anyhow!("ethereum.chain_id is required"));
        }
        if self.ethereum.private_key.is_empty() {
            return Err(anyhow!("ethereum.private_key is required"));
        }
        if self.ethereum.wrapped_pocket_address.is_empty() {
            return Err(anyhow!("ethereum.wrapped_pocket_address is required"));
        }
        if self.ethereum.mint_controller_address.is_empty() {
            return Err(anyhow!("ethereum.mint_controller_address is required"));
        }
        if self.ethereum.validator_addresses.is_empty() {
            return Err(anyhow!("ethereum.validator_addresses is required"));
        }

        if self.pocket.rpc_url.is_empty() {
            return Err(anyhow!("pocket.rpc_url is required"));
        }
        if self.pocket.chain_id.is_empty() {
            return Err(anyhow!("pocket.chain_id is required"));
        }
        if self.pocket.private_key.is_empty() {
            return Err(anyhow!("pocket.private_key is required"));
        }
        if self.pocket.tx_fee == 0 {
            return Err(anyhow!("pocket.tx_fee is required"));
        }
        if self.pocket.vault_address.is_empty() {
            return Err(anyhow!("pocket.vault_address is required"));
        }
        if self.pocket.multisig_public_keys.is_empty() {
            return Err(anyhow!("pocket.multisig_public_keys is required"));
        }
        let n = self.pocket.multisig_public_keys.len();
        if self.pocket.multisig_threshold == 0 || self.pocket.multisig_threshold > n {
            return Err(anyhow!(
                "pocket.multisig_threshold must be between 1 and {}, got {}",
                n,
                self.pocket.multisig_threshold
            ));
        }
        Ok(())
    }
}

/// Loads `KEY=VALUE` lines from an env file into the process environment.
///
/// Lines that are empty or start with `#` are skipped. Existing process
/// variables win over the file.
fn load_env_file(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        return Err(anyhow!("env file {} not found", path));
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read env file {}", path))?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if std::env::var(key).is_err() {
                std::env::set_var(key, value.trim());
            }
        }
    }
    Ok(())
}

fn override_string(key: &str, field: &mut String) {
    if let Ok(value) = std::env::var(key) {
        if !value.is_empty() {
            *field = value;
        }
    }
}

fn override_list(key: &str, field: &mut Vec<String>) {
    if let Ok(value) = std::env::var(key) {
        if !value.is_empty() {
            *field = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}

fn override_parsed<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.parse::<T>() {
            *field = parsed;
        }
    }
}
