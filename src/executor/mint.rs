//! Ethereum mint executor.
//!
//! Observer side of the mint flow: scans `Minted` events from the wrapped
//! token contract and marks the matching mint records successful. The
//! signed authorization itself is broadcast externally; the per-recipient
//! nonce on the contract deduplicates whoever submits it, and this
//! service settles the record when the event lands.

use std::time::Duration;

use mongodb::bson::{doc, DateTime};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::db::Database;
use crate::eth_client::{
    block_ranges, decode_minted_event, minted_topic, EthClient, MintedEvent, MAX_QUERY_BLOCKS,
};
use crate::health::{next_sync_time, restored_eth_block};
use crate::models::{HealthRecord, ServiceHealth, Status, COLLECTION_MINTS};
use crate::service::PeriodicService;

pub const MINT_EXECUTOR_NAME: &str = "mint executor";

pub struct MintExecutor {
    db: Database,
    client: EthClient,
    interval: Duration,
    wpokt_address: String,
    vault_address: String,
    start_block_number: u64,
    current_block_number: u64,
    last_sync_time: DateTime,
}

impl MintExecutor {
    /// Creates the executor, restoring the block cursor from the last
    /// heartbeat, falling back to the configured start block, falling
    /// back to the current chain tip.
    pub async fn new(
        config: &Config,
        db: Database,
        last_health: Option<&HealthRecord>,
    ) -> anyhow::Result<Self> {
        let client = EthClient::new(&config.ethereum)?;
        let start_block_number = match restored_eth_block(last_health, MINT_EXECUTOR_NAME) {
            Some(block) => block,
            None if config.ethereum.start_block_number > 0 => {
                config.ethereum.start_block_number as u64
            }
            None => client.get_block_number().await?,
        };
        info!(start_block_number, "mint executor starting");
        Ok(MintExecutor {
            db,
            client,
            interval: Duration::from_secs(config.mint_executor.interval_secs),
            wpokt_address: config.ethereum.wrapped_pocket_address.to_lowercase(),
            vault_address: config.pocket.vault_address.to_lowercase(),
            start_block_number,
            current_block_number: start_block_number,
            last_sync_time: DateTime::now(),
        })
    }

    async fn update_current_block_number(&mut self) {
        match self.client.get_block_number().await {
            Ok(block) => {
                self.current_block_number = block;
                debug!(block, "updated current block number");
            }
            Err(err) => error!("error fetching block number: {}", err),
        }
    }

    /// Settles the mint record matching a `Minted` event.
    async fn handle_mint_event(&self, event: &MintedEvent) -> bool {
        debug!(
            hash = %event.transaction_hash,
            recipient = %event.recipient,
            nonce = %event.nonce,
            "handling mint event"
        );
        let filter = doc! {
            "wpokt_address": &self.wpokt_address,
            "vault_address": &self.vault_address,
            "recipient_address": &event.recipient,
            "amount": &event.amount,
            "nonce": &event.nonce,
            "status": { "$in": [Status::Confirmed.as_str(), Status::Signed.as_str()] },
        };
        let update = doc! { "$set": {
            "status": Status::Success.as_str(),
            "mint_tx_hash": &event.transaction_hash,
            "updated_at": DateTime::now(),
        }};
        match self.db.update_one(COLLECTION_MINTS, filter, update).await {
            Ok(0) => {
                debug!(hash = %event.transaction_hash, "mint event matches no record");
                true
            }
            Ok(_) => {
                info!(hash = %event.transaction_hash, "mint succeeded");
                true
            }
            Err(err) => {
                error!(hash = %event.transaction_hash, "error updating mint: {}", err);
                false
            }
        }
    }

    async fn sync_blocks(&self, from_block: u64, to_block: u64) -> bool {
        let logs = match self
            .client
            .get_logs(&self.wpokt_address, &minted_topic(), from_block, to_block)
            .await
        {
            Ok(logs) => logs,
            Err(err) => {
                error!(from_block, to_block, "error fetching mint events: {}", err);
                return false;
            }
        };
        let mut success = true;
        for log in &logs {
            match decode_minted_event(log) {
                Ok(event) => success = self.handle_mint_event(&event).await && success,
                Err(err) => error!("error decoding mint event: {}", err),
            }
        }
        success
    }

    async fn sync_txs(&self) -> bool {
        let mut success = true;
        for (from_block, to_block) in
            block_ranges(self.start_block_number, self.current_block_number, MAX_QUERY_BLOCKS)
        {
            debug!(from_block, to_block, "syncing mint events");
            success = self.sync_blocks(from_block, to_block).await && success;
        }
        success
    }
}

impl PeriodicService for MintExecutor {
    fn name(&self) -> &'static str {
        MINT_EXECUTOR_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: MINT_EXECUTOR_NAME.to_string(),
            last_sync_time: self.last_sync_time,
            next_sync_time: next_sync_time(self.last_sync_time, self.interval),
            pokt_height: String::new(),
            eth_block_number: self.start_block_number.to_string(),
            healthy: true,
        }
    }

    async fn tick(&mut self) {
        debug!("starting mint event sync");
        self.last_sync_time = DateTime::now();

        self.update_current_block_number().await;

        if self.current_block_number > self.start_block_number {
            if self.sync_txs().await {
                self.start_block_number = self.current_block_number;
            }
        } else {
            debug!(block = self.current_block_number, "no new blocks to sync");
        }

        debug!("finished mint event sync");
    }
}
