//! Ethereum burn monitor.
//!
//! Scans the wrapped token contract for `BurnAndBridge` events and records
//! each as a burn. Wide block spans are chunked so no single log query
//! exceeds the node's range cap. Each tick also runs a confirmation pass
//! over pending burns, promoting them once enough blocks have built on
//! top of the burn.

use std::time::Duration;

use mongodb::bson::{doc, DateTime};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::db::{Database, DbError};
use crate::eth_client::{
    block_ranges, burn_and_bridge_topic, decode_burn_and_bridge_event, EthClient, MAX_QUERY_BLOCKS,
};
use crate::health::{next_sync_time, restored_eth_block};
use crate::models::{Burn, HealthRecord, ServiceHealth, Status, COLLECTION_BURNS};
use crate::service::PeriodicService;

pub const BURN_MONITOR_NAME: &str = "burn monitor";

pub struct BurnMonitor {
    db: Database,
    client: EthClient,
    interval: Duration,
    wpokt_address: String,
    eth_chain_id: String,
    pokt_chain_id: String,
    required_confirmations: u64,
    start_block_number: u64,
    current_block_number: u64,
    last_sync_time: DateTime,
}

impl BurnMonitor {
    /// Creates the monitor, restoring the block cursor from the last
    /// heartbeat, falling back to the configured start block, falling
    /// back to the current chain tip.
    pub async fn new(
        config: &Config,
        db: Database,
        last_health: Option<&HealthRecord>,
    ) -> anyhow::Result<Self> {
        let client = EthClient::new(&config.ethereum)?;
        let start_block_number = match restored_eth_block(last_health, BURN_MONITOR_NAME) {
            Some(block) => block,
            None if config.ethereum.start_block_number > 0 => {
                config.ethereum.start_block_number as u64
            }
            None => client.get_block_number().await?,
        };
        info!(start_block_number, "burn monitor starting");
        Ok(BurnMonitor {
            db,
            client,
            interval: Duration::from_secs(config.burn_monitor.interval_secs),
            wpokt_address: config.ethereum.wrapped_pocket_address.to_lowercase(),
            eth_chain_id: config.ethereum.chain_id.clone(),
            pokt_chain_id: config.pocket.chain_id.clone(),
            required_confirmations: config.ethereum.confirmations,
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

    async fn sync_blocks(&self, from_block: u64, to_block: u64) -> bool {
        let logs = match self
            .client
            .get_logs(&self.wpokt_address, &burn_and_bridge_topic(), from_block, to_block)
            .await
        {
            Ok(logs) => logs,
            Err(err) => {
                error!(from_block, to_block, "error fetching burn logs: {}", err);
                return false;
            }
        };
        let mut success = true;
        for log in &logs {
            let event = match decode_burn_and_bridge_event(log) {
                Ok(event) => event,
                Err(err) => {
                    error!("error decoding burn log: {}", err);
                    continue;
                }
            };
            let burn = Burn::from_event(
                &event,
                &self.eth_chain_id,
                &self.pokt_chain_id,
                self.required_confirmations,
            );
            match self.db.insert_one(COLLECTION_BURNS, &burn).await {
                Ok(()) => debug!(hash = %burn.transaction_hash, log_index = %burn.log_index, "stored burn"),
                Err(DbError::Duplicate) => {
                    debug!(hash = %burn.transaction_hash, log_index = %burn.log_index, "burn already stored")
                }
                Err(err) => {
                    error!(hash = %burn.transaction_hash, "error storing burn: {}", err);
                    success = false;
                }
            }
        }
        success
    }

    async fn sync_txs(&self) -> bool {
        let mut success = true;
        for (from_block, to_block) in
            block_ranges(self.start_block_number, self.current_block_number, MAX_QUERY_BLOCKS)
        {
            debug!(from_block, to_block, "syncing burn events");
            success = self.sync_blocks(from_block, to_block).await && success;
        }
        success
    }

    /// Refreshes confirmation counts on pending burns and promotes those
    /// that have reached the configured depth.
    async fn confirm_burns(&self) -> bool {
        let filter = doc! {
            "status": Status::Pending.as_str(),
            "wpokt_address": &self.wpokt_address,
        };
        let burns: Vec<Burn> = match self.db.find_many(COLLECTION_BURNS, filter).await {
            Ok(burns) => burns,
            Err(err) => {
                error!("error fetching pending burns: {}", err);
                return false;
            }
        };
        let mut success = true;
        for burn in &burns {
            let block_number: u64 = match burn.block_number.parse() {
                Ok(block) => block,
                Err(_) => {
                    error!(hash = %burn.transaction_hash, "invalid block number on burn");
                    continue;
                }
            };
            let confirmations = self.current_block_number.saturating_sub(block_number);
            let update = if confirmations >= self.required_confirmations {
                debug!(hash = %burn.transaction_hash, confirmations, "burn confirmed");
                doc! { "$set": {
                    "status": Status::Confirmed.as_str(),
                    "confirmations": confirmations.to_string(),
                    "updated_at": DateTime::now(),
                }}
            } else {
                doc! { "$set": {
                    "confirmations": confirmations.to_string(),
                    "updated_at": DateTime::now(),
                }}
            };
            let filter = doc! { "_id": burn.id, "status": Status::Pending.as_str() };
            if let Err(err) = self.db.update_one(COLLECTION_BURNS, filter, update).await {
                error!(hash = %burn.transaction_hash, "error updating burn confirmations: {}", err);
                success = false;
            }
        }
        success
    }
}

impl PeriodicService for BurnMonitor {
    fn name(&self) -> &'static str {
        BURN_MONITOR_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: BURN_MONITOR_NAME.to_string(),
            last_sync_time: self.last_sync_time,
            next_sync_time: next_sync_time(self.last_sync_time, self.interval),
            pokt_height: String::new(),
            eth_block_number: self.start_block_number.to_string(),
            healthy: true,
        }
    }

    async fn tick(&mut self) {
        debug!("starting burn sync");
        self.last_sync_time = DateTime::now();

        self.update_current_block_number().await;

        if self.current_block_number > self.start_block_number {
            if self.sync_txs().await {
                self.start_block_number = self.current_block_number;
            }
        } else {
            debug!(block = self.current_block_number, "no new blocks to sync");
        }

        self.confirm_burns().await;

        debug!("finished burn sync");
    }
}
