//! Pocket deposit monitor.
//!
//! Scans vault transfers on the Pocket chain and records each one as
//! either a mint (valid routing memo) or an invalid mint (anything else).
//! The height cursor only advances once every transaction in the scanned
//! window has been stored, so a partial failure is retried in full on the
//! next tick; duplicate-key inserts count as stored.

use std::time::Duration;

use mongodb::bson::DateTime;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::db::{Database, DbError};
use crate::health::{next_sync_time, restored_pokt_height};
use crate::models::{
    validate_memo, HealthRecord, InvalidMint, Mint, ServiceHealth, COLLECTION_INVALID_MINTS,
    COLLECTION_MINTS,
};
use crate::pocket_client::{PocketClient, TxResponse};
use crate::service::PeriodicService;

pub const MINT_MONITOR_NAME: &str = "mint monitor";

pub struct MintMonitor {
    db: Database,
    client: PocketClient,
    interval: Duration,
    vault_address: String,
    wpokt_address: String,
    pokt_chain_id: String,
    eth_chain_id: String,
    start_height: u64,
    current_height: u64,
    last_sync_time: DateTime,
}

impl MintMonitor {
    /// Creates the monitor, restoring the height cursor from the last
    /// heartbeat, falling back to the configured start height, falling
    /// back to the current chain tip.
    pub async fn new(
        config: &Config,
        db: Database,
        last_health: Option<&HealthRecord>,
    ) -> anyhow::Result<Self> {
        let client = PocketClient::new(&config.pocket)?;
        let start_height = match restored_pokt_height(last_health, MINT_MONITOR_NAME) {
            Some(height) => height,
            None if config.pocket.start_height > 0 => config.pocket.start_height as u64,
            None => client.get_height().await?,
        };
        info!(start_height, "mint monitor starting");
        Ok(MintMonitor {
            db,
            client,
            interval: Duration::from_secs(config.mint_monitor.interval_secs),
            vault_address: config.pocket.vault_address.to_lowercase(),
            wpokt_address: config.ethereum.wrapped_pocket_address.to_lowercase(),
            pokt_chain_id: config.pocket.chain_id.clone(),
            eth_chain_id: config.ethereum.chain_id.clone(),
            start_height,
            current_height: start_height,
            last_sync_time: DateTime::now(),
        })
    }

    async fn update_current_height(&mut self) {
        match self.client.get_height().await {
            Ok(height) => {
                self.current_height = height;
                debug!(height, "updated current pokt height");
            }
            Err(err) => error!("error fetching pokt height: {}", err),
        }
    }

    /// Classifies and stores one vault deposit. Returns false only on a
    /// store failure that should hold the cursor back.
    async fn handle_tx(&self, tx: &TxResponse) -> bool {
        match validate_memo(&tx.std_tx.memo, &self.eth_chain_id) {
            Some(memo) => {
                debug!(hash = %tx.hash, memo = %tx.std_tx.memo, "found mint tx");
                let mint = Mint::from_deposit(
                    tx,
                    memo,
                    &self.pokt_chain_id,
                    &self.wpokt_address,
                    &self.vault_address,
                );
                self.insert(COLLECTION_MINTS, &mint, &tx.hash).await
            }
            None => {
                debug!(hash = %tx.hash, memo = %tx.std_tx.memo, "found invalid mint tx");
                let invalid =
                    InvalidMint::from_deposit(tx, &self.pokt_chain_id, &self.vault_address);
                self.insert(COLLECTION_INVALID_MINTS, &invalid, &tx.hash)
                    .await
            }
        }
    }

    async fn insert<T: serde::Serialize + Send + Sync>(
        &self,
        collection: &str,
        record: &T,
        hash: &str,
    ) -> bool {
        match self.db.insert_one(collection, record).await {
            Ok(()) => {
                debug!(hash, collection, "stored record");
                true
            }
            Err(DbError::Duplicate) => {
                debug!(hash, collection, "record already stored");
                true
            }
            Err(err) => {
                error!(hash, collection, "error storing record: {}", err);
                false
            }
        }
    }

    async fn sync_txs(&self) -> bool {
        let txs = match self
            .client
            .get_account_transfer_txs(&self.vault_address, self.start_height, self.current_height)
            .await
        {
            Ok(txs) => txs,
            Err(err) => {
                error!("error fetching vault transfers: {}", err);
                return false;
            }
        };
        debug!(count = txs.len(), "found vault transfers");
        let mut success = true;
        for tx in &txs {
            success = self.handle_tx(tx).await && success;
        }
        success
    }
}

impl PeriodicService for MintMonitor {
    fn name(&self) -> &'static str {
        MINT_MONITOR_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: MINT_MONITOR_NAME.to_string(),
            last_sync_time: self.last_sync_time,
            next_sync_time: next_sync_time(self.last_sync_time, self.interval),
            pokt_height: self.start_height.to_string(),
            eth_block_number: String::new(),
            healthy: true,
        }
    }

    async fn tick(&mut self) {
        debug!("starting mint sync");
        self.last_sync_time = DateTime::now();

        self.update_current_height().await;

        if self.current_height > self.start_height {
            debug!(
                from = self.start_height,
                to = self.current_height,
                "syncing mint txs"
            );
            if self.sync_txs().await {
                self.start_height = self.current_height;
            }
        } else {
            debug!(height = self.current_height, "already synced");
        }

        debug!("finished mint sync");
    }
}
