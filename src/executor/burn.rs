//! Pocket burn executor.
//!
//! Broadcasts fully signed return transactions for burns and invalid
//! mints, then watches for their inclusion. Broadcasting the same raw
//! transaction twice is harmless: the node deduplicates by hash, so
//! repeated submissions after a missed status update converge on the
//! same outcome.

use std::time::Duration;

use anyhow::{anyhow, Result};
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::health::next_sync_time;
use crate::models::{
    Burn, InvalidMint, ServiceHealth, Status, COLLECTION_BURNS, COLLECTION_INVALID_MINTS,
};
use crate::pocket_client::PocketClient;
use crate::service::PeriodicService;

pub const BURN_EXECUTOR_NAME: &str = "burn executor";

pub struct BurnExecutor {
    db: Database,
    client: PocketClient,
    interval: Duration,
    vault_address: String,
    wpokt_address: String,
    last_sync_time: DateTime,
}

impl BurnExecutor {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        Ok(BurnExecutor {
            db,
            client: PocketClient::new(&config.pocket)?,
            interval: Duration::from_secs(config.burn_executor.interval_secs),
            vault_address: config.pocket.vault_address.to_lowercase(),
            wpokt_address: config.ethereum.wrapped_pocket_address.to_lowercase(),
            last_sync_time: DateTime::now(),
        })
    }

    /// Pushes one record forward: broadcast when signed, check inclusion
    /// when submitted.
    async fn handle_record(
        &self,
        collection: &str,
        id: Option<ObjectId>,
        source_hash: &str,
        status: Status,
        return_tx: Option<&str>,
        return_tx_hash: Option<&str>,
    ) -> Result<()> {
        match status {
            Status::Signed => {
                let raw_hex = return_tx
                    .ok_or_else(|| anyhow!("signed record {} has no return tx", source_hash))?;
                debug!(hash = source_hash, "submitting return tx");
                let tx_hash = self.client.submit_raw_tx(&self.vault_address, raw_hex).await?;
                let filter = doc! { "_id": id, "status": Status::Signed.as_str() };
                let update = doc! { "$set": {
                    "status": Status::Submitted.as_str(),
                    "return_tx_hash": &tx_hash,
                    "updated_at": DateTime::now(),
                }};
                self.db.update_one(collection, filter, update).await?;
                info!(hash = source_hash, tx_hash = %tx_hash, "submitted return tx");
            }
            Status::Submitted => {
                let tx_hash = return_tx_hash
                    .ok_or_else(|| anyhow!("submitted record {} has no tx hash", source_hash))?;
                debug!(hash = source_hash, "checking return tx");
                match self.client.get_tx(tx_hash).await? {
                    Some(_) => {
                        let filter = doc! { "_id": id, "status": Status::Submitted.as_str() };
                        let update = doc! { "$set": {
                            "status": Status::Success.as_str(),
                            "updated_at": DateTime::now(),
                        }};
                        self.db.update_one(collection, filter, update).await?;
                        info!(hash = source_hash, tx_hash, "return tx included");
                    }
                    None => debug!(hash = source_hash, tx_hash, "return tx not yet included"),
                }
            }
            other => debug!(hash = source_hash, status = %other, "nothing to execute"),
        }
        Ok(())
    }

    async fn sync_invalid_mints(&self) {
        let filter = doc! {
            "vault_address": &self.vault_address,
            "status": { "$in": [Status::Signed.as_str(), Status::Submitted.as_str()] },
        };
        let invalid_mints: Vec<InvalidMint> =
            match self.db.find_many(COLLECTION_INVALID_MINTS, filter).await {
                Ok(records) => records,
                Err(err) => {
                    error!("error fetching invalid mints: {}", err);
                    return;
                }
            };
        debug!(count = invalid_mints.len(), "found invalid mints to execute");
        for record in &invalid_mints {
            if let Err(err) = self
                .handle_record(
                    COLLECTION_INVALID_MINTS,
                    record.id,
                    &record.transaction_hash,
                    record.status,
                    record.return_tx.as_deref(),
                    record.return_tx_hash.as_deref(),
                )
                .await
            {
                warn!(hash = %record.transaction_hash, "error executing invalid mint: {}", err);
            }
        }
    }

    async fn sync_burns(&self) {
        let filter = doc! {
            "wpokt_address": &self.wpokt_address,
            "status": { "$in": [Status::Signed.as_str(), Status::Submitted.as_str()] },
        };
        let burns: Vec<Burn> = match self.db.find_many(COLLECTION_BURNS, filter).await {
            Ok(records) => records,
            Err(err) => {
                error!("error fetching burns: {}", err);
                return;
            }
        };
        debug!(count = burns.len(), "found burns to execute");
        for record in &burns {
            if let Err(err) = self
                .handle_record(
                    COLLECTION_BURNS,
                    record.id,
                    &record.transaction_hash,
                    record.status,
                    record.return_tx.as_deref(),
                    record.return_tx_hash.as_deref(),
                )
                .await
            {
                warn!(hash = %record.transaction_hash, "error executing burn: {}", err);
            }
        }
    }
}

impl PeriodicService for BurnExecutor {
    fn name(&self) -> &'static str {
        BURN_EXECUTOR_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: BURN_EXECUTOR_NAME.to_string(),
            last_sync_time: self.last_sync_time,
            next_sync_time: next_sync_time(self.last_sync_time, self.interval),
            pokt_height: String::new(),
            eth_block_number: String::new(),
            healthy: true,
        }
    }

    async fn tick(&mut self) {
        debug!("starting burn execution");
        self.last_sync_time = DateTime::now();
        self.sync_invalid_mints().await;
        self.sync_burns().await;
        debug!("finished burn execution");
    }
}
