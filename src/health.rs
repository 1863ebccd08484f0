//! Heartbeat service and cursor restoration.
//!
//! Every interval the health service gathers the latest snapshot from
//! each running service and upserts a single heartbeat document keyed by
//! this validator's identity (vault address plus Ethereum signer address).
//! On startup the supervisor reads the last heartbeat back so monitors
//! and executors can resume scanning where the previous run left off.

use std::time::Duration;

use mongodb::bson::{doc, to_bson, DateTime};
use tracing::{debug, error};

use crate::db::Database;
use crate::models::{HealthRecord, ServiceHealth, COLLECTION_HEALTHCHECKS};
use crate::service::{HealthSlot, PeriodicService};

pub const HEALTH_SERVICE_NAME: &str = "health";

/// Computes when the next tick of a service is due.
pub fn next_sync_time(last: DateTime, interval: Duration) -> DateTime {
    DateTime::from_millis(last.timestamp_millis() + interval.as_millis() as i64)
}

/// Reads the last heartbeat document for this validator, if any.
pub async fn find_last_health(
    db: &Database,
    pokt_vault_address: &str,
    eth_validator_address: &str,
) -> Option<HealthRecord> {
    let filter = doc! {
        "pokt_vault_address": pokt_vault_address,
        "eth_validator_address": eth_validator_address,
    };
    match db
        .find_one::<HealthRecord>(COLLECTION_HEALTHCHECKS, filter)
        .await
    {
        Ok(record) => record,
        Err(err) => {
            error!("error reading last health record: {}", err);
            None
        }
    }
}

/// Looks up the snapshot a named service left in the last heartbeat.
pub fn service_health<'a>(
    record: Option<&'a HealthRecord>,
    service_name: &str,
) -> Option<&'a ServiceHealth> {
    record?
        .service_healths
        .iter()
        .find(|health| health.name == service_name)
}

/// Ethereum cursor a service persisted in the last heartbeat.
pub fn restored_eth_block(record: Option<&HealthRecord>, service_name: &str) -> Option<u64> {
    service_health(record, service_name)?
        .eth_block_number
        .parse()
        .ok()
}

/// Pocket cursor a service persisted in the last heartbeat.
pub fn restored_pokt_height(record: Option<&HealthRecord>, service_name: &str) -> Option<u64> {
    service_health(record, service_name)?
        .pokt_height
        .parse()
        .ok()
}

/// Periodically writes the heartbeat document.
pub struct HealthService {
    db: Database,
    interval: Duration,
    slots: Vec<HealthSlot>,
    pokt_vault_address: String,
    eth_validator_address: String,
    last_sync_time: DateTime,
}

impl HealthService {
    pub fn new(
        db: Database,
        interval: Duration,
        slots: Vec<HealthSlot>,
        pokt_vault_address: &str,
        eth_validator_address: &str,
    ) -> Self {
        HealthService {
            db,
            interval,
            slots,
            pokt_vault_address: pokt_vault_address.to_lowercase(),
            eth_validator_address: eth_validator_address.to_lowercase(),
            last_sync_time: DateTime::now(),
        }
    }

    async fn post_health(&self) -> anyhow::Result<()> {
        let mut service_healths = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            service_healths.push(slot.read().await.clone());
        }
        let filter = doc! {
            "pokt_vault_address": &self.pokt_vault_address,
            "eth_validator_address": &self.eth_validator_address,
        };
        let update = doc! {
            "$set": {
                "service_healths": to_bson(&service_healths)?,
                "updated_at": DateTime::now(),
            },
            "$setOnInsert": { "created_at": DateTime::now() },
        };
        self.db
            .upsert_one(COLLECTION_HEALTHCHECKS, filter, update)
            .await?;
        Ok(())
    }
}

impl PeriodicService for HealthService {
    fn name(&self) -> &'static str {
        HEALTH_SERVICE_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: HEALTH_SERVICE_NAME.to_string(),
            last_sync_time: self.last_sync_time,
            next_sync_time: next_sync_time(self.last_sync_time, self.interval),
            pokt_height: String::new(),
            eth_block_number: String::new(),
            healthy: true,
        }
    }

    async fn tick(&mut self) {
        debug!("posting health");
        self.last_sync_time = DateTime::now();
        if let Err(err) = self.post_health().await {
            error!("error posting health: {}", err);
            return;
        }
        debug!("posted health");
    }
}
